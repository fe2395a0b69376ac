use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::{debug, info};
use num::Complex;
use std::env;
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

use mandelbrot::config::{self, DISTRIBUTED_OUTPUT, PARALLEL_OUTPUT, SEQUENTIAL_OUTPUT};
use mandelbrot::distributed::{size_from_env, ProcessRoot, ProcessWorker};
use mandelbrot::output;
use mandelbrot::{
    Encoding, Error, FrameBuffer, GatherMode, RenderConfig, Renderer, Resolution, Result,
    Schedule, Viewport,
};

fn parse_pair<T>(s: &str, separator: char) -> Option<(T, T)>
where
    T: FromStr,
{
    match s.find(separator) {
        None => None,
        Some(index) => match (T::from_str(&s[..index]), T::from_str(&s[index + 1..])) {
            (Ok(l), Ok(r)) => Some((l, r)),
            _ => None,
        },
    }
}

fn parse_complex(s: &str) -> Option<Complex<f64>> {
    match parse_pair(s, ',') {
        Some((re, im)) => Some(Complex { re, im }),
        None => None,
    }
}

fn validate_pair<T: FromStr>(
    s: &str,
    separator: char,
    err: &str,
) -> std::result::Result<(), String> {
    match parse_pair::<T>(s, separator) {
        Some(_) => Ok(()),
        None => Err(err.to_string()),
    }
}

fn validate_range<T: FromStr + Ord>(
    s: &str,
    low: T,
    high: T,
    isnotanumber_err: &str,
    isnotinrange_err: &str,
) -> std::result::Result<(), String> {
    match T::from_str(s) {
        Ok(i) => {
            if i >= low && i <= high {
                Ok(())
            } else {
                Err(isnotinrange_err.to_string())
            }
        }
        Err(_) => Err(isnotanumber_err.to_string()),
    }
}

const OUTPUT: &str = "output";
const SIZE: &str = "size";
const LEFTLOWER: &str = "leftlower";
const RIGHTUPPER: &str = "rightupper";
const ITERATIONS: &str = "iterations";
const ENCODING: &str = "encoding";
const THREADS: &str = "threads";
const SCHEDULE: &str = "schedule";
const PROCESSES: &str = "processes";
const ROOT_ONLY: &str = "root-only";

const SEQUENTIAL: &str = "sequential";
const PARALLEL: &str = "parallel";
const DISTRIBUTED: &str = "distributed";

const DEFAULT_SIZE: &str = "800x600";
const DEFAULT_ITERATIONS: &str = "1000";
const MAX_WORKERS: usize = 1024;

fn args<'a>() -> ArgMatches<'a> {
    let workers_err = format!("Worker count must be between 1 and {}", MAX_WORKERS);

    let threads_err = workers_err.clone();
    let processes_err = workers_err;

    App::new("mandelbrot")
        .version("0.1.0")
        .author("Elf M. Sternberg <elf.sternberg@gmail.com>")
        .about("Escape-time Mandelbrot renderer")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name(OUTPUT)
                .required(false)
                .long(OUTPUT)
                .short("o")
                .takes_value(true)
                .help("Output file (defaults to a per-variant name)"),
        )
        .arg(
            Arg::with_name(SIZE)
                .required(false)
                .long(SIZE)
                .short("s")
                .takes_value(true)
                .default_value(DEFAULT_SIZE)
                .validator(|s| validate_pair::<usize>(&s, 'x', "Could not parse output image size"))
                .help("Size of output image"),
        )
        .arg(
            Arg::with_name(LEFTLOWER)
                .required(false)
                .long(LEFTLOWER)
                .short("l")
                .takes_value(true)
                .allow_hyphen_values(true)
                .default_value("-2.0,-1.0")
                .validator(|s| validate_pair::<f64>(&s, ',', "Could not parse left lower corner"))
                .help("Left lower corner of the mandelbrot space"),
        )
        .arg(
            Arg::with_name(RIGHTUPPER)
                .required(false)
                .long(RIGHTUPPER)
                .short("r")
                .takes_value(true)
                .allow_hyphen_values(true)
                .default_value("1.0,1.0")
                .validator(|s| validate_pair::<f64>(&s, ',', "Could not parse right upper corner"))
                .help("Right upper corner of the mandelbrot space"),
        )
        .arg(
            Arg::with_name(ITERATIONS)
                .required(false)
                .long(ITERATIONS)
                .short("i")
                .takes_value(true)
                .default_value(DEFAULT_ITERATIONS)
                .validator(move |s| {
                    validate_range(
                        &s,
                        1,
                        1_000_000,
                        "Could not parse iteration count",
                        "Iteration count must be between 1 and 1000000",
                    )
                })
                .help("Iterations after which a point counts as inside the set"),
        )
        .arg(
            Arg::with_name(ENCODING)
                .required(false)
                .long(ENCODING)
                .short("e")
                .takes_value(true)
                .possible_values(&["reference", "standard"])
                .default_value("reference")
                .help("Graymap header: maxval of iterations-1, or a standard 255"),
        )
        .subcommand(SubCommand::with_name(SEQUENTIAL).about("Render on a single thread"))
        .subcommand(
            SubCommand::with_name(PARALLEL)
                .about("Render on a pool of threads sharing one frame")
                .arg(
                    Arg::with_name(THREADS)
                        .long(THREADS)
                        .short("t")
                        .takes_value(true)
                        .validator(move |s| {
                            validate_range(
                                &s,
                                1,
                                MAX_WORKERS,
                                "Could not parse thread count",
                                &threads_err,
                            )
                        })
                        .help("Number of threads to use in solver (defaults to CPU count)"),
                )
                .arg(
                    Arg::with_name(SCHEDULE)
                        .long(SCHEDULE)
                        .takes_value(true)
                        .possible_values(&["static", "dynamic"])
                        .default_value("dynamic")
                        .help("Hand rows out in fixed blocks or one at a time"),
                ),
        )
        .subcommand(
            SubCommand::with_name(DISTRIBUTED)
                .about("Render on a group of processes, each owning a band of rows")
                .arg(
                    Arg::with_name(PROCESSES)
                        .long(PROCESSES)
                        .short("p")
                        .takes_value(true)
                        .validator(move |s| {
                            validate_range(
                                &s,
                                1,
                                MAX_WORKERS,
                                "Could not parse process count",
                                &processes_err,
                            )
                        })
                        .help("Number of processes (defaults to MANDELBROT_SIZE, then CPU count)"),
                )
                .arg(
                    Arg::with_name(ROOT_ONLY)
                        .long(ROOT_ONLY)
                        .help("Skip the gather and write only rank 0's rows"),
                ),
        )
        .get_matches()
}

fn value<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .value_of(name)
        .ok_or_else(|| Error::Configuration(format!("missing --{}", name)))
}

fn count(matches: &ArgMatches, name: &str) -> Result<Option<usize>> {
    match matches.value_of(name) {
        None => Ok(None),
        Some(s) => usize::from_str(s)
            .map(Some)
            .map_err(|_| Error::Configuration(format!("could not parse --{} '{}'", name, s))),
    }
}

fn render_config(matches: &ArgMatches) -> Result<RenderConfig> {
    let (width, height) = parse_pair::<usize>(value(matches, SIZE)?, 'x')
        .ok_or_else(|| Error::Configuration("error parsing image dimensions".to_string()))?;
    let leftlower = parse_complex(value(matches, LEFTLOWER)?)
        .ok_or_else(|| Error::Configuration("error parsing left lower point".to_string()))?;
    let rightupper = parse_complex(value(matches, RIGHTUPPER)?)
        .ok_or_else(|| Error::Configuration("error parsing right upper point".to_string()))?;
    let max_iter = u32::from_str(value(matches, ITERATIONS)?)
        .map_err(|_| Error::Configuration("error parsing iteration count".to_string()))?;

    let viewport = Viewport::from_corners(leftlower, rightupper)?;
    let resolution = Resolution::new(width, height, max_iter)?;
    Ok(RenderConfig::new(viewport, resolution))
}

fn save(
    matches: &ArgMatches,
    default_output: &str,
    renderer: &Renderer,
    frame: &FrameBuffer,
    started: Instant,
) -> Result<()> {
    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    writeln!(
        stdout,
        "Mandelbrot computation took {:.4} seconds.",
        started.elapsed().as_secs_f64()
    )?;
    let encoding = Encoding::from_str(value(matches, ENCODING)?)?;
    let outfile = matches.value_of(OUTPUT).unwrap_or(default_output);
    output::save(Path::new(outfile), frame, renderer.max_iter(), encoding)?;
    writeln!(stdout, "Mandelbrot image saved as '{}'.", outfile)?;
    Ok(())
}

fn distributed(matches: &ArgMatches, sub: &ArgMatches, renderer: &Renderer) -> Result<()> {
    let mode = if sub.is_present(ROOT_ONLY) {
        GatherMode::RootOnly
    } else {
        GatherMode::Gather
    };

    // Started by a root: compute, hand over, and leave stdout alone.
    if let Some(mut worker) = ProcessWorker::from_env()? {
        renderer.distributed(&mut worker, mode)?;
        return Ok(());
    }

    let size = match count(sub, PROCESSES)? {
        Some(n) => config::worker_count(Some(n))?,
        None => config::worker_count(size_from_env()?)?,
    };
    let rest: Vec<OsString> = env::args_os().skip(1).collect();
    let program = env::current_exe()?;
    info!("distributing {} rows over {} processes", renderer.height(), size);

    let mut root = ProcessRoot::launch(size, &program, &rest)?;
    let started = Instant::now();
    let frame = renderer.distributed(&mut root, mode);
    let finished = root.finish();
    let frame = frame?
        .ok_or_else(|| Error::Protocol("rank 0 produced no frame".to_string()))?;
    finished?;
    save(matches, DISTRIBUTED_OUTPUT, renderer, &frame, started)
}

fn run() -> Result<()> {
    let matches = args();
    let settings = render_config(&matches)?;
    debug!("{:?}", settings);
    let renderer = Renderer::new(&settings)?;

    match matches.subcommand() {
        (SEQUENTIAL, Some(_)) => {
            let started = Instant::now();
            let frame = renderer.sequential()?;
            save(&matches, SEQUENTIAL_OUTPUT, &renderer, &frame, started)
        }
        (PARALLEL, Some(sub)) => {
            let threads = config::worker_count(count(sub, THREADS)?)?;
            let schedule = Schedule::from_str(value(sub, SCHEDULE)?)?;
            let started = Instant::now();
            let frame = renderer.parallel(threads, schedule)?;
            save(&matches, PARALLEL_OUTPUT, &renderer, &frame, started)
        }
        (DISTRIBUTED, Some(sub)) => distributed(&matches, sub, &renderer),
        (other, _) => Err(Error::Configuration(format!(
            "unknown variant '{}'",
            other
        ))),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Render failure: {}", e);
        std::process::exit(1);
    }
}
