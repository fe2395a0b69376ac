use mandelbrot::distributed::local_group;
use mandelbrot::escape::evaluate;
use mandelbrot::partition::distributed_ranges;
use mandelbrot::{
    GatherMode, Pixel, RenderConfig, Renderer, Resolution, RowRange, Schedule, Viewport,
};

fn renderer(width: usize, height: usize, max_iter: u32) -> Renderer {
    let config = RenderConfig::new(
        Viewport::default(),
        Resolution::new(width, height, max_iter).unwrap(),
    );
    Renderer::new(&config).unwrap()
}

#[test]
fn all_variants_agree_bit_for_bit() {
    // 61 rows: no thread or process count below divides it evenly.
    let r = renderer(83, 61, 300);
    let reference = r.sequential().unwrap();
    for &workers in &[1, 2, 3, 4, 7, 16, 61, 64] {
        assert_eq!(r.parallel(workers, Schedule::Static).unwrap(), reference);
        assert_eq!(r.parallel(workers, Schedule::Dynamic).unwrap(), reference);
        assert_eq!(
            r.distributed_local(workers, GatherMode::Gather).unwrap(),
            reference,
            "{} ranks",
            workers
        );
    }
}

#[test]
fn every_rank_fills_only_its_own_band() {
    let r = renderer(40, 30, 100);
    let reference = r.sequential().unwrap();
    let size = 4;
    let ranges = distributed_ranges(size, 30).unwrap();

    // Without a gather, each rank's private buffer holds its band and
    // nothing else; run them by hand to look at every buffer.
    let comms = local_group(size).unwrap();
    let frames = crossbeam::scope(|spawner| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|mut comm| {
                spawner.spawn(move |_| {
                    let rank = mandelbrot::Communicator::rank(&comm);
                    let frame = r.distributed(&mut comm, GatherMode::RootOnly).unwrap();
                    (rank, frame)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<_>>()
    })
    .unwrap();

    for (rank, frame) in frames {
        if rank == 0 {
            let frame = frame.unwrap();
            assert_eq!(frame.rows(ranges[0]), reference.rows(ranges[0]));
            let rest = RowRange::new(ranges[0].end, 30).unwrap();
            assert!(frame.rows(rest).iter().all(|&c| c == 0));
        } else {
            assert!(frame.is_none());
        }
    }
}

#[test]
fn default_run_landmarks() {
    let r = Renderer::new(&RenderConfig::default()).unwrap();
    assert_eq!((r.width(), r.height(), r.max_iter()), (800, 600, 1000));
    assert!(r.pixel(Pixel(0, 0)) < 10);
    // Column 533 is within half a pixel of re = 0, and row 300 is im = 0.
    assert_eq!(r.pixel(Pixel(533, 300)), 1000);
}

#[test]
fn counts_are_bounded_and_symmetric() {
    let r = renderer(60, 40, 500);
    let frame = r.sequential().unwrap();
    assert!(frame.as_slice().iter().all(|&c| c <= 500));

    for col in 0..60 {
        let re = -2.0 + col as f64 * 0.05;
        for step in 0..20 {
            let im = step as f64 * 0.05;
            assert_eq!(evaluate(re, im, 500), evaluate(re, -im, 500));
        }
    }
}
