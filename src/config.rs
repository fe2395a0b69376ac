//! Run parameters.  Built once at startup and handed by reference to
//! everything that needs them; nothing in the crate reads globals.

use crate::error::{Error, Result};
use crate::planes::Viewport;

/// Default image width in pixels.
pub const DEFAULT_WIDTH: usize = 800;
/// Default image height in pixels.
pub const DEFAULT_HEIGHT: usize = 600;
/// Default iteration bound.
pub const DEFAULT_MAX_ITER: u32 = 1000;

/// Output file written by the single-threaded renderer.
pub const SEQUENTIAL_OUTPUT: &str = "mandelbrot_sequential.pgm";
/// Output file written by the threaded renderer.
pub const PARALLEL_OUTPUT: &str = "mandelbrot_parallel.pgm";
/// Output file written by the multi-process renderer.
pub const DISTRIBUTED_OUTPUT: &str = "mandelbrot.pgm";

/// The size of the pixel grid and how hard to look at each pixel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    /// Columns.
    pub width: usize,
    /// Rows.
    pub height: usize,
    /// Iterations after which a point is considered bounded.
    pub max_iter: u32,
}

impl Resolution {
    /// Constructor.  All three numbers must be positive.
    pub fn new(width: usize, height: usize, max_iter: u32) -> Result<Resolution> {
        if width == 0 || height == 0 {
            return Err(Error::Configuration(format!(
                "image size {}x{} has no pixels",
                width, height
            )));
        }
        if max_iter == 0 {
            return Err(Error::Configuration(
                "the iteration bound must be at least 1".to_string(),
            ));
        }
        Ok(Resolution {
            width,
            height,
            max_iter,
        })
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            max_iter: DEFAULT_MAX_ITER,
        }
    }
}

/// Everything a renderer needs to know.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct RenderConfig {
    /// Region of the complex plane.
    pub viewport: Viewport,
    /// Grid size and iteration bound.
    pub resolution: Resolution,
}

impl RenderConfig {
    /// Pairs an already validated viewport and resolution.
    pub fn new(viewport: Viewport, resolution: Resolution) -> RenderConfig {
        RenderConfig {
            viewport,
            resolution,
        }
    }
}

/// Resolves a worker count: an explicit request wins, otherwise one
/// worker per logical CPU.  Zero is refused.
pub fn worker_count(requested: Option<usize>) -> Result<usize> {
    match requested {
        Some(0) => Err(Error::Configuration(
            "worker count must be at least 1".to_string(),
        )),
        Some(n) => Ok(n),
        None => Ok(num_cpus::get().max(1)),
    }
}
