//! Contains the GridMapper struct, which describes a relationship
//! between a rectangle on the integral plane with an origin at 0,0,
//! and a rectangle on the complex plane (the Viewport) bounded by a
//! real and an imaginary interval.
use num::Complex;

use crate::error::{Error, Result};

/// The rectangle of the complex plane that gets rasterized.  The
/// real axis runs left to right across columns, the imaginary axis
/// runs with the row index.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Viewport {
    /// Real part of the left edge.
    pub real_min: f64,
    /// Real part of the right edge (exclusive).
    pub real_max: f64,
    /// Imaginary part of row 0.
    pub imag_min: f64,
    /// Imaginary part past the last row (exclusive).
    pub imag_max: f64,
}

impl Viewport {
    /// Constructor.  Rejects bounds that are not finite, or that are
    /// not strictly increasing.
    pub fn new(real_min: f64, real_max: f64, imag_min: f64, imag_max: f64) -> Result<Viewport> {
        let all = [real_min, real_max, imag_min, imag_max];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(Error::Configuration(
                "viewport bounds must be finite numbers".to_string(),
            ));
        }
        if real_max <= real_min {
            return Err(Error::Configuration(format!(
                "real_max ({}) must be greater than real_min ({})",
                real_max, real_min
            )));
        }
        if imag_max <= imag_min {
            return Err(Error::Configuration(format!(
                "imag_max ({}) must be greater than imag_min ({})",
                imag_max, imag_min
            )));
        }
        Ok(Viewport {
            real_min,
            real_max,
            imag_min,
            imag_max,
        })
    }

    /// Builds a viewport from its left-lower and right-upper corners,
    /// the way corners are given on the command line.
    pub fn from_corners(leftlower: Complex<f64>, rightupper: Complex<f64>) -> Result<Viewport> {
        Viewport::new(leftlower.re, rightupper.re, leftlower.im, rightupper.im)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            real_min: -2.0,
            real_max: 1.0,
            imag_min: -1.0,
            imag_max: 1.0,
        }
    }
}

/// Describes the column and row of a pixel.  Column first, to fit
/// our x,y schema.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Pixel(pub usize, pub usize);

/// Maps pixels of a width x height grid onto a Viewport.
#[derive(Debug, Clone, Copy)]
pub struct GridMapper {
    /// The grid width in pixels.
    pub width: usize,
    /// The grid height in pixels.
    pub height: usize,
    /// The region of the complex plane being covered.
    pub viewport: Viewport,
    // The distance on the complex plane between two adjacent pixels,
    // along the real and the imaginary axis respectively.
    steps: (f64, f64),
}

impl GridMapper {
    /// Constructor.  The grid must be non-empty.
    pub fn new(width: usize, height: usize, viewport: Viewport) -> Result<GridMapper> {
        if width == 0 || height == 0 {
            return Err(Error::Configuration(format!(
                "image size {}x{} has no pixels",
                width, height
            )));
        }

        // Computed once and multiplied, never divided per pixel: every
        // variant must land on the very same doubles.
        let steps = (
            (viewport.real_max - viewport.real_min) / (width as f64),
            (viewport.imag_max - viewport.imag_min) / (height as f64),
        );

        Ok(GridMapper {
            width,
            height,
            viewport,
            steps,
        })
    }

    /// Given a pixel on the integral plane, return the complex number
    /// at its upper-left corner.
    #[inline]
    pub fn to_point(&self, pixel: Pixel) -> Complex<f64> {
        Complex::new(self.real_at(pixel.0), self.imag_at(pixel.1))
    }

    /// The real coordinate shared by every pixel in a column.
    #[inline]
    pub fn real_at(&self, col: usize) -> f64 {
        self.viewport.real_min + (col as f64) * self.steps.0
    }

    /// The imaginary coordinate shared by every pixel in a row.
    #[inline]
    pub fn imag_at(&self, row: usize) -> f64 {
        self.viewport.imag_min + (row as f64) * self.steps.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn viewport_fails_on_bad_shape() {
        assert!(Viewport::new(1.0, -2.0, -1.0, 1.0).is_err());
        assert!(Viewport::new(-2.0, 1.0, 1.0, -1.0).is_err());
        assert!(Viewport::new(-2.0, -2.0, -1.0, 1.0).is_err());
        assert!(Viewport::new(-2.0, std::f64::NAN, -1.0, 1.0).is_err());
    }

    #[test]
    fn viewport_from_corners() {
        let vp =
            Viewport::from_corners(Complex::new(-2.0, -1.0), Complex::new(1.0, 1.0)).unwrap();
        assert_eq!(vp, Viewport::default());
    }

    #[test]
    fn mapper_rejects_empty_grid() {
        assert!(GridMapper::new(0, 600, Viewport::default()).is_err());
        assert!(GridMapper::new(800, 0, Viewport::default()).is_err());
    }

    #[test]
    fn origin_pixel_maps_to_lower_left_corner() {
        let gm = GridMapper::new(800, 600, Viewport::default()).unwrap();
        assert_eq!(gm.to_point(Pixel(0, 0)), Complex::new(-2.0, -1.0));
    }

    #[test]
    fn pixels_map_on_positive_planes() {
        let vp = Viewport::new(0.0, 5.0, 0.0, 5.0).unwrap();
        let gm = GridMapper::new(5, 5, vp).unwrap();
        assert_eq!(gm.to_point(Pixel(2, 2)), Complex::new(2.0, 2.0));
        assert_eq!(gm.to_point(Pixel(4, 1)), Complex::new(4.0, 1.0));
    }

    #[test]
    fn pixels_map_on_mixed_planes() {
        let gm = GridMapper::new(800, 600, Viewport::default()).unwrap();
        let mid = gm.to_point(Pixel(400, 300));
        assert!(close(mid.re, -0.5));
        assert!(close(mid.im, 0.0));
        let last = gm.to_point(Pixel(799, 599));
        assert!(close(last.re, 1.0 - 3.0 / 800.0));
        assert!(close(last.im, 1.0 - 2.0 / 600.0));
    }

    #[test]
    fn columns_share_real_and_rows_share_imaginary() {
        let gm = GridMapper::new(80, 60, Viewport::default()).unwrap();
        for row in 0..60 {
            assert_eq!(gm.to_point(Pixel(17, row)).re, gm.real_at(17));
        }
        for col in 0..80 {
            assert_eq!(gm.to_point(Pixel(col, 23)).im, gm.imag_at(23));
        }
    }
}
