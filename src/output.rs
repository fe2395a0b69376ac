//! Turning a frame of escape counts into a graymap on disk.
//!
//! Two encodings are supported.  `Reference` reproduces the layout the
//! earlier renderers wrote, byte for byte: a `P5` header whose maxval
//! is `max_iter - 1`, followed by one byte per pixel.  Strict PGM
//! readers reject that file when maxval exceeds 255, so `Standard`
//! writes the same pixels through the `image` crate's PNM encoder with
//! a maxval of 255.

use image::pnm::{PNMEncoder, PNMSubtype, SampleEncoding};
use image::{ColorType, GrayImage};
use log::info;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::framebuffer::FrameBuffer;

/// Which graymap header to write.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// `P5`, `<w> <h>`, `<max_iter - 1>`.
    Reference,
    /// `P5`, `<w> <h>`, `255`.
    Standard,
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::Reference
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Encoding> {
        match s {
            "reference" => Ok(Encoding::Reference),
            "standard" => Ok(Encoding::Standard),
            _ => Err(Error::Configuration(format!("unknown encoding '{}'", s))),
        }
    }
}

/// Linear grayscale: `count * 255 / (max_iter - 1)`, clamped to 255.
/// Points that never escaped would land just above 255, and they are
/// white, not wrapped around.
#[inline]
pub fn shade(count: u32, max_iter: u32) -> u8 {
    let scale = u64::from(max_iter.saturating_sub(1).max(1));
    num::clamp(u64::from(count) * 255 / scale, 0, 255) as u8
}

/// The header of a `Reference` file.
pub fn reference_header(width: usize, height: usize, max_iter: u32) -> String {
    format!("P5\n{} {}\n{}\n", width, height, max_iter.saturating_sub(1))
}

/// Shades every cell of a frame.
pub fn grayscale(frame: &FrameBuffer, max_iter: u32) -> Result<GrayImage> {
    let pixels: Vec<u8> = frame
        .as_slice()
        .iter()
        .map(|&count| shade(count, max_iter))
        .collect();
    GrayImage::from_raw(frame.width() as u32, frame.height() as u32, pixels).ok_or_else(|| {
        Error::Configuration(format!(
            "a {}x{} frame does not fit in an image",
            frame.width(),
            frame.height()
        ))
    })
}

/// Writes a frame in the requested encoding.
pub fn write_graymap<W: Write>(
    out: W,
    frame: &FrameBuffer,
    max_iter: u32,
    encoding: Encoding,
) -> Result<()> {
    let gray = grayscale(frame, max_iter)?;
    let pixels: &[u8] = &gray;
    match encoding {
        Encoding::Reference => {
            let mut out = BufWriter::new(out);
            out.write_all(reference_header(frame.width(), frame.height(), max_iter).as_bytes())?;
            out.write_all(pixels)?;
            out.flush()?;
        }
        Encoding::Standard => {
            let mut out = BufWriter::new(out);
            {
                let mut encoder = PNMEncoder::new(&mut out)
                    .with_subtype(PNMSubtype::Graymap(SampleEncoding::Binary));
                encoder.encode(pixels, gray.width(), gray.height(), ColorType::Gray(8))?;
            }
            out.flush()?;
        }
    }
    Ok(())
}

/// Creates `path` and writes the frame into it.  Failure to create or
/// fill the file is reported with the path attached.
pub fn save(path: &Path, frame: &FrameBuffer, max_iter: u32, encoding: Encoding) -> Result<()> {
    let with_path = |cause: io::Error| Error::Output {
        path: path.display().to_string(),
        cause,
    };
    let file = File::create(path).map_err(with_path)?;
    let written = match write_graymap(file, frame, max_iter, encoding) {
        Err(Error::Io(cause)) => Err(with_path(cause)),
        other => other,
    };
    written?;
    info!("wrote {:?} graymap to {}", encoding, path.display());
    Ok(())
}
