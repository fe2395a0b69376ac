// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Everything that can go wrong in a render.  The computation itself is
//! total, so the failures all live at the edges: bad parameters,
//! memory, files, and the pipes between cooperating processes.

use failure::Fail;
use std::io;

/// The error type for every fallible operation in this crate.
#[derive(Debug, Fail)]
pub enum Error {
    /// A parameter that would make the partition or the mapping
    /// degenerate: zero workers, an empty image, an inverted viewport.
    #[fail(display = "invalid configuration: {}", _0)]
    Configuration(String),

    /// The frame buffer could not be allocated.
    #[fail(display = "failed to allocate memory for a {}x{} image", width, height)]
    Allocation {
        /// Requested width in pixels.
        width: usize,
        /// Requested height in pixels.
        height: usize,
    },

    /// The output image could not be created or written.
    #[fail(display = "failed to write {}: {}", path, cause)]
    Output {
        /// The file we were writing.
        path: String,
        /// What the OS told us.
        #[cause]
        cause: io::Error,
    },

    /// Any other I/O failure, usually on a worker pipe.
    #[fail(display = "I/O error: {}", _0)]
    Io(#[cause] io::Error),

    /// A cooperating worker process failed or could not be started.
    #[fail(display = "worker {} failed: {}", rank, reason)]
    Worker {
        /// The rank of the failed worker.
        rank: usize,
        /// A human readable reason.
        reason: String,
    },

    /// A render thread panicked, or a lock it held was poisoned.
    #[fail(display = "a render thread panicked")]
    ThreadPanic,

    /// The image encoder refused the raster.
    #[fail(display = "could not encode image: {}", _0)]
    Encode(#[cause] image::ImageError),

    /// A peer sent something we did not expect.
    #[fail(display = "protocol error: {}", _0)]
    Protocol(String),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Encode(e)
    }
}

/// Shorthand used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
