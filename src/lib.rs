#![deny(missing_docs)]
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Mandelbrot renderer
//!
//! The Mandelbrot set is the set of points on the complex plane whose
//! orbit under `z = z * z + c` stays bounded.  An escape-time render
//! takes every pixel of an image, maps it to a point on the plane, and
//! counts how many iterations that point's orbit survives before it
//! leaves the circle of radius 2.  The counts, scaled to gray, are the
//! picture.
//!
//! The per-pixel work is independent, so the interesting part is how
//! the grid is shared out.  This crate renders the same image three
//! ways:
//!
//! * sequentially, on one thread;
//! * on a pool of threads sharing one frame buffer, each thread
//!   owning whole rows of it;
//! * on a group of processes, each owning a contiguous band of rows in
//!   its own private buffer, with rank 0 gathering the bands.
//!
//! All three produce bit-identical frames for the same configuration.

pub mod config;
pub mod distributed;
pub mod error;
pub mod escape;
pub mod framebuffer;
pub mod output;
pub mod partition;
pub mod planes;
pub mod render;

pub use config::{RenderConfig, Resolution};
pub use distributed::{Communicator, GatherMode};
pub use error::{Error, Result};
pub use framebuffer::FrameBuffer;
pub use output::Encoding;
pub use partition::{RowRange, Schedule};
pub use planes::{GridMapper, Pixel, Viewport};
pub use render::Renderer;
