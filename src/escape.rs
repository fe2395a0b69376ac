// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The escape-time evaluator.
//!
//! A point `c` on the complex plane is iterated as `z = z * z + c`,
//! and the number of iterations it survives with `|z| <= 2` is its
//! escape count.  Points that never leave the circle of radius 2
//! within `max_iter` steps are treated as members of the set and
//! report `max_iter`.
//!
//! Note that the orbit starts at `z = c` rather than the textbook
//! `z = 0`, so every escaping point reports one iteration fewer than
//! the canonical definition would.  Images produced by earlier
//! renderers depend on that offset, so it is kept.

use num::Complex;

/// Once an orbit leaves this circle it is gone for good.
pub const ESCAPE_RADIUS: f64 = 2.0;

/// Count the iterations `c` survives, up to `max_iter`.
#[inline]
pub fn escape_count(c: Complex<f64>, max_iter: u32) -> u32 {
    let mut z = c;
    for n in 0..max_iter {
        if z.norm() > ESCAPE_RADIUS {
            return n;
        }
        z = z * z + c;
    }
    max_iter
}

/// Same as `escape_count`, for callers holding loose coordinates.
#[inline]
pub fn evaluate(re: f64, im: f64, max_iter: u32) -> u32 {
    escape_count(Complex::new(re, im), max_iter)
}
