// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Splitting the pixel grid among workers.
//!
//! Work is always handed out in whole rows.  Every strategy here
//! covers the rows `0..height` exactly once, which is what lets the
//! workers write into a shared frame buffer without ever talking to
//! each other.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A contiguous run of rows, `start..end`, owned by a single worker.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RowRange {
    /// First row owned.
    pub start: usize,
    /// One past the last row owned.
    pub end: usize,
}

impl RowRange {
    /// Constructor.  An inverted range is a programming error upstream,
    /// but we report it rather than trust it.
    pub fn new(start: usize, end: usize) -> Result<RowRange> {
        if end < start {
            return Err(Error::Configuration(format!(
                "row range {}..{} is inverted",
                start, end
            )));
        }
        Ok(RowRange { start, end })
    }

    /// Number of rows in the range.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// A worker may legitimately own nothing when there are more
    /// workers than rows.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The row indices, for iteration.
    pub fn rows(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl fmt::Display for RowRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// How the shared-memory renderer hands rows to its threads.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Schedule {
    /// One contiguous block of rows per thread, decided up front.
    Static,
    /// Threads pull the next unrendered row from a shared queue.
    Dynamic,
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule::Dynamic
    }
}

impl FromStr for Schedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Schedule> {
        match s {
            "static" => Ok(Schedule::Static),
            "dynamic" => Ok(Schedule::Dynamic),
            _ => Err(Error::Configuration(format!("unknown schedule '{}'", s))),
        }
    }
}

fn check_workers(workers: usize, what: &str) -> Result<()> {
    if workers == 0 {
        return Err(Error::Configuration(format!(
            "{} count must be at least 1",
            what
        )));
    }
    Ok(())
}

/// Balanced contiguous blocks for `workers` threads.  The first
/// `height % workers` blocks carry one extra row.
pub fn row_blocks(workers: usize, height: usize) -> Result<Vec<RowRange>> {
    check_workers(workers, "thread")?;
    let base = height / workers;
    let extra = height % workers;
    let mut start = 0;
    let mut blocks = Vec::with_capacity(workers);
    for worker in 0..workers {
        let len = base + if worker < extra { 1 } else { 0 };
        blocks.push(RowRange {
            start,
            end: start + len,
        });
        start += len;
    }
    Ok(blocks)
}

/// The rows owned by process `rank` out of `size`.  Every rank gets
/// `height / size` rows, and the last rank also absorbs the remainder.
pub fn distributed_range(rank: usize, size: usize, height: usize) -> Result<RowRange> {
    check_workers(size, "process")?;
    if rank >= size {
        return Err(Error::Configuration(format!(
            "rank {} is outside a group of {}",
            rank, size
        )));
    }
    let chunk = height / size;
    let start = rank * chunk;
    let end = if rank == size - 1 { height } else { start + chunk };
    Ok(RowRange { start, end })
}

/// The ranges of every rank in a group of `size`, in rank order.
pub fn distributed_ranges(size: usize, height: usize) -> Result<Vec<RowRange>> {
    check_workers(size, "process")?;
    (0..size)
        .map(|rank| distributed_range(rank, size, height))
        .collect()
}
