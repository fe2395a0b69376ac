// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The three ways of filling a frame buffer.  They share one per-pixel
//! computation and differ only in who computes which rows.

use itertools::iproduct;
use log::{debug, info};
use std::sync::Mutex;

use crate::config::RenderConfig;
use crate::distributed::{local_group, Communicator, GatherMode};
use crate::error::{Error, Result};
use crate::escape::escape_count;
use crate::framebuffer::FrameBuffer;
use crate::partition::{distributed_range, row_blocks, RowRange, Schedule};
use crate::planes::{GridMapper, Pixel};

/// Takes a plane and a limit (the number of iterations to conduct
/// per-point) and renders escape counts for every pixel of it.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    plane: GridMapper,
    max_iter: u32,
}

impl Renderer {
    /// Builds the pixel-to-plane mapping for a configuration.
    pub fn new(config: &RenderConfig) -> Result<Self> {
        let res = config.resolution;
        let plane = GridMapper::new(res.width, res.height, config.viewport)?;
        Ok(Renderer {
            plane,
            max_iter: res.max_iter,
        })
    }

    /// Image width.
    pub fn width(&self) -> usize {
        self.plane.width
    }

    /// Image height.
    pub fn height(&self) -> usize {
        self.plane.height
    }

    /// The iteration bound every pixel is evaluated with.
    pub fn max_iter(&self) -> u32 {
        self.max_iter
    }

    /// Escape count of a single pixel.
    #[inline]
    pub fn pixel(&self, pixel: Pixel) -> u32 {
        escape_count(self.plane.to_point(pixel), self.max_iter)
    }

    /// Fills one row.  `cells` must be exactly one row wide.
    pub fn render_row(&self, row: usize, cells: &mut [u32]) {
        debug_assert_eq!(cells.len(), self.plane.width);
        for (col, cell) in cells.iter_mut().enumerate() {
            *cell = self.pixel(Pixel(col, row));
        }
    }

    /// Fills a block of consecutive rows.  `cells` holds exactly the
    /// rows of `range`.
    pub fn render_block(&self, range: RowRange, cells: &mut [u32]) {
        for (row, line) in range.rows().zip(cells.chunks_mut(self.plane.width)) {
            self.render_row(row, line);
        }
    }

    fn frame(&self) -> Result<FrameBuffer> {
        FrameBuffer::new(self.plane.width, self.plane.height)
    }

    /// The single-threaded renderer.  Walks the grid column by column.
    pub fn sequential(&self) -> Result<FrameBuffer> {
        let mut frame = self.frame()?;
        for (col, row) in iproduct!(0..self.plane.width, 0..self.plane.height) {
            frame.set(col, row, self.pixel(Pixel(col, row)));
        }
        info!("rendered {} pixels on one thread", frame.len());
        Ok(frame)
    }

    /// A multi-threaded version of the render function that takes a
    /// thread count and a scheduling policy.
    pub fn parallel(&self, threads: usize, schedule: Schedule) -> Result<FrameBuffer> {
        let mut frame = self.frame()?;
        match schedule {
            Schedule::Static => self.parallel_static(&mut frame, threads)?,
            Schedule::Dynamic => self.parallel_dynamic(&mut frame, threads)?,
        }
        info!(
            "rendered {} pixels on {} threads ({:?} schedule)",
            frame.len(),
            threads,
            schedule
        );
        Ok(frame)
    }

    // One contiguous block of rows per thread.
    fn parallel_static(&self, frame: &mut FrameBuffer, threads: usize) -> Result<()> {
        let blocks = row_blocks(threads, self.plane.height)?;
        let slices = frame.blocks_mut(&blocks)?;
        crossbeam::scope(|spawner| {
            for (worker, (block, cells)) in blocks.iter().zip(slices).enumerate() {
                spawner.spawn(move |_| {
                    debug!("thread {} renders rows {}", worker, block);
                    self.render_block(*block, cells);
                });
            }
        })
        .map_err(|_| Error::ThreadPanic)
    }

    // Threads pull rows off a shared queue until it is empty.
    fn parallel_dynamic(&self, frame: &mut FrameBuffer, threads: usize) -> Result<()> {
        if threads == 0 {
            return Err(Error::Configuration(
                "thread count must be at least 1".to_string(),
            ));
        }
        let rows = Mutex::new(frame.rows_mut().enumerate());
        let rows = &rows;
        crossbeam::scope(|spawner| {
            let handles: Vec<_> = (0..threads)
                .map(|worker| {
                    spawner.spawn(move |_| -> Result<usize> {
                        let mut done = 0;
                        loop {
                            let next = rows.lock().map_err(|_| Error::ThreadPanic)?.next();
                            match next {
                                Some((row, cells)) => {
                                    self.render_row(row, cells);
                                    done += 1;
                                }
                                None => break,
                            }
                        }
                        debug!("thread {} rendered {} rows", worker, done);
                        Ok(done)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().map_err(|_| Error::ThreadPanic)?)
                .collect::<Result<Vec<usize>>>()
        })
        .map_err(|_| Error::ThreadPanic)??;
        Ok(())
    }

    /// Runs one rank of a distributed render.  Every rank computes the
    /// rows it owns into a private buffer and waits at the barrier.
    /// With `GatherMode::Gather` the other ranks then ship their rows to
    /// rank 0; with `GatherMode::RootOnly` they don't, and rank 0's
    /// buffer keeps zeroes wherever another rank did the work.
    ///
    /// Returns the finished buffer on rank 0 and `None` elsewhere.
    pub fn distributed<C: Communicator>(
        &self,
        comm: &mut C,
        mode: GatherMode,
    ) -> Result<Option<FrameBuffer>> {
        let (rank, size) = (comm.rank(), comm.size());
        let owned = distributed_range(rank, size, self.plane.height)?;
        let mut frame = self.frame()?;

        debug!("rank {}/{} renders rows {}", rank, size, owned);
        self.render_block(owned, frame.rows_in_mut(owned));
        comm.barrier()?;

        if mode == GatherMode::Gather {
            if rank == 0 {
                for peer in 1..size {
                    let expected = distributed_range(peer, size, self.plane.height)?;
                    let (range, cells) =
                        comm.receive_rows(peer, expected.len() * self.plane.width)?;
                    if range != expected {
                        return Err(Error::Protocol(format!(
                            "rank {} sent rows {}, but owns {}",
                            peer, range, expected
                        )));
                    }
                    frame.copy_rows(range, &cells)?;
                }
            } else {
                comm.send_rows(owned, frame.rows(owned))?;
            }
        }

        if rank == 0 {
            info!("rank 0 holds the frame from {} ranks ({:?})", size, mode);
            Ok(Some(frame))
        } else {
            Ok(None)
        }
    }

    /// Runs a whole distributed render inside this process, one thread
    /// per rank, each rank with its own buffer.
    pub fn distributed_local(&self, size: usize, mode: GatherMode) -> Result<FrameBuffer> {
        let mut comms = local_group(size)?.into_iter();
        let mut root = comms.next().ok_or_else(|| {
            Error::Configuration("process count must be at least 1".to_string())
        })?;
        crossbeam::scope(|spawner| {
            let handles: Vec<_> = comms
                .map(|mut comm| spawner.spawn(move |_| self.distributed(&mut comm, mode)))
                .collect();
            let frame = self.distributed(&mut root, mode);
            for handle in handles {
                handle.join().map_err(|_| Error::ThreadPanic)??;
            }
            frame?.ok_or_else(|| Error::Protocol("rank 0 produced no frame".to_string()))
        })
        .map_err(|_| Error::ThreadPanic)?
    }
}
