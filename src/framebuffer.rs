//! The grid of escape counts a render fills in.
//!
//! Workers never receive the whole buffer.  They receive `&mut [u32]`
//! slices covering whole rows, carved out of the buffer with
//! `chunks_mut` and `split_at_mut`, so two workers can never be given
//! the same cell.

use std::slice::ChunksMut;

use crate::error::{Error, Result};
use crate::partition::RowRange;

/// A `width` x `height` grid of escape counts, stored row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    width: usize,
    height: usize,
    cells: Vec<u32>,
}

impl FrameBuffer {
    /// Allocates a zeroed buffer.  Fails rather than aborts if the
    /// memory isn't there.
    pub fn new(width: usize, height: usize) -> Result<FrameBuffer> {
        if width == 0 || height == 0 {
            return Err(Error::Configuration(format!(
                "a {}x{} frame buffer has no cells",
                width, height
            )));
        }
        let alloc_error = || Error::Allocation { width, height };
        let len = width.checked_mul(height).ok_or_else(alloc_error)?;
        let mut cells = Vec::new();
        cells.try_reserve_exact(len).map_err(|_| alloc_error())?;
        cells.resize(len, 0);
        Ok(FrameBuffer {
            width,
            height,
            cells,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True for a buffer with no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    fn offset(&self, col: usize, row: usize) -> usize {
        assert!(
            col < self.width && row < self.height,
            "pixel ({}, {}) outside a {}x{} buffer",
            col,
            row,
            self.width,
            self.height
        );
        row * self.width + col
    }

    /// Store the escape count of one pixel.
    #[inline]
    pub fn set(&mut self, col: usize, row: usize, value: u32) {
        let offset = self.offset(col, row);
        self.cells[offset] = value;
    }

    /// Read the escape count of one pixel.
    #[inline]
    pub fn get(&self, col: usize, row: usize) -> u32 {
        self.cells[self.offset(col, row)]
    }

    /// All the cells, row after row.
    pub fn as_slice(&self) -> &[u32] {
        &self.cells
    }

    /// The cells of a run of rows.
    pub fn rows(&self, range: RowRange) -> &[u32] {
        &self.cells[range.start * self.width..range.end * self.width]
    }

    /// The cells of a run of rows, writable.
    pub fn rows_in_mut(&mut self, range: RowRange) -> &mut [u32] {
        let width = self.width;
        &mut self.cells[range.start * width..range.end * width]
    }

    /// Every row as its own writable slice.
    pub fn rows_mut(&mut self) -> ChunksMut<'_, u32> {
        self.cells.chunks_mut(self.width)
    }

    /// Splits the buffer into one writable slice per block.  The blocks
    /// must be sorted, disjoint and within the buffer; gaps between them
    /// are skipped.
    pub fn blocks_mut(&mut self, blocks: &[RowRange]) -> Result<Vec<&mut [u32]>> {
        let (width, height) = (self.width, self.height);
        let mut rest: &mut [u32] = &mut self.cells;
        let mut consumed = 0;
        let mut slices = Vec::with_capacity(blocks.len());
        for block in blocks {
            if block.start < consumed || block.end > height || block.end < block.start {
                return Err(Error::Configuration(format!(
                    "row block {} overlaps its neighbour or leaves the {}-row buffer",
                    block, height
                )));
            }
            let tail = rest;
            let (_, tail) = tail.split_at_mut((block.start - consumed) * width);
            let (slice, tail) = tail.split_at_mut(block.len() * width);
            slices.push(slice);
            rest = tail;
            consumed = block.end;
        }
        Ok(slices)
    }

    /// Installs a block of rows computed elsewhere.
    pub fn copy_rows(&mut self, range: RowRange, cells: &[u32]) -> Result<()> {
        if range.end > self.height || cells.len() != range.len() * self.width {
            return Err(Error::Protocol(format!(
                "block for rows {} carries {} cells, expected {}",
                range,
                cells.len(),
                range.len() * self.width
            )));
        }
        self.rows_in_mut(range).copy_from_slice(cells);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_zeroed() {
        let fb = FrameBuffer::new(4, 3).unwrap();
        assert_eq!(fb.len(), 12);
        assert!(fb.as_slice().iter().all(|&c| c == 0));
    }

    #[test]
    fn absurd_allocation_fails_cleanly() {
        match FrameBuffer::new(usize::max_value(), 2) {
            Err(Error::Allocation { .. }) => {}
            other => panic!("expected an allocation error, got {:?}", other),
        }
    }

    #[test]
    fn empty_buffer_is_a_configuration_error() {
        assert!(FrameBuffer::new(0, 3).is_err());
        assert!(FrameBuffer::new(3, 0).is_err());
    }

    #[test]
    fn set_then_get_is_row_major() {
        let mut fb = FrameBuffer::new(4, 3).unwrap();
        fb.set(3, 1, 42);
        assert_eq!(fb.get(3, 1), 42);
        assert_eq!(fb.as_slice()[7], 42);
        assert_eq!(fb.rows(RowRange::new(1, 2).unwrap()), &[0, 0, 0, 42]);
    }

    #[test]
    #[should_panic]
    fn get_outside_the_buffer_panics() {
        let fb = FrameBuffer::new(4, 3).unwrap();
        fb.get(4, 0);
    }

    #[test]
    fn blocks_are_disjoint_views() {
        let mut fb = FrameBuffer::new(2, 5).unwrap();
        let blocks = [RowRange { start: 0, end: 2 }, RowRange { start: 3, end: 5 }];
        {
            let mut slices = fb.blocks_mut(&blocks).unwrap();
            assert_eq!(slices[0].len(), 4);
            assert_eq!(slices[1].len(), 4);
            for c in slices[0].iter_mut() {
                *c = 1;
            }
            for c in slices[1].iter_mut() {
                *c = 2;
            }
        }
        assert_eq!(fb.as_slice(), &[1, 1, 1, 1, 0, 0, 2, 2, 2, 2]);
    }

    #[test]
    fn overlapping_blocks_are_refused() {
        let mut fb = FrameBuffer::new(2, 5).unwrap();
        let blocks = [RowRange { start: 0, end: 3 }, RowRange { start: 2, end: 5 }];
        assert!(fb.blocks_mut(&blocks).is_err());
        let beyond = [RowRange { start: 4, end: 6 }];
        assert!(fb.blocks_mut(&beyond).is_err());
    }

    #[test]
    fn copy_rows_checks_the_shape() {
        let mut fb = FrameBuffer::new(3, 4).unwrap();
        let range = RowRange { start: 1, end: 3 };
        fb.copy_rows(range, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(fb.rows(range), &[1, 2, 3, 4, 5, 6]);
        assert!(fb.copy_rows(range, &[1, 2, 3]).is_err());
    }
}
