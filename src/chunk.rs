//! Dense grid of cells plus per-chunk dirty metadata and the checkerboard
//! scheduler.
//!
//! The cell buffer is one flat `Vec<Cell>`; chunk metadata lives in a
//! parallel `Vec<Chunk>` whose fields are atomics so concurrent cell-sim
//! workers can widen a chunk's dirty rect through a shared `&Chunk` with no
//! locks.

use crate::cell::Cell;
use crate::constants::{CHUNK_SIZE, HALO};
use crate::error::EngineError;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, Ordering};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChunkFlags: u8 {
        const IS_DIRTY = 1 << 0;
        const HAS_STRUCTURE = 1 << 1;
    }
}

const RELAXED: Ordering = Ordering::Relaxed;
/// Sentinel rect bounds meaning "empty": `min > max` on both axes.
const EMPTY_MIN: u16 = CHUNK_SIZE as u16;
const EMPTY_MAX: u16 = 0;

/// Per-chunk scheduling/dirty-tracking record. All fields are
/// atomics so the cell simulator can hand out shared `&Chunk` references to
/// every worker in a checkerboard group.
#[derive(Debug)]
pub struct Chunk {
    min_x: AtomicU16,
    min_y: AtomicU16,
    max_x: AtomicU16,
    max_y: AtomicU16,
    flags: AtomicU8,
    active_last_frame: AtomicBool,
    structure_mask: AtomicU16,
}

impl Chunk {
    fn new() -> Self {
        Self {
            min_x: AtomicU16::new(EMPTY_MIN),
            min_y: AtomicU16::new(EMPTY_MIN),
            max_x: AtomicU16::new(EMPTY_MAX),
            max_y: AtomicU16::new(EMPTY_MAX),
            flags: AtomicU8::new(0),
            active_last_frame: AtomicBool::new(false),
            structure_mask: AtomicU16::new(0),
        }
    }

    /// Widen the local dirty rect to cover `(lx, ly)` and set `IS_DIRTY`.
    /// Safe to call from any number of concurrent workers.
    #[inline]
    pub fn mark_dirty_local(&self, lx: u16, ly: u16) {
        self.min_x.fetch_min(lx, RELAXED);
        self.min_y.fetch_min(ly, RELAXED);
        self.max_x.fetch_max(lx, RELAXED);
        self.max_y.fetch_max(ly, RELAXED);
        self.flags.fetch_or(ChunkFlags::IS_DIRTY.bits(), RELAXED);
    }

    pub fn mark_all_dirty(&self) {
        self.min_x.store(0, RELAXED);
        self.min_y.store(0, RELAXED);
        self.max_x.store(CHUNK_SIZE as u16 - 1, RELAXED);
        self.max_y.store(CHUNK_SIZE as u16 - 1, RELAXED);
        self.flags.fetch_or(ChunkFlags::IS_DIRTY.bits(), RELAXED);
    }

    pub fn set_has_structure(&self, has: bool) {
        if has {
            self.flags.fetch_or(ChunkFlags::HAS_STRUCTURE.bits(), RELAXED);
        } else {
            self.flags.fetch_and(!ChunkFlags::HAS_STRUCTURE.bits(), RELAXED);
        }
    }

    pub fn has_structure(&self) -> bool {
        ChunkFlags::from_bits_truncate(self.flags.load(RELAXED)).contains(ChunkFlags::HAS_STRUCTURE)
    }

    pub fn is_dirty(&self) -> bool {
        ChunkFlags::from_bits_truncate(self.flags.load(RELAXED)).contains(ChunkFlags::IS_DIRTY)
    }

    pub fn active_last_frame(&self) -> bool {
        self.active_last_frame.load(RELAXED)
    }

    /// Selection rule: `IsDirty || HasStructure || active_last_frame`.
    pub fn is_selected(&self) -> bool {
        self.is_dirty() || self.has_structure() || self.active_last_frame()
    }

    /// Local dirty rect, or `None` if empty (`min > max`).
    pub fn dirty_rect(&self) -> Option<(u16, u16, u16, u16)> {
        let (min_x, min_y, max_x, max_y) = (
            self.min_x.load(RELAXED),
            self.min_y.load(RELAXED),
            self.max_x.load(RELAXED),
            self.max_y.load(RELAXED),
        );
        if min_x > max_x || min_y > max_y {
            None
        } else {
            Some((min_x, min_y, max_x, max_y))
        }
    }

    pub fn structure_mask(&self) -> u16 {
        self.structure_mask.load(RELAXED)
    }

    pub fn set_structure_mask(&self, mask: u16) {
        self.structure_mask.store(mask, RELAXED);
    }

    /// End-of-tick bookkeeping: copy `IsDirty` into
    /// `active_last_frame`; clear `IsDirty` and the rect only if the chunk
    /// carries no structure (structure chunks always re-simulate).
    pub fn decay(&self) {
        let was_dirty = self.is_dirty();
        self.active_last_frame.store(was_dirty, RELAXED);
        if !self.has_structure() {
            self.flags.fetch_and(!ChunkFlags::IS_DIRTY.bits(), RELAXED);
            self.min_x.store(EMPTY_MIN, RELAXED);
            self.min_y.store(EMPTY_MIN, RELAXED);
            self.max_x.store(EMPTY_MAX, RELAXED);
            self.max_y.store(EMPTY_MAX, RELAXED);
        }
    }
}

/// Raw, shared-mutable view over the grid's flat cell buffer.
///
/// # Safety
/// Holders must only write to cells within the extended (core + halo)
/// region of a chunk they were dispatched for. The checkerboard group
/// spacing (`Grid::select_active_chunks`) guarantees those regions never
/// overlap between two chunks in the same group, so this is race-free even
/// though the type itself performs no bounds- or aliasing-checking.
#[derive(Clone, Copy)]
pub(crate) struct RawCells {
    ptr: *mut Cell,
    pub width: usize,
    pub height: usize,
}

unsafe impl Send for RawCells {}
unsafe impl Sync for RawCells {}

impl RawCells {
    #[inline(always)]
    pub unsafe fn get(self, x: usize, y: usize) -> Cell {
        *self.ptr.add(y * self.width + x)
    }

    #[inline(always)]
    pub unsafe fn set(self, x: usize, y: usize, cell: Cell) {
        *self.ptr.add(y * self.width + x) = cell;
    }

    #[inline(always)]
    pub fn in_bounds(self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }
}

/// The simulated world's cell buffer and chunk metadata.
pub struct Grid {
    pub width: usize,
    pub height: usize,
    cells: Vec<Cell>,
    chunks: Vec<Chunk>,
    pub chunk_cols: usize,
    pub chunk_rows: usize,
}

impl Grid {
    pub fn new(width: usize, height: usize) -> Result<Self, EngineError> {
        if width == 0 || height == 0 || width % CHUNK_SIZE != 0 || height % CHUNK_SIZE != 0 {
            return Err(EngineError::InvalidGridDimensions {
                width,
                height,
                chunk_size: CHUNK_SIZE,
            });
        }
        let chunk_cols = width / CHUNK_SIZE;
        let chunk_rows = height / CHUNK_SIZE;
        let mut chunks = Vec::with_capacity(chunk_cols * chunk_rows);
        chunks.resize_with(chunk_cols * chunk_rows, Chunk::new);
        Ok(Self {
            width,
            height,
            cells: vec![Cell::AIR; width * height],
            chunks,
            chunk_cols,
            chunk_rows,
        })
    }

    #[inline]
    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    pub fn get_cell(&self, x: i64, y: i64) -> Option<Cell> {
        if self.in_bounds(x, y) {
            Some(self.cells[self.index(x as usize, y as usize)])
        } else {
            None
        }
    }

    /// Host write path. Only valid between ticks.
    pub fn set_cell(&mut self, x: i64, y: i64, cell: Cell) -> Result<(), EngineError> {
        if !self.in_bounds(x, y) {
            return Err(EngineError::OutOfBounds { x, y, width: self.width, height: self.height });
        }
        let idx = self.index(x as usize, y as usize);
        self.cells[idx] = cell;
        self.mark_dirty(x, y);
        Ok(())
    }

    #[inline]
    pub fn chunk_coords(&self, x: usize, y: usize) -> (usize, usize) {
        (x / CHUNK_SIZE, y / CHUNK_SIZE)
    }

    #[inline]
    pub fn chunk_index(&self, cx: usize, cy: usize) -> usize {
        cy * self.chunk_cols + cx
    }

    pub fn chunk_at(&self, idx: usize) -> &Chunk {
        &self.chunks[idx]
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Widen the owning chunk's dirty rect to cover `(x, y)`.
    pub fn mark_dirty(&self, x: i64, y: i64) {
        if !self.in_bounds(x, y) {
            return;
        }
        let (x, y) = (x as usize, y as usize);
        let (cx, cy) = self.chunk_coords(x, y);
        let idx = self.chunk_index(cx, cy);
        let lx = (x - cx * CHUNK_SIZE) as u16;
        let ly = (y - cy * CHUNK_SIZE) as u16;
        self.chunks[idx].mark_dirty_local(lx, ly);
    }

    /// Host op: forces a chunk to be scheduled next tick regardless of
    /// whether any cell inside it actually changed.
    pub fn mark_chunk_dirty_at(&self, x: i64, y: i64) {
        if !self.in_bounds(x, y) {
            return;
        }
        let (cx, cy) = self.chunk_coords(x as usize, y as usize);
        self.chunks[self.chunk_index(cx, cy)].mark_all_dirty();
    }

    /// Core (non-halo) world-space rect for a chunk, `[x0, x1) x [y0, y1)`.
    pub fn chunk_core_bounds(&self, cx: usize, cy: usize) -> (usize, usize, usize, usize) {
        let x0 = cx * CHUNK_SIZE;
        let y0 = cy * CHUNK_SIZE;
        (x0, y0, x0 + CHUNK_SIZE, y0 + CHUNK_SIZE)
    }

    /// Core rect expanded by `HALO` in every direction and clipped to the
    /// grid: the region a chunk's worker may read and conditionally write.
    pub fn chunk_extended_bounds(&self, cx: usize, cy: usize) -> (usize, usize, usize, usize) {
        let (x0, y0, x1, y1) = self.chunk_core_bounds(cx, cy);
        let ex0 = x0.saturating_sub(HALO);
        let ey0 = y0.saturating_sub(HALO);
        let ex1 = (x1 + HALO).min(self.width);
        let ey1 = (y1 + HALO).min(self.height);
        (ex0, ey0, ex1, ey1)
    }

    /// Partition selected chunks into the four checkerboard groups
    ///: `group = (cx & 1) | ((cy & 1) << 1)`.
    pub fn select_active_chunks(&self) -> [Vec<usize>; 4] {
        let mut groups: [Vec<usize>; 4] = Default::default();
        for cy in 0..self.chunk_rows {
            for cx in 0..self.chunk_cols {
                let idx = self.chunk_index(cx, cy);
                if self.chunks[idx].is_selected() {
                    let group = (cx & 1) | ((cy & 1) << 1);
                    groups[group].push(idx);
                }
            }
        }
        groups
    }

    /// End-of-tick dirty-state decay across every chunk.
    pub fn decay_all(&self) {
        for chunk in &self.chunks {
            chunk.decay();
        }
    }

    /// Zero-allocation iterator over chunks the renderer/collider bridge
    /// should re-fetch this tick.
    pub fn active_dirty_chunks(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.chunks.len()).filter(move |&idx| {
            let c = &self.chunks[idx];
            c.is_dirty() || c.active_last_frame()
        })
    }

    pub(crate) fn raw_cells_mut(&mut self) -> RawCells {
        RawCells { ptr: self.cells.as_mut_ptr(), width: self.width, height: self.height }
    }

    pub(crate) fn chunks_slice(&self) -> &[Chunk] {
        &self.chunks
    }
}
