//! Per-cell behavior rules and the checkerboard dispatch.

mod gas;
mod liquid;
mod powder;

use crate::cell::Cell;
use crate::chunk::{Grid, RawCells};
use crate::error::Diagnostics;
use crate::material::{Behavior, MaterialTable};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};

/// Runs the full four-group checkerboard pass over every selected chunk.
pub fn simulate_tick(grid: &mut Grid, materials: &MaterialTable, frame: u16, diagnostics: &mut Diagnostics) {
    let raw = grid.raw_cells_mut();
    let groups = grid.select_active_chunks();
    let simulated = AtomicU64::new(0);

    for group in &groups {
        group.par_iter().for_each(|&chunk_idx| {
            simulate_chunk(raw, grid, materials, frame, chunk_idx, &simulated);
        });
    }

    diagnostics.cells_simulated += simulated.load(Ordering::Relaxed);
}

fn simulate_chunk(
    raw: RawCells,
    grid: &Grid,
    materials: &MaterialTable,
    frame: u16,
    chunk_idx: usize,
    simulated: &AtomicU64,
) {
    let cx = chunk_idx % grid.chunk_cols;
    let cy = chunk_idx / grid.chunk_cols;
    let (x0, y0, x1, y1) = grid.chunk_core_bounds(cx, cy);

    // Bottom-up Y so a gravity cascade falls in one tick; row-alternating X
    // to remove sideways bias.
    for y in (y0..y1).rev() {
        let left_to_right = y & 1 == 0;
        if left_to_right {
            for x in x0..x1 {
                simulate_cell(raw, grid, materials, frame, x as i64, y as i64, simulated);
            }
        } else {
            for x in (x0..x1).rev() {
                simulate_cell(raw, grid, materials, frame, x as i64, y as i64, simulated);
            }
        }
    }
}

fn simulate_cell(
    raw: RawCells,
    grid: &Grid,
    materials: &MaterialTable,
    frame: u16,
    x: i64,
    y: i64,
    simulated: &AtomicU64,
) {
    let cell = unsafe { raw.get(x as usize, y as usize) };
    if cell.frame_updated == frame || cell.is_air() || !cell.is_loose() {
        return;
    }
    let def = materials.get(cell.material_id);
    if def.behavior == Behavior::Static {
        return;
    }

    let mut stamped = cell;
    stamped.frame_updated = frame;
    unsafe { raw.set(x as usize, y as usize, stamped) };
    simulated.fetch_add(1, Ordering::Relaxed);

    match def.behavior {
        Behavior::Powder => powder::step(raw, grid, materials, frame, x, y),
        Behavior::Liquid => liquid::step(raw, grid, materials, frame, x, y),
        Behavior::Gas => gas::step(raw, grid, materials, frame, x, y),
        Behavior::Static => unreachable!(),
    }
}

/// True if a cell at `(x, y)` can receive a cell of `my_density`: out of bounds never moves into; `Air` always
/// accepts; `Static` never accepts; otherwise only if the mover is denser.
pub(crate) fn can_move_to(
    raw: RawCells,
    grid: &Grid,
    materials: &MaterialTable,
    my_density: u8,
    x: i64,
    y: i64,
) -> bool {
    if !grid.in_bounds(x, y) {
        return false;
    }
    let target = unsafe { raw.get(x as usize, y as usize) };
    if target.is_air() {
        return true;
    }
    let def = materials.get(target.material_id);
    if def.behavior == Behavior::Static {
        return false;
    }
    my_density > def.density
}

/// Moves the cell at `src` to `dst`, swapping in whatever was there
/// (displacement). The displaced cell's `frame_updated` is stamped to
/// `frame` so it isn't re-processed later in this pass. Returns `false`
/// (no-op) if `dst` cannot accept the mover.
pub(crate) fn try_move(
    raw: RawCells,
    grid: &Grid,
    materials: &MaterialTable,
    frame: u16,
    src: (i64, i64),
    dst: (i64, i64),
) -> bool {
    if !grid.in_bounds(dst.0, dst.1) {
        return false;
    }
    let moving = unsafe { raw.get(src.0 as usize, src.1 as usize) };
    let moving_density = materials.get(moving.material_id).density;
    let target = unsafe { raw.get(dst.0 as usize, dst.1 as usize) };

    if !target.is_air() {
        let target_def = materials.get(target.material_id);
        if target_def.behavior == Behavior::Static || moving_density <= target_def.density {
            return false;
        }
    }

    let displaced = if target.is_air() {
        Cell::AIR
    } else {
        let mut d = target;
        d.frame_updated = frame;
        d
    };

    unsafe {
        raw.set(dst.0 as usize, dst.1 as usize, moving);
        raw.set(src.0 as usize, src.1 as usize, displaced);
    }
    grid.mark_dirty(src.0, src.1);
    grid.mark_dirty(dst.0, dst.1);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{ids, MaterialTable};

    #[test]
    fn single_sand_grain_falls_through_air() {
        let mut grid = Grid::new(64, 64).unwrap();
        grid.set_cell(10, 10, Cell { material_id: ids::SAND, ..Cell::AIR }).unwrap();
        let materials = MaterialTable::standard();
        let mut diagnostics = Diagnostics::default();
        for frame in 0..20u16 {
            simulate_tick(&mut grid, &materials, frame, &mut diagnostics);
        }
        assert!(grid.get_cell(10, 10).unwrap().is_air());
        let landed_y = (0..64).find(|&y| !grid.get_cell(10, y).unwrap().is_air());
        assert!(landed_y.is_some());
    }

    #[test]
    fn sand_does_not_fall_through_stone() {
        let mut grid = Grid::new(64, 64).unwrap();
        grid.set_cell(10, 11, Cell { material_id: ids::STONE, ..Cell::AIR }).unwrap();
        grid.set_cell(10, 10, Cell { material_id: ids::SAND, ..Cell::AIR }).unwrap();
        let materials = MaterialTable::standard();
        let mut diagnostics = Diagnostics::default();
        for frame in 0..10u16 {
            simulate_tick(&mut grid, &materials, frame, &mut diagnostics);
        }
        assert_eq!(grid.get_cell(10, 11).unwrap().material_id, ids::STONE);
        assert_eq!(grid.get_cell(10, 10).unwrap().material_id, ids::SAND);
    }

    #[test]
    fn no_cell_is_simulated_twice_in_one_tick() {
        let mut grid = Grid::new(64, 64).unwrap();
        for x in 0..64 {
            grid.set_cell(x, 5, Cell { material_id: ids::SAND, ..Cell::AIR }).unwrap();
        }
        let materials = MaterialTable::standard();
        let mut diagnostics = Diagnostics::default();
        simulate_tick(&mut grid, &materials, 0, &mut diagnostics);
        assert_eq!(diagnostics.cells_simulated, 64);
    }
}
