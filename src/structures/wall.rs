//! Static walls: 8x8 blocks with no per-tick work beyond terrain colliders.

use super::{class, footprint_is_clear, footprint_is_placeable};
use crate::cell::Cell;
use crate::chunk::Grid;
use crate::constants::WALL_BLOCK;
use crate::error::{EngineError, PlacementResult};
use crate::material::{ids, MaterialTable};
use ahash::AHashMap;

#[derive(Debug, Clone, Copy)]
pub struct WallTile {
    pub is_ghost: bool,
}

#[derive(Default)]
pub struct WallStore {
    tiles: AHashMap<(i64, i64), WallTile>,
}

impl WallStore {
    fn snap(v: i64) -> i64 {
        v.div_euclid(WALL_BLOCK as i64) * WALL_BLOCK as i64
    }

    pub fn place(&mut self, grid: &mut Grid, materials: &MaterialTable, x: i64, y: i64) -> Result<PlacementResult, EngineError> {
        let bx = Self::snap(x);
        let by = Self::snap(y);
        let block = WALL_BLOCK as i64;
        if !grid.in_bounds(bx, by) || !grid.in_bounds(bx + block - 1, by + block - 1) {
            return Err(EngineError::OutOfBounds { x, y, width: grid.width, height: grid.height });
        }
        if !footprint_is_placeable(grid, materials, bx, by, block, block) {
            return Ok(PlacementResult::Invalid);
        }
        let is_ghost = !footprint_is_clear(grid, bx, by, block, block);
        for yy in by..by + block {
            for xx in bx..bx + block {
                self.tiles.insert((xx, yy), WallTile { is_ghost });
            }
        }
        if !is_ghost {
            self.write_tiles(grid, bx, by, block);
        }
        Ok(if is_ghost { PlacementResult::ValidGhost } else { PlacementResult::Valid })
    }

    fn write_tiles(&self, grid: &mut Grid, bx: i64, by: i64, block: i64) {
        for yy in by..by + block {
            for xx in bx..bx + block {
                let _ = grid.set_cell(xx, yy, Cell { material_id: ids::WALL_TILE, structure_id: class::WALL, ..Cell::AIR });
            }
        }
        grid.mark_chunk_dirty_at(bx, by);
    }

    pub fn remove(&mut self, grid: &mut Grid, x: i64, y: i64) -> bool {
        let bx = Self::snap(x);
        let by = Self::snap(y);
        let block = WALL_BLOCK as i64;
        let Some(&tile) = self.tiles.get(&(bx, by)) else { return false };
        for yy in by..by + block {
            for xx in bx..bx + block {
                self.tiles.remove(&(xx, yy));
                if !tile.is_ghost {
                    let _ = grid.set_cell(xx, yy, Cell::AIR);
                }
            }
        }
        if !tile.is_ghost {
            grid.mark_chunk_dirty_at(bx, by);
        }
        true
    }

    pub(crate) fn activate_ghosts(&mut self, grid: &mut Grid) {
        let block = WALL_BLOCK as i64;
        let ghost_blocks: Vec<(i64, i64)> = self
            .tiles
            .iter()
            .filter(|(_, t)| t.is_ghost)
            .map(|(&(x, y), _)| (Self::snap(x), Self::snap(y)))
            .collect();
        let mut seen = std::collections::HashSet::new();
        for (bx, by) in ghost_blocks {
            if !seen.insert((bx, by)) {
                continue;
            }
            if footprint_is_clear(grid, bx, by, block, block) {
                for yy in by..by + block {
                    for xx in bx..bx + block {
                        if let Some(t) = self.tiles.get_mut(&(xx, yy)) {
                            t.is_ghost = false;
                        }
                    }
                }
                self.write_tiles(grid, bx, by, block);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placing_wall_over_hard_material_is_rejected() {
        let mut grid = Grid::new(64, 64).unwrap();
        let materials = MaterialTable::standard();
        for yy in 0..8 {
            for xx in 0..8 {
                grid.set_cell(xx, yy, Cell { material_id: ids::STONE, ..Cell::AIR }).unwrap();
            }
        }
        let mut store = WallStore::default();
        let result = store.place(&mut grid, &materials, 0, 0).unwrap();
        assert_eq!(result, PlacementResult::Invalid);
    }

    #[test]
    fn ghost_wall_activates_once_footprint_clears() {
        let mut grid = Grid::new(64, 64).unwrap();
        let materials = MaterialTable::standard();
        for yy in 0..8 {
            for xx in 0..8 {
                grid.set_cell(xx, yy, Cell { material_id: ids::DIRT, ..Cell::AIR }).unwrap();
            }
        }
        let mut store = WallStore::default();
        let result = store.place(&mut grid, &materials, 0, 0).unwrap();
        assert_eq!(result, PlacementResult::ValidGhost);
        for yy in 0..8 {
            for xx in 0..8 {
                grid.set_cell(xx, yy, Cell::AIR).unwrap();
            }
        }
        store.activate_ghosts(&mut grid);
        assert_eq!(grid.get_cell(3, 3).unwrap().material_id, ids::WALL_TILE);
    }
}
