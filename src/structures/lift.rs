//! Vertical lifts: 8x8 tile blocks forming vertical columns.

use super::{class, footprint_is_clear, footprint_is_placeable};
use crate::cell::Cell;
use crate::chunk::Grid;
use crate::cluster::ClusterManager;
use crate::constants::{GRAVITY_PER_TICK, LIFT_BLOCK, LIFT_MULT};
use crate::error::{EngineError, PlacementResult};
use crate::material::{ids, MaterialTable};
use ahash::AHashMap;

#[derive(Debug, Clone, Copy)]
pub struct LiftTile {
    pub lift_id: u16,
    pub is_ghost: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct LiftColumn {
    pub col_x: i64,
    pub min_y: i64,
    pub max_y: i64,
    /// Host-supplied, kept per the wire format; the actual force applied to
    /// a cluster is mass-scaled and derived from `LIFT_MULT`, not this value.
    pub lift_force: f32,
}

#[derive(Default)]
pub struct LiftStore {
    tiles: AHashMap<(i64, i64), LiftTile>,
    columns: AHashMap<u16, LiftColumn>,
    next_id: u16,
}

impl LiftStore {
    fn snap(v: i64) -> i64 {
        v.div_euclid(LIFT_BLOCK as i64) * LIFT_BLOCK as i64
    }

    pub fn place(
        &mut self,
        grid: &mut Grid,
        materials: &MaterialTable,
        x: i64,
        y: i64,
        lift_force: f32,
    ) -> Result<PlacementResult, EngineError> {
        let bx = Self::snap(x);
        let by = Self::snap(y);
        let block = LIFT_BLOCK as i64;
        if !grid.in_bounds(bx, by) || !grid.in_bounds(bx + block - 1, by + block - 1) {
            return Err(EngineError::OutOfBounds { x, y, width: grid.width, height: grid.height });
        }
        if !footprint_is_placeable(grid, materials, bx, by, block, block) {
            return Ok(PlacementResult::Invalid);
        }
        let is_ghost = !footprint_is_clear(grid, bx, by, block, block);

        let lift_id = self.merge_or_create(bx, by, block, lift_force);

        for yy in by..by + block {
            for xx in bx..bx + block {
                self.tiles.insert((xx, yy), LiftTile { lift_id, is_ghost });
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
                let _ = grid.set_cell(
                    xx,
                    yy,
                    Cell { material_id: ids::LIFT_TILE, structure_id: class::LIFT, ..Cell::AIR },
                );
            }
        }
        grid.mark_chunk_dirty_at(bx, by);
    }

    fn merge_or_create(&mut self, bx: i64, by: i64, block: i64, lift_force: f32) -> u16 {
        let above = self.columns.iter().find(|(_, c)| c.col_x == bx && c.min_y == by + block).map(|(id, _)| *id);
        let below = self.columns.iter().find(|(_, c)| c.col_x == bx && c.max_y == by - 1).map(|(id, _)| *id);

        if let Some(id) = above {
            self.columns.get_mut(&id).unwrap().min_y = by;
            return id;
        }
        if let Some(id) = below {
            self.columns.get_mut(&id).unwrap().max_y = by + block - 1;
            return id;
        }
        self.next_id = self.next_id.wrapping_add(1).max(1);
        let id = self.next_id;
        self.columns.insert(id, LiftColumn { col_x: bx, min_y: by, max_y: by + block - 1, lift_force });
        id
    }

    pub fn remove(&mut self, grid: &mut Grid, x: i64, y: i64) -> bool {
        let bx = Self::snap(x);
        let by = Self::snap(y);
        let block = LIFT_BLOCK as i64;
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
        self.columns.remove(&tile.lift_id);
        true
    }

    pub(crate) fn activate_ghosts(&mut self, grid: &mut Grid) {
        let block = LIFT_BLOCK as i64;
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

    /// Upward force injection on clusters inside a lift column. The force
    /// scales with the cluster's own mass so every cluster accelerates
    /// upward at the same rate, slightly exceeding gravity.
    pub fn inject_cluster_forces(&self, clusters: &mut ClusterManager, width: usize, height: usize) {
        for id in clusters.cluster_ids() {
            for (x, y) in clusters.pixel_world_cells(id, width, height) {
                if self.columns.values().any(|c| c.col_x == x && y >= c.min_y && y <= c.max_y) {
                    let mass = clusters.mass(id).unwrap_or(0.0);
                    clusters.apply_lift_force(id, -(GRAVITY_PER_TICK as f32) * LIFT_MULT * mass);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placing_lift_over_air_activates_immediately() {
        let mut grid = Grid::new(64, 64).unwrap();
        let materials = MaterialTable::standard();
        let mut store = LiftStore::default();
        let result = store.place(&mut grid, &materials, 16, 16, 1.2).unwrap();
        assert_eq!(result, PlacementResult::Valid);
        assert_eq!(grid.get_cell(16, 16).unwrap().material_id, ids::LIFT_TILE);
    }

    #[test]
    fn vertically_adjacent_lifts_merge_into_one_column() {
        let mut grid = Grid::new(64, 64).unwrap();
        let materials = MaterialTable::standard();
        let mut store = LiftStore::default();
        store.place(&mut grid, &materials, 0, 0, 1.2).unwrap();
        store.place(&mut grid, &materials, 0, 8, 1.2).unwrap();
        assert_eq!(store.columns.len(), 1);
        let col = store.columns.values().next().unwrap();
        assert_eq!((col.min_y, col.max_y), (0, 15));
    }
}
