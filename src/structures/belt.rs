//! Conveyor belts: 8x8 tile blocks forming horizontal runs.

use super::{class, footprint_is_clear, footprint_is_placeable};
use crate::cell::Cell;
use crate::chunk::Grid;
use crate::cluster::ClusterManager;
use crate::constants::{BELT_BLOCK, BELT_CARRY_SPEED};
use crate::error::{EngineError, PlacementResult};
use crate::material::{ids, Behavior, MaterialTable};
use ahash::AHashMap;

#[derive(Debug, Clone, Copy)]
pub struct BeltTile {
    pub direction: i8,
    pub belt_id: u16,
    pub is_ghost: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct BeltRun {
    pub row_y: i64,
    pub min_x: i64,
    pub max_x: i64,
    pub direction: i8,
    /// Ticks between one-cell advances of cargo; `0` means the belt never
    /// moves anything.
    pub speed: u16,
    pub frame_offset: u16,
}

#[derive(Default)]
pub struct BeltStore {
    tiles: AHashMap<(i64, i64), BeltTile>,
    runs: AHashMap<u16, BeltRun>,
    next_id: u16,
}

impl BeltStore {
    fn snap(v: i64) -> i64 {
        v.div_euclid(BELT_BLOCK as i64) * BELT_BLOCK as i64
    }

    pub fn place(
        &mut self,
        grid: &mut Grid,
        materials: &MaterialTable,
        x: i64,
        y: i64,
        direction: i8,
        speed: u16,
    ) -> Result<PlacementResult, EngineError> {
        let bx = Self::snap(x);
        let by = Self::snap(y);
        let block = BELT_BLOCK as i64;
        if !grid.in_bounds(bx, by) || !grid.in_bounds(bx + block - 1, by + block - 1) {
            return Err(EngineError::OutOfBounds { x, y, width: grid.width, height: grid.height });
        }
        if !footprint_is_placeable(grid, materials, bx, by, block, block) {
            return Ok(PlacementResult::Invalid);
        }

        let is_ghost = !footprint_is_clear(grid, bx, by, block, block);
        // The block's own rows are all `BELT_TILE` (static); cargo rides the
        // open row directly above, so the run's reference row is the block's
        // top edge and `move_cells` scans starting at `row_y - 1`.
        let row_y = by;

        let belt_id = self.merge_or_create(bx, by, block, direction, row_y, speed);

        for yy in by..by + block {
            for xx in bx..bx + block {
                self.tiles.insert((xx, yy), BeltTile { direction, belt_id, is_ghost });
            }
        }

        if !is_ghost {
            for yy in by..by + block {
                for xx in bx..bx + block {
                    let _ = grid.set_cell(
                        xx,
                        yy,
                        Cell { material_id: ids::BELT_TILE, structure_id: class::BELT, ..Cell::AIR },
                    );
                }
            }
            grid.mark_chunk_dirty_at(bx, by);
        }

        Ok(if is_ghost { PlacementResult::ValidGhost } else { PlacementResult::Valid })
    }

    fn merge_or_create(&mut self, bx: i64, by: i64, block: i64, direction: i8, row_y: i64, speed: u16) -> u16 {
        let left_id = self.find_run_ending_at(row_y, direction, speed, bx - block);
        let right_id = self.find_run_starting_at(row_y, direction, speed, bx + block);

        if let Some(id) = left_id {
            self.runs.get_mut(&id).unwrap().max_x = bx + block - 1;
            return id;
        }
        if let Some(id) = right_id {
            self.runs.get_mut(&id).unwrap().min_x = bx;
            return id;
        }

        self.next_id = self.next_id.wrapping_add(1).max(1);
        let id = self.next_id;
        self.runs.insert(
            id,
            BeltRun { row_y, min_x: bx, max_x: bx + block - 1, direction, speed, frame_offset: 0 },
        );
        id
    }

    fn find_run_ending_at(&self, row_y: i64, direction: i8, speed: u16, max_x: i64) -> Option<u16> {
        self.runs
            .iter()
            .find(|(_, r)| {
                r.row_y == row_y && r.direction == direction && r.speed == speed && r.max_x == max_x + BELT_BLOCK as i64 - 1
            })
            .map(|(id, _)| *id)
    }

    fn find_run_starting_at(&self, row_y: i64, direction: i8, speed: u16, min_x: i64) -> Option<u16> {
        self.runs
            .iter()
            .find(|(_, r)| r.row_y == row_y && r.direction == direction && r.speed == speed && r.min_x == min_x)
            .map(|(id, _)| *id)
    }

    /// Removes the belt block containing `(x, y)`, splitting its run if the
    /// block sat in the middle.
    pub fn remove(&mut self, grid: &mut Grid, x: i64, y: i64) -> bool {
        let bx = Self::snap(x);
        let by = Self::snap(y);
        let block = BELT_BLOCK as i64;
        let Some(&tile) = self.tiles.get(&(bx, by)) else { return false };
        let Some(&run) = self.runs.get(&tile.belt_id) else { return false };

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

        if bx == run.min_x {
            if bx + block - 1 >= run.max_x {
                self.runs.remove(&tile.belt_id);
            } else {
                self.runs.get_mut(&tile.belt_id).unwrap().min_x = bx + block;
            }
        } else if bx + block - 1 == run.max_x {
            self.runs.get_mut(&tile.belt_id).unwrap().max_x = bx - 1;
        } else {
            self.runs.get_mut(&tile.belt_id).unwrap().max_x = bx - 1;
            self.next_id = self.next_id.wrapping_add(1).max(1);
            let right_id = self.next_id;
            self.runs.insert(
                right_id,
                BeltRun {
                    row_y: run.row_y,
                    min_x: bx + block,
                    max_x: run.max_x,
                    direction: run.direction,
                    speed: run.speed,
                    frame_offset: run.frame_offset,
                },
            );
            for yy in run.row_y + 1 - block..=run.row_y {
                for xx in bx + block..=run.max_x {
                    if let Some(t) = self.tiles.get_mut(&(xx, yy)) {
                        t.belt_id = right_id;
                    }
                }
            }
        }
        true
    }

    pub(crate) fn activate_ghosts(&mut self, grid: &mut Grid) {
        let block = BELT_BLOCK as i64;
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
                        if let Some(tile) = self.tiles.get_mut(&(xx, yy)) {
                            tile.is_ghost = false;
                        }
                        let _ = grid.set_cell(
                            xx,
                            yy,
                            Cell { material_id: ids::BELT_TILE, structure_id: class::BELT, ..Cell::AIR },
                        );
                    }
                }
                grid.mark_chunk_dirty_at(bx, by);
            }
        }
    }

    /// Cell-move job: advances cargo on every belt run whose
    /// schedule fires this tick.
    pub fn move_cells(&self, grid: &mut Grid, materials: &MaterialTable, frame: u16) {
        for run in self.runs.values() {
            if run.speed == 0 || frame.wrapping_sub(run.frame_offset) % run.speed != 0 {
                continue;
            }
            let mut xs: Vec<i64> = (run.min_x..=run.max_x).collect();
            if run.direction > 0 {
                xs.reverse();
            }
            for x in xs {
                let mut y = run.row_y - 1;
                loop {
                    let Some(cell) = grid.get_cell(x, y) else { break };
                    if cell.owner_id != 0 {
                        break;
                    }
                    if !cell.is_air() {
                        let def = materials.get(cell.material_id);
                        if def.behavior == Behavior::Static {
                            break;
                        }
                        if matches!(def.behavior, Behavior::Powder | Behavior::Liquid) {
                            let dst_x = x + run.direction as i64;
                            if let Some(dst) = grid.get_cell(dst_x, y) {
                                if dst.is_air() {
                                    let _ = grid.set_cell(dst_x, y, cell);
                                    let _ = grid.set_cell(x, y, Cell::AIR);
                                }
                            }
                        }
                    }
                    y -= 1;
                }
            }
        }
    }

    /// Structure force injection for clusters riding a belt surface.
    pub fn inject_cluster_forces(&self, clusters: &mut ClusterManager, width: usize, height: usize) {
        for id in clusters.cluster_ids() {
            for (x, y) in clusters.pixel_world_cells(id, width, height) {
                if let Some(run) = self.runs.values().find(|r| y == r.row_y - 1 && x >= r.min_x && x <= r.max_x) {
                    clusters.apply_belt_carry(id, run.direction as f32 * BELT_CARRY_SPEED);
                    break;
                }
            }
        }
    }
}
