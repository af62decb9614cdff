//! Pistons: 16x16 blocks with a base bar and a push-chain motor driven by a
//! single global phase shared by every piston.

use super::{class, footprint_is_clear, footprint_is_placeable};
use crate::cell::Cell;
use crate::chunk::Grid;
use crate::cluster::ClusterId;
use crate::constants::{PISTON_BLOCK, PISTON_CYCLE_S, PISTON_DWELL, PISTON_MAX_TRAVEL, PISTON_PUSH_SEARCH};
use crate::error::{Diagnostics, EngineError, PlacementResult};
use crate::material::{ids, Behavior, MaterialTable};
use ahash::AHashMap;

pub type PistonId = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    fn delta(self) -> (i64, i64) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    fn perpendicular(self) -> (i64, i64) {
        let (dx, dy) = self.delta();
        (-dy, dx)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PistonData {
    pub origin_x: i64,
    pub origin_y: i64,
    pub direction: Direction,
    pub current_stroke_t: f32,
    pub last_fill_extent: i32,
    pub plate_cluster_id: Option<ClusterId>,
    pub is_ghost: bool,
}

/// Shared stroke position for every piston: a 3-second cycle with dwell at
/// each extreme.
pub fn global_phase(elapsed_s: f32) -> f32 {
    let cycle = PISTON_CYCLE_S.max(0.001);
    let dwell = PISTON_DWELL.clamp(0.0, 0.49);
    let t = (elapsed_s.rem_euclid(cycle)) / cycle;
    let ramp = 0.5 - dwell;
    if t < dwell {
        0.0
    } else if t < 0.5 {
        ((t - dwell) / ramp).clamp(0.0, 1.0)
    } else if t < 0.5 + dwell {
        1.0
    } else {
        1.0 - ((t - 0.5 - dwell) / ramp).clamp(0.0, 1.0)
    }
}

#[derive(Default)]
pub struct PistonStore {
    pistons: AHashMap<PistonId, PistonData>,
    next_id: PistonId,
}

impl PistonStore {
    fn snap(v: i64) -> i64 {
        v.div_euclid(PISTON_BLOCK as i64) * PISTON_BLOCK as i64
    }

    pub fn place(
        &mut self,
        grid: &mut Grid,
        materials: &MaterialTable,
        x: i64,
        y: i64,
        direction: Direction,
    ) -> Result<PlacementResult, EngineError> {
        let bx = Self::snap(x);
        let by = Self::snap(y);
        let block = PISTON_BLOCK as i64;
        if !grid.in_bounds(bx, by) || !grid.in_bounds(bx + block - 1, by + block - 1) {
            return Err(EngineError::OutOfBounds { x, y, width: grid.width, height: grid.height });
        }
        if !footprint_is_placeable(grid, materials, bx, by, block, block) {
            return Ok(PlacementResult::Invalid);
        }
        let is_ghost = !footprint_is_clear(grid, bx, by, block, block);
        if !is_ghost {
            self.write_tiles(grid, bx, by, block);
        }

        self.next_id = self.next_id.wrapping_add(1).max(1);
        let id = self.next_id;
        self.pistons.insert(
            id,
            PistonData {
                origin_x: bx,
                origin_y: by,
                direction,
                current_stroke_t: 0.0,
                last_fill_extent: 0,
                plate_cluster_id: None,
                is_ghost,
            },
        );
        Ok(if is_ghost { PlacementResult::ValidGhost } else { PlacementResult::Valid })
    }

    fn write_tiles(&self, grid: &mut Grid, bx: i64, by: i64, block: i64) {
        for yy in by..by + block {
            for xx in bx..bx + block {
                let _ = grid.set_cell(xx, yy, Cell { material_id: ids::PISTON_TILE, structure_id: class::PISTON, ..Cell::AIR });
            }
        }
        grid.mark_chunk_dirty_at(bx, by);
    }

    pub(crate) fn activate_ghosts(&mut self, grid: &mut Grid) {
        let block = PISTON_BLOCK as i64;
        let ghosts: Vec<(PistonId, i64, i64)> =
            self.pistons.iter().filter(|(_, p)| p.is_ghost).map(|(&id, p)| (id, p.origin_x, p.origin_y)).collect();
        for (id, bx, by) in ghosts {
            if footprint_is_clear(grid, bx, by, block, block) {
                self.write_tiles(grid, bx, by, block);
                self.pistons.get_mut(&id).unwrap().is_ghost = false;
            }
        }
    }

    pub fn remove(&mut self, grid: &mut Grid, x: i64, y: i64) -> bool {
        let bx = Self::snap(x);
        let by = Self::snap(y);
        let Some((&id, piston)) = self.pistons.iter().find(|(_, p)| p.origin_x == bx && p.origin_y == by) else {
            return false;
        };
        let block = PISTON_BLOCK as i64;
        if !piston.is_ghost {
            let (dx, dy) = piston.direction.delta();
            for extent in 0..=piston.last_fill_extent as i64 {
                let fx = bx + dx * (block + extent);
                let fy = by + dy * (block + extent);
                for i in 0..block {
                    let (px, py) = piston.direction.perpendicular();
                    let _ = grid.set_cell(fx + px * i, fy + py * i, Cell::AIR);
                }
            }
            for yy in by..by + block {
                for xx in bx..bx + block {
                    let _ = grid.set_cell(xx, yy, Cell::AIR);
                }
            }
            grid.mark_chunk_dirty_at(bx, by);
        }
        self.pistons.remove(&id);
        true
    }

    /// Per-tick motor update for every piston.
    pub fn tick(&mut self, grid: &mut Grid, materials: &MaterialTable, elapsed_s: f32, diagnostics: &mut Diagnostics) {
        let stroke_t = global_phase(elapsed_s);
        let ids: Vec<PistonId> = self.pistons.keys().copied().collect();
        for id in ids {
            let (origin, direction, last_extent) = {
                let p = self.pistons.get_mut(&id).unwrap();
                if p.is_ghost {
                    continue;
                }
                p.current_stroke_t = stroke_t;
                ((p.origin_x, p.origin_y), p.direction, p.last_fill_extent)
            };
            let desired = (stroke_t * PISTON_MAX_TRAVEL as f32).round() as i32;
            if desired > last_extent {
                if try_extend(grid, materials, origin, direction, last_extent) {
                    self.pistons.get_mut(&id).unwrap().last_fill_extent += 1;
                } else {
                    diagnostics.piston_stalls += 1;
                }
            } else if desired < last_extent {
                retract(grid, origin, direction, last_extent);
                self.pistons.get_mut(&id).unwrap().last_fill_extent -= 1;
            }
        }
    }
}

fn try_extend(grid: &mut Grid, materials: &MaterialTable, origin: (i64, i64), direction: Direction, extent: i32) -> bool {
    let block = PISTON_BLOCK as i64;
    let (dx, dy) = direction.delta();
    let (px, py) = direction.perpendicular();
    let leading_x = origin.0 + dx * (block + extent as i64);
    let leading_y = origin.1 + dy * (block + extent as i64);

    let mut targets = Vec::with_capacity(PISTON_BLOCK);
    for i in 0..block {
        let rx = leading_x + px * i;
        let ry = leading_y + py * i;
        let mut found = None;
        for step in 1..=PISTON_PUSH_SEARCH as i64 {
            let cx = rx + dx * step;
            let cy = ry + dy * step;
            let Some(cell) = grid.get_cell(cx, cy) else { return false };
            if cell.is_air() {
                found = Some((cx, cy));
                break;
            }
            let def = materials.get(cell.material_id);
            if def.behavior == Behavior::Static {
                return false;
            }
        }
        match found {
            Some(dest) => targets.push((rx, ry, dest)),
            None => return false,
        }
    }

    for (rx, ry, (ex, ey)) in targets {
        let steps = ((ex - rx).abs() + (ey - ry).abs()) / (dx.abs() + dy.abs()).max(1);
        let mut pos = (ex, ey);
        for _ in 0..steps {
            let prev = (pos.0 - dx, pos.1 - dy);
            if let Some(cell) = grid.get_cell(prev.0, prev.1) {
                let _ = grid.set_cell(pos.0, pos.1, cell);
            }
            pos = prev;
        }
        let _ = grid.set_cell(rx, ry, Cell { material_id: ids::PISTON_TILE, structure_id: class::PISTON, ..Cell::AIR });
        grid.mark_dirty(rx, ry);
    }
    true
}

fn retract(grid: &mut Grid, origin: (i64, i64), direction: Direction, extent: i32) {
    let block = PISTON_BLOCK as i64;
    let (dx, dy) = direction.delta();
    let (px, py) = direction.perpendicular();
    let rear_x = origin.0 + dx * (block + extent as i64 - 1);
    let rear_y = origin.1 + dy * (block + extent as i64 - 1);
    for i in 0..block {
        let x = rear_x + px * i;
        let y = rear_y + py * i;
        let _ = grid.set_cell(x, y, Cell::AIR);
        grid.mark_dirty(x, y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_phase_dwells_at_retracted_start() {
        assert_eq!(global_phase(0.0), 0.0);
    }

    #[test]
    fn global_phase_reaches_full_extension_at_midcycle() {
        let t = global_phase(PISTON_CYCLE_S * 0.5);
        assert!((t - 1.0).abs() < 1e-3);
    }

    #[test]
    fn piston_pushes_dirt_column_right() {
        let mut grid = Grid::new(128, 64).unwrap();
        let materials = MaterialTable::standard();
        let mut store = PistonStore::default();
        store.place(&mut grid, &materials, 0, 0, Direction::Right).unwrap();
        for x in 16..26 {
            for y in 0..16 {
                grid.set_cell(x, y, Cell { material_id: ids::DIRT, ..Cell::AIR }).unwrap();
            }
        }
        let mut diagnostics = Diagnostics::default();
        // Drive the piston through one full extension (half the cycle).
        let steps = 120;
        for i in 0..=steps {
            let t = PISTON_CYCLE_S * 0.5 * (i as f32 / steps as f32);
            store.tick(&mut grid, &materials, t, &mut diagnostics);
        }
        let piston = store.pistons.values().next().unwrap();
        assert_eq!(piston.last_fill_extent, PISTON_MAX_TRAVEL);
    }

    #[test]
    fn piston_over_soft_terrain_placed_as_ghost_then_activates() {
        let mut grid = Grid::new(64, 64).unwrap();
        let materials = MaterialTable::standard();
        let mut store = PistonStore::default();
        for yy in 0..16 {
            for xx in 0..16 {
                grid.set_cell(xx, yy, Cell { material_id: ids::DIRT, ..Cell::AIR }).unwrap();
            }
        }
        let result = store.place(&mut grid, &materials, 0, 0, Direction::Right).unwrap();
        assert_eq!(result, PlacementResult::ValidGhost);
        assert_ne!(grid.get_cell(0, 0).unwrap().material_id, ids::PISTON_TILE);
        assert!(store.pistons.values().next().unwrap().is_ghost);

        for yy in 0..16 {
            for xx in 0..16 {
                grid.set_cell(xx, yy, Cell::AIR).unwrap();
            }
        }
        store.activate_ghosts(&mut grid);
        assert!(!store.pistons.values().next().unwrap().is_ghost);
        assert_eq!(grid.get_cell(0, 0).unwrap().material_id, ids::PISTON_TILE);
    }
}
