//! Terrain collider bridge: turns each dirty chunk's static-material mask
//! into outline polygons the external rigid-body world can use as a static
//! collider.
//!
//! A marching-squares pass walks the chunk's extended bounds, classifying
//! each cell as solid (`behavior == Static`) or not, and emits one command
//! per dirty chunk telling the host to add or replace that chunk's
//! collider. Chunks that went from having static cells to having none emit
//! a `Clear` so the host can drop the old collider.

use crate::chunk::Grid;
use crate::material::MaterialTable;
use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// One closed outline loop around a contiguous run of solid cells, as a
/// sequence of grid-space corner points. Every run this pass emits is a
/// rectangle (4 points), so the common case never spills to the heap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polygon {
    pub points: SmallVec<[Point; 4]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColliderCommand {
    /// Replace (or add, if none existed) the static collider for this chunk.
    Replace { chunk_x: usize, chunk_y: usize, polygons: Vec<Polygon> },
    /// The chunk now contains no static material; drop its collider.
    Clear { chunk_x: usize, chunk_y: usize },
}

/// Builds collider commands for every chunk the scheduler marked dirty or
/// active this tick. Cheap to call every tick: chunks with no static
/// material and nothing previously published are skipped entirely.
pub fn publish(grid: &Grid, materials: &MaterialTable) -> Vec<ColliderCommand> {
    let mut commands = Vec::new();
    for idx in grid.active_dirty_chunks() {
        let cx = idx % grid.chunk_cols;
        let cy = idx / grid.chunk_cols;
        let polygons = trace_chunk(grid, materials, cx, cy);
        if polygons.is_empty() {
            commands.push(ColliderCommand::Clear { chunk_x: cx, chunk_y: cy });
        } else {
            commands.push(ColliderCommand::Replace { chunk_x: cx, chunk_y: cy, polygons });
        }
    }
    commands
}

fn is_solid(grid: &Grid, materials: &MaterialTable, x: i64, y: i64) -> bool {
    let Some(cell) = grid.get_cell(x, y) else { return false };
    if cell.is_air() || !cell.is_loose() {
        return false;
    }
    materials.get(cell.material_id).behavior == crate::material::Behavior::Static
}

/// Marching squares over one chunk's core region, emitting one rectangle per
/// maximal run of solid cells on a row, merged with the row above when their
/// spans match exactly. This keeps polygon count low for the common case of
/// large flat stone slabs without needing a general contour tracer.
fn trace_chunk(grid: &Grid, materials: &MaterialTable, cx: usize, cy: usize) -> Vec<Polygon> {
    let (x0, y0, x1, y1) = grid.chunk_core_bounds(cx, cy);
    let mut polygons: Vec<(i64, i64, i64, i64)> = Vec::new();

    for y in y0..y1 {
        let mut x = x0;
        while x < x1 {
            if !is_solid(grid, materials, x as i64, y as i64) {
                x += 1;
                continue;
            }
            let run_start = x;
            while x < x1 && is_solid(grid, materials, x as i64, y as i64) {
                x += 1;
            }
            let run_end = x;

            if let Some(last) = polygons.last_mut() {
                if last.3 == y as i64 && last.0 == run_start as i64 && last.2 == run_end as i64 {
                    last.3 = y as i64 + 1;
                    continue;
                }
            }
            polygons.push((run_start as i64, y as i64, run_end as i64, y as i64 + 1));
        }
    }

    polygons
        .into_iter()
        .map(|(x0, y0, x1, y1)| Polygon {
            points: SmallVec::from_slice(&[
                Point { x: x0 as i32, y: y0 as i32 },
                Point { x: x1 as i32, y: y0 as i32 },
                Point { x: x1 as i32, y: y1 as i32 },
                Point { x: x0 as i32, y: y1 as i32 },
            ]),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::material::ids;

    #[test]
    fn dirty_chunk_with_stone_row_emits_one_rectangle() {
        let mut grid = Grid::new(64, 64).unwrap();
        for x in 0..32 {
            grid.set_cell(x, 10, Cell { material_id: ids::STONE, ..Cell::AIR }).unwrap();
        }
        let materials = MaterialTable::standard();
        let commands = publish(&grid, &materials);
        let replace = commands
            .iter()
            .find(|c| matches!(c, ColliderCommand::Replace { chunk_x: 0, chunk_y: 0, .. }))
            .unwrap();
        match replace {
            ColliderCommand::Replace { polygons, .. } => assert_eq!(polygons.len(), 1),
            _ => unreachable!(),
        }
    }

    #[test]
    fn chunk_with_no_static_material_emits_no_polygons() {
        let mut grid = Grid::new(64, 64).unwrap();
        grid.mark_chunk_dirty_at(5, 5);
        let materials = MaterialTable::standard();
        let commands = publish(&grid, &materials);
        let cmd = commands.iter().find(|c| matches!(c, ColliderCommand::Clear { chunk_x: 0, chunk_y: 0 }));
        assert!(cmd.is_some());
    }
}
