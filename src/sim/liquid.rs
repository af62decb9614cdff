//! Liquid behavior: gravity, diagonal fall, then horizontal spread.

use super::{can_move_to, try_move};
use crate::chunk::{Grid, RawCells};
use crate::constants::{GRAVITY_PER_TICK, MAX_V};
use crate::hash::{mix, parity};
use crate::material::MaterialTable;

pub(crate) fn step(raw: RawCells, grid: &Grid, materials: &MaterialTable, frame: u16, x: i64, y: i64) {
    let mut cell = unsafe { raw.get(x as usize, y as usize) };
    let def = materials.get(cell.material_id);
    let density = def.density;
    let was_free_falling = cell.velocity_y > 2;

    let vy = ((cell.velocity_y as i16) + GRAVITY_PER_TICK as i16).min(MAX_V as i16) as i8;
    cell.velocity_y = vy;
    unsafe { raw.set(x as usize, y as usize, cell) };

    let mut landed = (x, y);
    let mut collided = false;
    for step in 1..=vy.max(0) {
        let cand = (x, y + step as i64);
        if can_move_to(raw, grid, materials, density, cand.0, cand.1) {
            landed = cand;
        } else {
            collided = true;
            break;
        }
    }
    if landed != (x, y) {
        try_move(raw, grid, materials, frame, (x, y), landed);
        if collided {
            let mut settled = unsafe { raw.get(landed.0 as usize, landed.1 as usize) };
            settled.velocity_y = 0;
            unsafe { raw.set(landed.0 as usize, landed.1 as usize, settled) };
        }
        return;
    }

    let h = mix(x, y, frame);
    let (diag_first, diag_second) =
        if parity(h) { ((-1i64, 1i64), (1i64, 1i64)) } else { ((1i64, 1i64), (-1i64, 1i64)) };
    for (dx, dy) in [diag_first, diag_second] {
        let cand = (x + dx, y + dy);
        if can_move_to(raw, grid, materials, density, cand.0, cand.1) {
            try_move(raw, grid, materials, frame, (x, y), cand);
            return;
        }
    }

    // Horizontal spread: dispersion budget plus a free-fall bonus and a
    // small per-cell jitter, clamped to at least one cell.
    let free_fall_bonus = if was_free_falling { vy.unsigned_abs() as i32 / 3 } else { 0 };
    let jitter = (h % 3) as i32 - 1;
    let spread = (def.dispersion_rate as i32 + free_fall_bonus + jitter).max(1);

    let mut vx = cell.velocity_x as i32;
    if was_free_falling && vx == 0 {
        vx = if parity(h) { 4 } else { -4 };
    }
    let primary_dir: i32 = if vx > 0 {
        1
    } else if vx < 0 {
        -1
    } else if parity(h) {
        1
    } else {
        -1
    };
    let secondary_dir = -primary_dir;

    let reach = |dir: i32| -> (i64, i64) {
        let mut best = (x, y);
        for step in 1..=spread {
            let cand = (x + (dir * step) as i64, y);
            if can_move_to(raw, grid, materials, density, cand.0, cand.1) {
                best = cand;
            } else {
                break;
            }
        }
        best
    };

    let primary_dest = reach(primary_dir);
    let secondary_dest = reach(secondary_dir);
    let primary_dist = (primary_dest.0 - x).abs();
    let secondary_dist = (secondary_dest.0 - x).abs();

    if primary_dist == 0 && secondary_dist == 0 {
        let mut stuck = unsafe { raw.get(x as usize, y as usize) };
        stuck.velocity_x /= 2;
        stuck.velocity_y = 0;
        unsafe { raw.set(x as usize, y as usize, stuck) };
        return;
    }

    let (dest, new_vx) = if primary_dist >= secondary_dist {
        (primary_dest, (vx * 7 / 8).clamp(-(MAX_V as i32), MAX_V as i32))
    } else {
        (secondary_dest, (-vx * 7 / 8).clamp(-(MAX_V as i32), MAX_V as i32))
    };

    try_move(raw, grid, materials, frame, (x, y), dest);
    let mut settled = unsafe { raw.get(dest.0 as usize, dest.1 as usize) };
    settled.velocity_x = new_vx as i8;
    settled.velocity_y = 0;
    unsafe { raw.set(dest.0 as usize, dest.1 as usize, settled) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::error::Diagnostics;
    use crate::material::ids;

    #[test]
    fn water_spreads_across_a_floor() {
        let mut grid = Grid::new(128, 64).unwrap();
        for x in 0..128 {
            grid.set_cell(x, 20, Cell { material_id: ids::STONE, ..Cell::AIR }).unwrap();
        }
        for x in 60..70 {
            grid.set_cell(x, 19, Cell { material_id: ids::WATER, ..Cell::AIR }).unwrap();
        }
        let materials = MaterialTable::standard();
        let mut diagnostics = Diagnostics::default();
        for frame in 0..60u16 {
            crate::sim::simulate_tick(&mut grid, &materials, frame, &mut diagnostics);
        }
        let spread_width = (0..128)
            .filter(|&x| grid.get_cell(x, 19).unwrap().material_id == ids::WATER)
            .count();
        assert!(spread_width >= 10);
    }
}
