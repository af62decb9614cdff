//! Powder behavior: gravity with diagonal fallback.

use super::{can_move_to, try_move};
use crate::chunk::{Grid, RawCells};
use crate::constants::{GRAVITY_PER_TICK, MAX_V};
use crate::hash::{mix, parity};
use crate::material::MaterialTable;

pub(crate) fn step(raw: RawCells, grid: &Grid, materials: &MaterialTable, frame: u16, x: i64, y: i64) {
    let mut cell = unsafe { raw.get(x as usize, y as usize) };
    let density = materials.get(cell.material_id).density;

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

    // Blocked straight down: try the diagonals, order randomized per cell/frame.
    let h = mix(x, y, frame);
    let (first, second) = if parity(h) { ((-1i64, 1i64), (1i64, 1i64)) } else { ((1i64, 1i64), (-1i64, 1i64)) };
    for (dx, dy) in [first, second] {
        let cand = (x + dx, y + dy);
        if can_move_to(raw, grid, materials, density, cand.0, cand.1) {
            try_move(raw, grid, materials, frame, (x, y), cand);
            return;
        }
    }

    let mut stuck = unsafe { raw.get(x as usize, y as usize) };
    stuck.velocity_x = 0;
    stuck.velocity_y = 0;
    unsafe { raw.set(x as usize, y as usize, stuck) };
}
