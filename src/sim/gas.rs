//! Gas behavior: mirror of powder with buoyancy instead of gravity, then a
//! fixed-radius horizontal dispersion.

use super::{can_move_to, try_move};
use crate::chunk::{Grid, RawCells};
use crate::constants::{GAS_DISPERSION_RADIUS, GRAVITY_PER_TICK, MAX_V};
use crate::hash::{mix, parity};
use crate::material::MaterialTable;

pub(crate) fn step(raw: RawCells, grid: &Grid, materials: &MaterialTable, frame: u16, x: i64, y: i64) {
    let mut cell = unsafe { raw.get(x as usize, y as usize) };
    let density = materials.get(cell.material_id).density;

    let vy = ((cell.velocity_y as i16) - GRAVITY_PER_TICK as i16).max(-(MAX_V as i16)) as i8;
    cell.velocity_y = vy;
    unsafe { raw.set(x as usize, y as usize, cell) };

    let rise = (-vy).max(0);
    let mut landed = (x, y);
    let mut collided = false;
    for step in 1..=rise {
        let cand = (x, y - step as i64);
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
    let (first, second) =
        if parity(h) { ((-1i64, -1i64), (1i64, -1i64)) } else { ((1i64, -1i64), (-1i64, -1i64)) };
    for (dx, dy) in [first, second] {
        let cand = (x + dx, y + dy);
        if can_move_to(raw, grid, materials, density, cand.0, cand.1) {
            try_move(raw, grid, materials, frame, (x, y), cand);
            return;
        }
    }

    let primary_dir: i32 = if parity(h) { 1 } else { -1 };
    for dir in [primary_dir, -primary_dir] {
        let mut furthest = (x, y);
        for step in 1..=GAS_DISPERSION_RADIUS {
            let cand = (x + (dir * step) as i64, y);
            if can_move_to(raw, grid, materials, density, cand.0, cand.1) {
                furthest = cand;
            } else {
                break;
            }
        }
        if furthest != (x, y) {
            try_move(raw, grid, materials, frame, (x, y), furthest);
            return;
        }
    }

    let mut stuck = unsafe { raw.get(x as usize, y as usize) };
    stuck.velocity_x = 0;
    stuck.velocity_y = 0;
    unsafe { raw.set(x as usize, y as usize, stuck) };
}
