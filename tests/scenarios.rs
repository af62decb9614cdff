//! Integration tests built against the public `World` API, one per
//! concrete scenario: a sand grain falling, a water column spreading onto a
//! floor, a belt carrying a sand pile, a rigid cluster displacing sand, a
//! lift carrying a cluster upward, and a piston pushing a dirt column.

use sandcore::material::ids;
use sandcore::structures::piston::Direction;
use sandcore::{MaterialTable, Pixel, Pose, World};

fn standard_world(width: usize, height: usize) -> World {
    World::new(width, height, MaterialTable::standard()).unwrap()
}

#[test]
fn single_sand_grain_falls() {
    let mut world = standard_world(128, 128);
    world.set_cell(50, 10, ids::SAND).unwrap();

    for _ in 0..40 {
        world.tick(1.0 / 60.0);
    }

    assert!(world.get_cell(50, 10).unwrap().is_air());
    let landed = (11..128).find(|&y| world.get_cell(50, y).unwrap().material_id == ids::SAND);
    assert!(landed.is_some(), "sand grain should have come to rest somewhere below its start");
}

#[test]
fn water_column_spreads_onto_a_floor() {
    let mut world = standard_world(224, 64);
    for x in 0..224 {
        world.set_cell(x, 49, ids::STONE).unwrap();
    }
    for y in 0..10 {
        world.set_cell(100, y, ids::WATER).unwrap();
    }

    for _ in 0..150 {
        world.tick(1.0 / 60.0);
    }

    for y in 0..40 {
        for x in 0..224 {
            assert_ne!(
                world.get_cell(x, y).unwrap().material_id,
                ids::WATER,
                "no water should remain above y=40 after the column has had time to fall and spread"
            );
        }
    }

    let spread = (0..224).filter(|&x| world.get_cell(x, 48).unwrap().material_id == ids::WATER).count();
    assert!(spread >= 5, "expected the water to spread across several columns on the floor, got {spread}");
}

#[test]
fn belt_transports_a_sand_pile() {
    let mut world = standard_world(128, 64);
    // Three 8-wide blocks merge into one 24-cell run along row 48.
    world.place_belt(32, 48, 1, 4).unwrap();
    world.place_belt(40, 48, 1, 4).unwrap();
    world.place_belt(48, 48, 1, 4).unwrap();

    for x in 36..40 {
        for y in 40..45 {
            world.set_cell(x, y, ids::SAND).unwrap();
        }
    }

    // Let the pile fall and settle onto the belt's cargo row before the
    // belt has had much chance to move anything off-schedule.
    for _ in 0..40 {
        world.tick(1.0 / 60.0);
    }
    // Drive the belt long enough to carry the pile across the run and past
    // its right edge (x=56).
    for _ in 0..800 {
        world.tick(1.0 / 60.0);
    }

    let carried = (56..128)
        .flat_map(|x| (0..64).map(move |y| (x, y)))
        .filter(|&(x, y)| world.get_cell(x, y).unwrap().material_id == ids::SAND)
        .count();
    assert!(carried >= 15, "expected at least 15 sand cells past x=56, got {carried}");
}

#[test]
fn rigid_cluster_displaces_sand_without_losing_it() {
    let mut world = standard_world(128, 128);
    for x in 0..128 {
        for y in 40..44 {
            world.set_cell(x, y, ids::SAND).unwrap();
        }
    }
    let initial_sand = count_material(&world, ids::SAND);

    let pixels: Vec<Pixel> = (-4..6)
        .flat_map(|lx| (-4..6).map(move |ly| (lx, ly)))
        .map(|(lx, ly)| Pixel { local_x: lx, local_y: ly, material_id: ids::STONE })
        .collect();
    world
        .create_cluster(pixels, Pose { x: 50.0, y: 20.0, rotation: 0.0 }, (2.0, 10.0))
        .unwrap();

    let mut total_losses: u64 = 0;
    for _ in 0..300 {
        world.tick(1.0 / 60.0);
        total_losses += world.diagnostics().displacement_losses;
    }

    let final_sand = count_material(&world, ids::SAND);
    assert_eq!(
        initial_sand,
        final_sand + total_losses as usize,
        "every displaced sand cell must either still be Sand somewhere or be counted as a loss"
    );
}

#[test]
fn lift_carries_a_cluster_upward() {
    let mut world = standard_world(128, 128);
    let col_x = 64;
    for i in 0..8 {
        world.place_lift(col_x, i * 8, 50_000.0).unwrap();
    }

    let pixels: Vec<Pixel> = (-2..2)
        .flat_map(|lx| (-2..2).map(move |ly| (lx, ly)))
        .map(|(lx, ly)| Pixel { local_x: lx, local_y: ly, material_id: ids::STONE })
        .collect();
    let id = world
        .create_cluster(pixels, Pose { x: col_x as f32, y: 60.0, rotation: 0.0 }, (0.0, 0.0))
        .unwrap();

    let start_y = world.cluster_pose(id).unwrap().y;
    for _ in 0..120 {
        world.tick(1.0 / 60.0);
    }
    let end_y = world.cluster_pose(id).unwrap().y;

    assert!(
        start_y - end_y >= 5.0,
        "expected the lift to raise the cluster by several cells, started at {start_y}, ended at {end_y}"
    );
}

#[test]
fn piston_pushes_a_dirt_column_right() {
    let mut world = standard_world(128, 64);
    world.place_piston(0, 0, Direction::Right).unwrap();
    for x in 16..26 {
        for y in 0..16 {
            world.set_cell(x, y, ids::DIRT).unwrap();
        }
    }

    // Drive into the full-extension dwell window (t in [1.5s, 1.95s) of the
    // 3s cycle) and stop there, before retraction begins.
    for _ in 0..100 {
        world.tick(1.0 / 60.0);
    }

    let shifted = (0..16)
        .filter(|&y| {
            let original_leading_edge_now_air = world.get_cell(16, y).unwrap().is_air();
            let new_span_has_dirt =
                (28..38).any(|x| world.get_cell(x, y).unwrap().material_id == ids::DIRT);
            original_leading_edge_now_air && new_span_has_dirt
        })
        .count();
    assert!(shifted >= 10, "expected the dirt strip to have shifted right across all 16 rows, got {shifted}");
}

fn count_material(world: &World, material_id: sandcore::material::MaterialId) -> usize {
    let mut count = 0;
    for x in 0..world.width() as i64 {
        for y in 0..world.height() as i64 {
            if world.get_cell(x, y).unwrap().material_id == material_id {
                count += 1;
            }
        }
    }
    count
}
