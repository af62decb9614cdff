use sandcore::material::ids;
use sandcore::{MaterialTable, World};
use std::time::Duration;

fn main() {
    tracing_subscriber::fmt::init();

    println!("sandcore demo: sand pile, water pool, and a belt");
    let mut world = World::new(128, 128, MaterialTable::standard()).expect("valid grid dimensions");

    for x in 40..60 {
        world.set_cell(x, 5, ids::SAND).unwrap();
    }
    for x in 30..70 {
        for y in 100..105 {
            world.set_cell(x, y, ids::WATER).unwrap();
        }
    }
    world.place_belt(32, 110, 1, 4).expect("belt placement");

    println!("running 120 ticks at a fixed 1/60s step...");
    for frame in 0..120u32 {
        world.tick(1.0 / 60.0);
        if frame % 60 == 0 {
            let dirty = world.active_dirty_chunks().count();
            println!("frame {frame}: {dirty} chunks active");
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    let diagnostics = world.diagnostics();
    println!(
        "done: {} cells simulated last tick, {} displacement losses, {} piston stalls",
        diagnostics.cells_simulated, diagnostics.displacement_losses, diagnostics.piston_stalls
    );
}
