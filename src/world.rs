//! Top-level orchestrator: owns the grid, material table, cluster manager,
//! and structure overlays, and drives the fixed-step tick sequence.

use crate::cell::Cell;
use crate::chunk::Grid;
use crate::cluster::{Cluster, ClusterId, ClusterManager, Pixel, Pose};
use crate::collider::{self, ColliderCommand};
use crate::error::{Diagnostics, EngineError, PlacementResult};
use crate::material::{MaterialId, MaterialTable};
use crate::sim;
use crate::structures::piston::Direction as PistonDirection;
use crate::structures::StructureSet;
use tracing::{debug, warn};

/// The simulated world. One `World` per independent simulation instance;
/// the host owns it and calls [`World::tick`] once per fixed step.
pub struct World {
    grid: Grid,
    materials: MaterialTable,
    clusters: ClusterManager,
    structures: StructureSet,
    frame: u16,
    elapsed_s: f32,
    diagnostics: Diagnostics,
}

impl World {
    /// Validates `width`/`height` against [`crate::constants::CHUNK_SIZE`]
    /// and allocates a fully-`Air` grid.
    pub fn new(width: usize, height: usize, materials: MaterialTable) -> Result<Self, EngineError> {
        let grid = Grid::new(width, height)?;
        Ok(Self {
            grid,
            materials,
            clusters: ClusterManager::new(),
            structures: StructureSet::new(),
            frame: 0,
            elapsed_s: 0.0,
            diagnostics: Diagnostics::default(),
        })
    }

    pub fn width(&self) -> usize {
        self.grid.width
    }

    pub fn height(&self) -> usize {
        self.grid.height
    }

    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn get_cell(&self, x: i64, y: i64) -> Option<Cell> {
        self.grid.get_cell(x, y)
    }

    /// Host write path. Only meaningful between ticks: the cell simulator
    /// assumes nothing but itself and the cluster manager mutate loose
    /// cells during a tick.
    pub fn set_cell(&mut self, x: i64, y: i64, material_id: MaterialId) -> Result<(), EngineError> {
        self.materials.try_get(material_id)?;
        self.grid.set_cell(x, y, Cell { material_id, ..Cell::AIR })
    }

    pub fn mark_chunk_dirty_at(&self, x: i64, y: i64) {
        self.grid.mark_chunk_dirty_at(x, y);
    }

    pub fn active_dirty_chunks(&self) -> impl Iterator<Item = usize> + '_ {
        self.grid.active_dirty_chunks()
    }

    pub fn publish_colliders(&self) -> Vec<ColliderCommand> {
        collider::publish(&self.grid, &self.materials)
    }

    pub fn create_cluster(
        &mut self,
        pixels: Vec<Pixel>,
        pose: Pose,
        initial_velocity: (f32, f32),
    ) -> Result<ClusterId, EngineError> {
        let materials = &self.materials;
        self.clusters.create_cluster(pixels, |id| materials.get(id).density, pose, initial_velocity)
    }

    pub fn remove_cluster(&mut self, id: ClusterId) {
        self.clusters.remove_cluster(id);
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(id)
    }

    pub fn cluster_pose(&self, id: ClusterId) -> Option<Pose> {
        self.clusters.pose(id)
    }

    pub fn place_belt(&mut self, x: i64, y: i64, direction: i8, speed: u16) -> Result<PlacementResult, EngineError> {
        self.structures.belts.place(&mut self.grid, &self.materials, x, y, direction, speed)
    }

    pub fn remove_belt(&mut self, x: i64, y: i64) -> bool {
        self.structures.belts.remove(&mut self.grid, x, y)
    }

    pub fn place_lift(&mut self, x: i64, y: i64, lift_force: f32) -> Result<PlacementResult, EngineError> {
        self.structures.lifts.place(&mut self.grid, &self.materials, x, y, lift_force)
    }

    pub fn remove_lift(&mut self, x: i64, y: i64) -> bool {
        self.structures.lifts.remove(&mut self.grid, x, y)
    }

    pub fn place_wall(&mut self, x: i64, y: i64) -> Result<PlacementResult, EngineError> {
        self.structures.walls.place(&mut self.grid, &self.materials, x, y)
    }

    pub fn remove_wall(&mut self, x: i64, y: i64) -> bool {
        self.structures.walls.remove(&mut self.grid, x, y)
    }

    pub fn place_piston(
        &mut self,
        x: i64,
        y: i64,
        direction: PistonDirection,
    ) -> Result<PlacementResult, EngineError> {
        self.structures.pistons.place(&mut self.grid, &self.materials, x, y, direction)
    }

    pub fn remove_piston(&mut self, x: i64, y: i64) -> bool {
        self.structures.pistons.remove(&mut self.grid, x, y)
    }

    /// Runs one fixed-step tick: structure force injection, rigid-body step,
    /// cluster stamp, the four-group cell simulation pass, belt cell move,
    /// ghost activation, and dirty-state decay. Order is load-bearing; do
    /// not reshuffle these phases.
    pub fn tick(&mut self, dt: f32) {
        let _span = tracing::debug_span!("tick", frame = self.frame).entered();
        self.elapsed_s += dt;
        self.diagnostics.reset();

        self.structures.belts.inject_cluster_forces(&mut self.clusters, self.grid.width, self.grid.height);
        self.structures.lifts.inject_cluster_forces(&mut self.clusters, self.grid.width, self.grid.height);

        self.clusters.step(&mut self.grid, self.frame, dt, &mut self.diagnostics);

        sim::simulate_tick(&mut self.grid, &self.materials, self.frame, &mut self.diagnostics);

        self.structures.belts.move_cells(&mut self.grid, &self.materials, self.frame);

        self.structures.pistons.tick(&mut self.grid, &self.materials, self.elapsed_s, &mut self.diagnostics);

        self.structures.activate_ghosts(&mut self.grid);

        self.grid.decay_all();

        if self.diagnostics.displacement_losses > 0 {
            warn!(losses = self.diagnostics.displacement_losses, "cluster displaced cells with no destination");
        }
        if self.diagnostics.piston_stalls > 0 {
            debug!(stalls = self.diagnostics.piston_stalls, "piston rows blocked this tick");
        }

        self.frame = self.frame.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::ids;

    #[test]
    fn new_rejects_dimensions_not_a_multiple_of_chunk_size() {
        let materials = MaterialTable::standard();
        assert!(World::new(100, 100, materials.clone()).is_err());
        assert!(World::new(64, 64, materials).is_ok());
    }

    #[test]
    fn tick_advances_a_sand_grain() {
        let mut world = World::new(64, 64, MaterialTable::standard()).unwrap();
        world.set_cell(10, 10, ids::SAND).unwrap();
        for _ in 0..20 {
            world.tick(1.0 / 60.0);
        }
        assert!(world.get_cell(10, 10).unwrap().is_air());
    }

    #[test]
    fn belt_round_trip_through_world() {
        let mut world = World::new(64, 64, MaterialTable::standard()).unwrap();
        let result = world.place_belt(0, 40, 1, 4).unwrap();
        assert_eq!(result, PlacementResult::Valid);
        assert!(world.remove_belt(0, 40));
    }
}
