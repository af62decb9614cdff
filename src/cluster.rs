//! Cluster manager: the "two-worlds" bridge between the external rigid-body
//! engine and the cell grid. Integrates poses through rapier2d, then stamps
//! and clears cluster pixels into the grid with displacement for any loose
//! cell in the way.

use crate::cell::Cell;
use crate::chunk::Grid;
use crate::constants::{
    CLUSTER_DISPLACEMENT_SEARCH_RADIUS, DISPLACEMENT_MOMENTUM_FACTOR, GRAVITY_PER_TICK,
    LOW_VEL_FRAMES_TO_SLEEP, MAX_CLUSTERS, MAX_V, SLEEP_POS_TOL, SLEEP_ROT_TOL_DEG,
    SLEEP_SPEED_THRESHOLD,
};
use crate::error::{Diagnostics, EngineError};
use crate::material::MaterialId;
use ahash::AHashMap;
use nalgebra::Vector2;
use rapier2d::prelude::*;
use std::collections::VecDeque;

pub type ClusterId = u16;

const PHYSICS_SCALE: f32 = 0.1;

/// One cluster pixel, local to the cluster's center of mass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pixel {
    pub local_x: i16,
    pub local_y: i16,
    pub material_id: MaterialId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
}

impl Pose {
    fn within_tolerance(&self, other: &Pose) -> bool {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let pos_ok = (dx * dx + dy * dy).sqrt() <= SLEEP_POS_TOL;
        let rot_tol = SLEEP_ROT_TOL_DEG.to_radians();
        let rot_ok = angle_diff(self.rotation, other.rotation).abs() <= rot_tol;
        pos_ok && rot_ok
    }
}

fn angle_diff(a: f32, b: f32) -> f32 {
    let mut d = a - b;
    while d > std::f32::consts::PI {
        d -= std::f32::consts::TAU;
    }
    while d < -std::f32::consts::PI {
        d += std::f32::consts::TAU;
    }
    d
}

/// A rigid-body-backed group of cells.
pub struct Cluster {
    pub id: ClusterId,
    pub pixels: Vec<Pixel>,
    pub mass: f32,
    pub is_on_belt: bool,
    pub is_on_lift: bool,
    pub is_machine_part: bool,
    pub is_sleeping: bool,
    low_velocity_frames: u32,
    last_synced_pose: Option<Pose>,
    is_pixels_synced: bool,
    handle: RigidBodyHandle,
}

impl Cluster {
    pub fn linear_velocity(&self, bodies: &RigidBodySet) -> (f32, f32) {
        let v = bodies[self.handle].linvel();
        (v.x, v.y)
    }

    /// Overwrites the cluster's horizontal velocity.
    pub fn set_belt_velocity_x(&mut self, bodies: &mut RigidBodySet, vx: f32) {
        let body = &mut bodies[self.handle];
        let v = *body.linvel();
        body.set_linvel(Vector2::new(vx, v.y), true);
        self.is_on_belt = true;
    }

    /// Adds an upward force this step.
    pub fn apply_lift_force(&mut self, bodies: &mut RigidBodySet, force_y: f32) {
        bodies[self.handle].add_force(Vector2::new(0.0, force_y), true);
        self.is_on_lift = true;
    }

    fn pose(&self, bodies: &RigidBodySet) -> Pose {
        let body = &bodies[self.handle];
        let t = body.translation();
        Pose { x: t.x / PHYSICS_SCALE, y: t.y / PHYSICS_SCALE, rotation: body.rotation().angle() }
    }
}

/// Owns the external rigid-body world plus the stamp/clear/displace bridge
/// to the grid.
pub struct ClusterManager {
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: BroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    gravity: Vector2<f32>,
    clusters: AHashMap<ClusterId, Cluster>,
    next_id: ClusterId,
}

impl ClusterManager {
    pub fn new() -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = 1.0 / 60.0;
        Self {
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            // Matches the single `GRAVITY_PER_TICK` constant the lift force
            // formula is scaled against, so `LIFT_MULT > 1.0` reliably
            // exceeds gravity regardless of a cluster's mass.
            gravity: Vector2::new(0.0, GRAVITY_PER_TICK as f32),
            clusters: AHashMap::new(),
            next_id: 1,
        }
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn get(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(&id)
    }

    pub fn cluster_ids(&self) -> Vec<ClusterId> {
        self.clusters.keys().copied().collect()
    }

    /// Current world-space pose of a cluster, for hosts that need to draw
    /// or inspect it between ticks.
    pub fn pose(&self, id: ClusterId) -> Option<Pose> {
        self.clusters.get(&id).map(|c| c.pose(&self.bodies))
    }

    /// Total mass of a cluster's pixels, for force calculations that must
    /// scale with mass (e.g. lift force).
    pub fn mass(&self, id: ClusterId) -> Option<f32> {
        self.clusters.get(&id).map(|c| c.mass)
    }

    /// Current world-space cell coordinates of every pixel in a cluster,
    /// used by structure overlays to test belt/lift occupancy.
    pub fn pixel_world_cells(&self, id: ClusterId, width: usize, height: usize) -> Vec<(i64, i64)> {
        let Some(cluster) = self.clusters.get(&id) else { return Vec::new() };
        let pose = cluster.pose(&self.bodies);
        cluster
            .pixels
            .iter()
            .filter_map(|p| local_to_world_cell(*p, pose, width, height))
            .collect()
    }

    /// Structure force injection: overwrites the
    /// cluster's horizontal velocity and wakes its rigid body.
    pub fn apply_belt_carry(&mut self, id: ClusterId, vx: f32) {
        if let Some(cluster) = self.clusters.get_mut(&id) {
            cluster.set_belt_velocity_x(&mut self.bodies, vx);
            self.bodies[cluster.handle].wake_up(true);
        }
    }

    /// Structure force injection: adds an upward force for one step.
    pub fn apply_lift_force(&mut self, id: ClusterId, force_y: f32) {
        if let Some(cluster) = self.clusters.get_mut(&id) {
            cluster.apply_lift_force(&mut self.bodies, force_y);
            self.bodies[cluster.handle].wake_up(true);
        }
    }

    /// Creates a cluster from a pixel list, initial pose, and initial
    /// world-units/s linear velocity.
    pub fn create_cluster(
        &mut self,
        pixels: Vec<Pixel>,
        densities: impl Fn(MaterialId) -> u8,
        pose: Pose,
        initial_velocity: (f32, f32),
    ) -> Result<ClusterId, EngineError> {
        if self.clusters.len() >= MAX_CLUSTERS {
            return Err(EngineError::ClusterLimitExceeded { limit: MAX_CLUSTERS });
        }
        let mass: f32 = pixels.iter().map(|p| densities(p.material_id) as f32).sum::<f32>().max(1.0);

        let rigid_body = RigidBodyBuilder::dynamic()
            .translation(Vector2::new(pose.x * PHYSICS_SCALE, pose.y * PHYSICS_SCALE))
            .rotation(pose.rotation)
            .linvel(Vector2::new(initial_velocity.0, initial_velocity.1))
            .build();
        let handle = self.bodies.insert(rigid_body);

        let half_extent = ((pixels.len() as f32).sqrt() * 0.5).max(0.5) * PHYSICS_SCALE;
        let collider = ColliderBuilder::cuboid(half_extent, half_extent)
            .density(mass / pixels.len().max(1) as f32)
            .build();
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);

        self.clusters.insert(
            id,
            Cluster {
                id,
                pixels,
                mass,
                is_on_belt: false,
                is_on_lift: false,
                is_machine_part: false,
                is_sleeping: false,
                low_velocity_frames: 0,
                last_synced_pose: None,
                is_pixels_synced: false,
                handle,
            },
        );
        Ok(id)
    }

    pub fn remove_cluster(&mut self, id: ClusterId) {
        if let Some(cluster) = self.clusters.remove(&id) {
            self.bodies.remove(
                cluster.handle,
                &mut self.island_manager,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            );
        }
    }

    /// Runs one tick's worth of cluster/grid bridging. Structure force injection (step 1) happens before this call.
    pub fn step(
        &mut self,
        grid: &mut Grid,
        frame: u16,
        dt: f32,
        diagnostics: &mut Diagnostics,
    ) {
        self.integration_parameters.dt = dt;

        let ids: Vec<ClusterId> = self.clusters.keys().copied().collect();
        for id in &ids {
            self.clear_stamp_if_needed(*id, grid);
        }

        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );

        for id in &ids {
            self.enforce_sleep(*id);
        }
        for id in &ids {
            self.restamp(*id, grid, frame, diagnostics);
        }
    }

    fn clear_stamp_if_needed(&mut self, id: ClusterId, grid: &mut Grid) {
        let Some(cluster) = self.clusters.get(&id) else { return };
        if cluster.is_sleeping && cluster.is_pixels_synced {
            let current = cluster.pose(&self.bodies);
            if let Some(last) = cluster.last_synced_pose {
                if current.within_tolerance(&last) {
                    return;
                }
            }
        }
        let pose = self.clusters[&id].last_synced_pose.unwrap_or_else(|| self.clusters[&id].pose(&self.bodies));
        let pixels = self.clusters[&id].pixels.clone();
        for pixel in &pixels {
            if let Some((x, y)) = local_to_world_cell(*pixel, pose, grid.width, grid.height) {
                if let Some(cell) = grid.get_cell(x, y) {
                    if cell.owner_id == id {
                        let _ = grid.set_cell(x, y, Cell::AIR);
                    }
                }
            }
        }
    }

    fn enforce_sleep(&mut self, id: ClusterId) {
        let speed = {
            let Some(cluster) = self.clusters.get(&id) else { return };
            let (vx, vy) = cluster.linear_velocity(&self.bodies);
            (vx * vx + vy * vy).sqrt()
        };
        let cluster = self.clusters.get_mut(&id).unwrap();
        if speed < SLEEP_SPEED_THRESHOLD && !cluster.is_on_belt {
            cluster.low_velocity_frames += 1;
            if cluster.low_velocity_frames >= LOW_VEL_FRAMES_TO_SLEEP {
                cluster.is_sleeping = true;
                self.bodies[cluster.handle].sleep();
            }
        } else {
            cluster.low_velocity_frames = 0;
            cluster.is_sleeping = false;
        }
    }

    fn restamp(&mut self, id: ClusterId, grid: &mut Grid, frame: u16, diagnostics: &mut Diagnostics) {
        let Some(cluster) = self.clusters.get(&id) else { return };
        if cluster.is_sleeping && cluster.is_pixels_synced {
            if let Some(last) = cluster.last_synced_pose {
                if cluster.pose(&self.bodies).within_tolerance(&last) {
                    return;
                }
            }
        }
        let pose = cluster.pose(&self.bodies);
        let pixels = cluster.pixels.clone();
        let (vx, vy) = cluster.linear_velocity(&self.bodies);

        for pixel in &pixels {
            let Some((x, y)) = local_to_world_cell(*pixel, pose, grid.width, grid.height) else {
                diagnostics.out_of_bounds_stamps += 1;
                continue;
            };
            if let Some(existing) = grid.get_cell(x, y) {
                if !existing.is_air() && existing.is_loose() {
                    displace(grid, x, y, vx, vy, diagnostics);
                }
            }
            let _ = grid.set_cell(
                x,
                y,
                Cell {
                    material_id: pixel.material_id,
                    owner_id: id,
                    frame_updated: frame,
                    ..Cell::AIR
                },
            );
        }

        let cluster = self.clusters.get_mut(&id).unwrap();
        cluster.last_synced_pose = Some(pose);
        cluster.is_pixels_synced = true;
    }
}

impl Default for ClusterManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Rotates + translates a local pixel into grid space, rounding to the
/// nearest cell. Returns `None` if the result falls outside the grid.
fn local_to_world_cell(pixel: Pixel, pose: Pose, width: usize, height: usize) -> Option<(i64, i64)> {
    let (sin, cos) = pose.rotation.sin_cos();
    let lx = pixel.local_x as f32;
    let ly = pixel.local_y as f32;
    let rx = lx * cos - ly * sin;
    let ry = lx * sin + ly * cos;
    let x = (pose.x + rx).round() as i64;
    let y = (pose.y + ry).round() as i64;
    if x >= 0 && y >= 0 && (x as usize) < width && (y as usize) < height {
        Some((x, y))
    } else {
        None
    }
}

/// Bounded BFS displacement of a loose cell to make room for a cluster pixel
///. Priority order biases toward falling.
fn displace(grid: &mut Grid, x: i64, y: i64, cluster_vx: f32, cluster_vy: f32, diagnostics: &mut Diagnostics) {
    const DIRECTIONS: [(i64, i64); 8] =
        [(0, 1), (-1, 1), (1, 1), (-1, 0), (1, 0), (0, -1), (-1, -1), (1, -1)];

    let Some(moving) = grid.get_cell(x, y) else { return };
    if moving.is_air() {
        return;
    }

    let radius = CLUSTER_DISPLACEMENT_SEARCH_RADIUS as i64;
    let mut visited = std::collections::HashSet::new();
    let mut queue = VecDeque::new();
    visited.insert((x, y));
    queue.push_back((x, y));

    while let Some((cx, cy)) = queue.pop_front() {
        for (dx, dy) in DIRECTIONS {
            let (nx, ny) = (cx + dx, cy + dy);
            if !visited.insert((nx, ny)) {
                continue;
            }
            let manhattan = (nx - x).abs() + (ny - y).abs();
            if manhattan > radius {
                continue;
            }
            let Some(target) = grid.get_cell(nx, ny) else { continue };
            if target.is_air() {
                let new_vx = (cluster_vx * DISPLACEMENT_MOMENTUM_FACTOR * 0.5).clamp(-(MAX_V as f32), MAX_V as f32);
                let new_vy = (-cluster_vy * DISPLACEMENT_MOMENTUM_FACTOR * 0.5).clamp(-(MAX_V as f32), MAX_V as f32);
                let mut moved = moving;
                moved.velocity_x = new_vx as i8;
                moved.velocity_y = new_vy as i8;
                let _ = grid.set_cell(nx, ny, moved);
                let _ = grid.set_cell(x, y, Cell::AIR);
                return;
            }
            queue.push_back((nx, ny));
        }
    }

    diagnostics.displacement_losses += 1;
    let _ = grid.set_cell(x, y, Cell::AIR);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::ids;

    #[test]
    fn create_and_remove_cluster_roundtrip() {
        let mut manager = ClusterManager::new();
        let pixels = vec![
            Pixel { local_x: 0, local_y: 0, material_id: ids::STONE },
            Pixel { local_x: 1, local_y: 0, material_id: ids::STONE },
        ];
        let id = manager
            .create_cluster(pixels, |_| 200, Pose { x: 10.0, y: 10.0, rotation: 0.0 }, (0.0, 0.0))
            .unwrap();
        assert_eq!(manager.cluster_count(), 1);
        manager.remove_cluster(id);
        assert_eq!(manager.cluster_count(), 0);
    }

    #[test]
    fn stamp_writes_owner_id_into_grid() {
        let mut grid = Grid::new(64, 64).unwrap();
        let mut manager = ClusterManager::new();
        let pixels = vec![Pixel { local_x: 0, local_y: 0, material_id: ids::STONE }];
        let id = manager
            .create_cluster(pixels, |_| 200, Pose { x: 20.0, y: 20.0, rotation: 0.0 }, (0.0, 0.0))
            .unwrap();
        let mut diagnostics = Diagnostics::default();
        manager.step(&mut grid, 1, 1.0 / 60.0, &mut diagnostics);
        let cell = grid.get_cell(20, 20).unwrap();
        assert_eq!(cell.owner_id, id);
        assert_eq!(cell.material_id, ids::STONE);
    }

    #[test]
    fn displacement_moves_loose_cell_out_of_the_way() {
        let mut grid = Grid::new(64, 64).unwrap();
        grid.set_cell(30, 30, Cell { material_id: ids::SAND, ..Cell::AIR }).unwrap();
        let mut diagnostics = Diagnostics::default();
        displace(&mut grid, 30, 30, 2.0, 10.0, &mut diagnostics);
        assert!(grid.get_cell(30, 30).unwrap().is_air());
        assert_eq!(diagnostics.displacement_losses, 0);
    }
}
