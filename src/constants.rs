//! Tunables shared by every subsystem, per the engine's configuration surface.

/// Cells per chunk edge. Chunks are always square.
pub const CHUNK_SIZE: usize = 32;

/// Cells a worker may read/write past its chunk's core region.
/// Sized to the per-tick velocity cap so two chunks in the same
/// checkerboard group never touch overlapping memory.
pub const HALO: usize = 16;

/// Per-axis velocity clamp, in cells/tick.
pub const MAX_V: i8 = 16;

/// Gravity accumulated into vertical velocity per tick.
pub const GRAVITY_PER_TICK: i8 = 1;

/// Belt/lift overlay block size, in cells.
pub const BELT_BLOCK: usize = 8;
pub const LIFT_BLOCK: usize = 8;
pub const WALL_BLOCK: usize = 8;

/// Piston overlay footprint, in cells.
pub const PISTON_BLOCK: usize = 16;

/// Full extend-dwell-retract-dwell piston cycle length, in seconds.
pub const PISTON_CYCLE_S: f32 = 3.0;
/// Fraction of the cycle spent dwelling at each stroke extreme.
pub const PISTON_DWELL: f32 = 0.15;
/// Maximum plate travel, in cells, over one stroke.
pub const PISTON_MAX_TRAVEL: i32 = 12;
/// How far a piston will search for an `Air` cell before stalling a row.
pub const PISTON_PUSH_SEARCH: i32 = 64;

/// Belt surface speed, world-units/s, applied to cluster carry velocity.
pub const BELT_CARRY_SPEED: f32 = 30.0;

/// Upward force multiplier applied to clusters inside a lift column
/// (relative to gravity, so > 1.0 means clusters rise).
pub const LIFT_MULT: f32 = 1.2;

/// Search radius, in cells (Manhattan), for the cluster-displacement BFS.
pub const CLUSTER_DISPLACEMENT_SEARCH_RADIUS: i32 = 16;

/// Sleep-skip pose tolerances.
pub const SLEEP_POS_TOL: f32 = 0.01;
pub const SLEEP_ROT_TOL_DEG: f32 = 0.1;

/// Consecutive low-velocity frames before a cluster is force-slept.
pub const LOW_VEL_FRAMES_TO_SLEEP: u32 = 30;

/// Linear speed below which a cluster counts as "low velocity" for sleep bookkeeping.
pub const SLEEP_SPEED_THRESHOLD: f32 = 3.0;

/// Fraction of cluster velocity transferred to a cell it displaces.
pub const DISPLACEMENT_MOMENTUM_FACTOR: f32 = 0.5;

/// Fixed horizontal spread radius for gas dispersion.
pub const GAS_DISPERSION_RADIUS: i32 = 3;

/// Live-cluster ceiling (u16 id space minus the reserved 0 = loose sentinel
/// and u16::MAX as a spare).
pub const MAX_CLUSTERS: usize = 65534;
