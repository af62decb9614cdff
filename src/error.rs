//! Error taxonomy for host-facing operations.
//!
//! Every host-facing call returns a `Result` or a `bool`/enum; nothing in
//! this crate panics on bad host input. Internal invariants are instead
//! enforced with `debug_assert!`, which compiles out of release builds.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// A `set_cell`, placement, or cluster-pixel target fell outside the grid.
    #[error("position ({x}, {y}) is out of bounds for a {width}x{height} grid")]
    OutOfBounds { x: i64, y: i64, width: usize, height: usize },

    /// The engine already tracks the maximum number of live clusters.
    #[error("cluster limit of {limit} exceeded")]
    ClusterLimitExceeded { limit: usize },

    /// `World::new` was asked for dimensions that aren't a positive multiple
    /// of `CHUNK_SIZE`.
    #[error("grid dimensions {width}x{height} must be positive multiples of CHUNK_SIZE ({chunk_size})")]
    InvalidGridDimensions { width: usize, height: usize, chunk_size: usize },

    /// A material id used in a host call has no entry in the material table.
    #[error("material id {0} is not registered")]
    UnknownMaterial(u8),
}

/// Result of a structure placement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementResult {
    /// Placed and immediately active: the footprint was clear.
    Valid,
    /// Placed as a ghost: the footprint held traversable terrain.
    ValidGhost,
    /// Rejected: the footprint overlapped another structure or hard material.
    Invalid,
}

/// Counters for conditions the engine treats as recoverable and
/// non-propagating (`DisplacementLost`, `PistonStall`), readable by the
/// host after a tick for diagnostics. Never allocates.
#[derive(Debug, Default, Clone, Copy)]
pub struct Diagnostics {
    /// Cells a stamping cluster displaced with no empty destination found
    /// within [`crate::constants::CLUSTER_DISPLACEMENT_SEARCH_RADIUS`].
    pub displacement_losses: u64,
    /// Pistons that failed to advance this tick because a row was fully blocked.
    pub piston_stalls: u64,
    /// Cluster pixels that mapped outside the grid and were skipped.
    pub out_of_bounds_stamps: u64,
    /// Total `simulate_cell` dispatches this tick (for the no-double-processing property).
    pub cells_simulated: u64,
}

impl Diagnostics {
    pub fn reset(&mut self) {
        *self = Diagnostics::default();
    }
}
