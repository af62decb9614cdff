//! The atomic unit of simulation: exactly 10 bytes, packed.

use crate::material::{MaterialId, AIR};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CellFlags: u8 {
        /// Set while a cell sits on a belt surface row; consumed by the
        /// belt cell-move job. All other bits are reserved.
        const ON_BELT = 1 << 0;
    }
}

/// One grid slot. Field order is chosen so the struct is naturally 10
/// bytes at alignment 2 without `#[repr(packed)]`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub material_id: MaterialId,
    pub flags: CellFlags,
    /// Last tick this cell was simulated; guards against double-processing
    /// within a tick. Wraps monotonically — comparisons only ever check
    /// equality against the current frame, never ordering.
    pub frame_updated: u16,
    pub velocity_x: i8,
    pub velocity_y: i8,
    /// Reserved: wired through but not read by the current sim.
    pub temperature: u8,
    /// Which structure type class claims this cell, independent of `material_id`.
    pub structure_id: u8,
    /// `0` = loose; otherwise the cluster id that owns this cell.
    pub owner_id: u16,
}

const _: () = assert!(std::mem::size_of::<Cell>() == 10);

impl Cell {
    pub const AIR: Cell = Cell {
        material_id: AIR,
        flags: CellFlags::empty(),
        frame_updated: 0,
        velocity_x: 0,
        velocity_y: 0,
        temperature: 0,
        structure_id: 0,
        owner_id: 0,
    };

    #[inline]
    pub fn is_air(&self) -> bool {
        self.material_id == AIR
    }

    #[inline]
    pub fn is_loose(&self) -> bool {
        self.owner_id == 0
    }

    #[inline]
    pub fn clamp_velocity(&mut self, max_v: i8) {
        self.velocity_x = self.velocity_x.clamp(-max_v, max_v);
        self.velocity_y = self.velocity_y.clamp(-max_v, max_v);
    }
}

impl Default for Cell {
    fn default() -> Self {
        Cell::AIR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_is_ten_bytes() {
        assert_eq!(std::mem::size_of::<Cell>(), 10);
    }

    #[test]
    fn air_default_is_loose_and_zero_velocity() {
        let air = Cell::AIR;
        assert!(air.is_air());
        assert!(air.is_loose());
        assert_eq!(air.velocity_x, 0);
        assert_eq!(air.velocity_y, 0);
    }
}
