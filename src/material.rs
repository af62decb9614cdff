//! Immutable material registry, indexed by 8-bit id.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Index into the host-supplied [`MaterialTable`]. `0` is always `Air`.
pub type MaterialId = u8;

/// Cell `material_id` reserved for the always-present empty state.
pub const AIR: MaterialId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Behavior {
    Static,
    Powder,
    Liquid,
    Gas,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MaterialFlags: u8 {
        /// Cell simulator treats this material as low-density enough to rise
        /// through most things; used by lift tiles and gas-like behaviors.
        const LOW_DENSITY_RISER = 1 << 0;
        /// Reserved id used to render a belt overlay tile; not simulated as
        /// a loose cell even though it has a material entry.
        const STRUCTURE_TILE = 1 << 1;
    }
}

/// One entry of the material table. Immutable after [`MaterialTable`] is built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialDef {
    pub density: u8,
    pub behavior: Behavior,
    /// Liquids only: horizontal spread budget before velocity/parity adjustments.
    pub dispersion_rate: u8,
    pub flags: MaterialFlags,
    /// Optional phase-change target id. Wired for future add-ons; the core
    /// sim never reads it.
    pub phase_change_target: Option<MaterialId>,
}

impl MaterialDef {
    pub const fn new(density: u8, behavior: Behavior) -> Self {
        Self {
            density,
            behavior,
            dispersion_rate: 0,
            flags: MaterialFlags::empty(),
            phase_change_target: None,
        }
    }

    pub const fn with_dispersion(mut self, rate: u8) -> Self {
        self.dispersion_rate = rate;
        self
    }

    pub const fn with_flags(mut self, flags: MaterialFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Host-supplied, read-only after construction. Laid out as a dense `Vec`
/// indexed directly by [`MaterialId`] so the hot per-cell path never hashes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialTable {
    defs: Vec<MaterialDef>,
}

impl MaterialTable {
    pub fn get(&self, id: MaterialId) -> MaterialDef {
        self.defs[id as usize]
    }

    pub fn try_get(&self, id: MaterialId) -> Result<MaterialDef, EngineError> {
        self.defs
            .get(id as usize)
            .copied()
            .ok_or(EngineError::UnknownMaterial(id))
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// A minimal registry covering the core behaviors plus the reserved
    /// structure-tile ids, handy for tests and host bring-up.
    pub fn standard() -> Self {
        MaterialTableBuilder::new()
            .with(AIR, MaterialDef::new(0, Behavior::Static))
            .with(ids::STONE, MaterialDef::new(200, Behavior::Static))
            .with(ids::DIRT, MaterialDef::new(150, Behavior::Static))
            .with(ids::SAND, MaterialDef::new(100, Behavior::Powder))
            .with(
                ids::WATER,
                MaterialDef::new(50, Behavior::Liquid).with_dispersion(5),
            )
            .with(
                ids::SMOKE,
                MaterialDef::new(1, Behavior::Gas).with_flags(MaterialFlags::LOW_DENSITY_RISER),
            )
            .with(
                ids::BELT_TILE,
                MaterialDef::new(255, Behavior::Static).with_flags(MaterialFlags::STRUCTURE_TILE),
            )
            .with(
                ids::LIFT_TILE,
                MaterialDef::new(1, Behavior::Static)
                    .with_flags(MaterialFlags::STRUCTURE_TILE | MaterialFlags::LOW_DENSITY_RISER),
            )
            .with(
                ids::WALL_TILE,
                MaterialDef::new(255, Behavior::Static).with_flags(MaterialFlags::STRUCTURE_TILE),
            )
            .with(
                ids::PISTON_TILE,
                MaterialDef::new(255, Behavior::Static).with_flags(MaterialFlags::STRUCTURE_TILE),
            )
            .build()
            .expect("standard table always fits in u8 ids")
    }
}

/// A handful of ids the `standard()` registry reserves; hosts building
/// their own table are free to place these materials at different ids.
pub mod ids {
    use super::MaterialId;
    pub const STONE: MaterialId = 1;
    pub const DIRT: MaterialId = 2;
    pub const SAND: MaterialId = 3;
    pub const WATER: MaterialId = 4;
    pub const SMOKE: MaterialId = 5;
    pub const BELT_TILE: MaterialId = 250;
    pub const LIFT_TILE: MaterialId = 251;
    pub const WALL_TILE: MaterialId = 252;
    pub const PISTON_TILE: MaterialId = 253;
}

pub struct MaterialTableBuilder {
    defs: Vec<Option<MaterialDef>>,
}

impl MaterialTableBuilder {
    pub fn new() -> Self {
        let mut defs = vec![None; 256];
        defs[AIR as usize] = Some(MaterialDef::new(0, Behavior::Static));
        Self { defs }
    }

    pub fn with(mut self, id: MaterialId, def: MaterialDef) -> Self {
        self.defs[id as usize] = Some(def);
        self
    }

    /// Builds the table, filling any id the host never registered with an
    /// inert `Air`-like static slot so `get()` stays a plain index.
    pub fn build(self) -> Result<MaterialTable, EngineError> {
        let fallback = MaterialDef::new(0, Behavior::Static);
        let defs = self.defs.into_iter().map(|d| d.unwrap_or(fallback)).collect();
        Ok(MaterialTable { defs })
    }
}

impl Default for MaterialTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_has_air_static_and_zero_density() {
        let table = MaterialTable::standard();
        let air = table.get(AIR);
        assert_eq!(air.behavior, Behavior::Static);
        assert_eq!(air.density, 0);
    }

    #[test]
    fn density_orders_sand_above_water() {
        let table = MaterialTable::standard();
        assert!(table.get(ids::SAND).density > table.get(ids::WATER).density);
    }

    #[test]
    fn unregistered_id_falls_back_to_inert_static() {
        let table = MaterialTableBuilder::new().build().unwrap();
        let fallback = table.get(200);
        assert_eq!(fallback.behavior, Behavior::Static);
        assert_eq!(fallback.density, 0);
    }
}
