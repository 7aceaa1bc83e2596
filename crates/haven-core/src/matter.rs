//! Resource kinds and their fixed conversion constants.
//!
//! [`Matter`] is a closed enumeration: every transportable gas, liquid, or
//! solid the colony handles, each with an immutable process-wide
//! [`MatterSpec`] lookup. [`EnergyKind`] covers the two energy buffers
//! (electrical charge, thermal mass). [`ResourceKind`] unifies both for
//! edge typing, and maps each kind to its [`NetworkFamily`] — power grids
//! and matter pipelines are independent network families.

use crate::fixed::Fixed64;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Matter
// ---------------------------------------------------------------------------

/// A transportable gas, liquid, or solid resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Matter {
    Oxygen,
    Nitrogen,
    CarbonDioxide,
    Water,
    Food,
    Soil,
    Ore,
    Metal,
    Fuel,
}

/// Fixed unit-conversion constants for one matter kind.
///
/// `units_per_m3` is the reciprocal of `m3_per_unit`, carried explicitly so
/// hot paths never divide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatterSpec {
    /// Kilograms per simulation unit.
    pub kg_per_unit: Fixed64,
    /// Cubic meters per simulation unit.
    pub m3_per_unit: Fixed64,
    /// Simulation units per cubic meter.
    pub units_per_m3: Fixed64,
}

const fn spec(kg: i64, m3_milli: i64) -> MatterSpec {
    // Volume is expressed in integer milli-m3 to stay const-constructible;
    // units_per_m3 is derived so the pair is always reciprocal.
    MatterSpec {
        kg_per_unit: Fixed64::from_bits(kg << 32),
        m3_per_unit: Fixed64::from_bits((m3_milli << 32) / 1000),
        units_per_m3: Fixed64::from_bits((1000i64 << 32) / m3_milli),
    }
}

impl Matter {
    /// All matter kinds, in declaration order. Useful for iteration in
    /// tests and telemetry.
    pub const ALL: [Matter; 9] = [
        Matter::Oxygen,
        Matter::Nitrogen,
        Matter::CarbonDioxide,
        Matter::Water,
        Matter::Food,
        Matter::Soil,
        Matter::Ore,
        Matter::Metal,
        Matter::Fuel,
    ];

    /// Immutable conversion constants for this kind.
    pub const fn spec(self) -> MatterSpec {
        match self {
            // Gases: one unit is one kg at storage pressure.
            Matter::Oxygen => spec(1, 750),
            Matter::Nitrogen => spec(1, 800),
            Matter::CarbonDioxide => spec(1, 500),
            // Liquids and solids.
            Matter::Water => spec(1, 1),
            Matter::Food => spec(1, 2),
            Matter::Soil => spec(2, 1),
            Matter::Ore => spec(3, 1),
            Matter::Metal => spec(8, 1),
            Matter::Fuel => spec(1, 1),
        }
    }

    /// Stable lowercase name, used by the data loader and snapshots.
    pub const fn name(self) -> &'static str {
        match self {
            Matter::Oxygen => "oxygen",
            Matter::Nitrogen => "nitrogen",
            Matter::CarbonDioxide => "carbon_dioxide",
            Matter::Water => "water",
            Matter::Food => "food",
            Matter::Soil => "soil",
            Matter::Ore => "ore",
            Matter::Metal => "metal",
            Matter::Fuel => "fuel",
        }
    }

    /// Parse a name produced by [`Matter::name`].
    pub fn from_name(name: &str) -> Option<Matter> {
        Matter::ALL.into_iter().find(|m| m.name() == name)
    }
}

// ---------------------------------------------------------------------------
// Energy
// ---------------------------------------------------------------------------

/// An energy buffer kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EnergyKind {
    /// Electrical charge, in watt-hours.
    Electrical,
    /// Thermal mass, in kelvin-scaled units.
    Thermal,
}

// ---------------------------------------------------------------------------
// ResourceKind and network families
// ---------------------------------------------------------------------------

/// The resource carried by an edge or exchanged through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Matter(Matter),
    Energy(EnergyKind),
}

/// Which independent network family a resource kind flows through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkFamily {
    /// Electrical and thermal distribution (power lines).
    Power,
    /// Gas, liquid, and solid transfer (pipelines, umbilicals).
    Pipeline,
}

impl ResourceKind {
    pub const fn family(self) -> NetworkFamily {
        match self {
            ResourceKind::Energy(_) => NetworkFamily::Power,
            ResourceKind::Matter(_) => NetworkFamily::Pipeline,
        }
    }
}
