//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::container::{Container, EnergyContainer};
use crate::converter::{ConversionRule, Converter, HeatingRule, Intake, OverflowPolicy};
use crate::fixed::Fixed64;
use crate::matter::{EnergyKind, Matter, ResourceKind};
use crate::node::{Capabilities, Node, Port};

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Resource-kind shorthands
// ===========================================================================

pub fn electrical() -> ResourceKind {
    ResourceKind::Energy(EnergyKind::Electrical)
}

pub fn thermal() -> ResourceKind {
    ResourceKind::Energy(EnergyKind::Thermal)
}

pub fn matter(m: Matter) -> ResourceKind {
    ResourceKind::Matter(m)
}

// ===========================================================================
// Node builders
// ===========================================================================

/// A solar array: power source rated at `watts`, scaled by the
/// environment's solar factor at tick time.
pub fn solar_array(watts: f64) -> Node {
    Node::new().with_port(electrical(), Port::source(fixed(watts)))
}

/// A battery bank holding `capacity_wh` with `charge_wh` initial charge.
pub fn battery_bank(capacity_wh: f64, charge_wh: f64) -> Node {
    let mut node = Node::new().with_port(electrical(), Port::battery());
    node.energy.insert(
        EnergyKind::Electrical,
        EnergyContainer::with_amount(EnergyKind::Electrical, fixed(capacity_wh), fixed(charge_wh)),
    );
    node
}

/// A storage tank for `m`, pumpable so it participates in exchanges.
pub fn tank(m: Matter, capacity: f64, amount: f64) -> Node {
    let mut node = Node::new().with_port(
        matter(m),
        Port {
            capabilities: Capabilities::SINK.and(Capabilities::PUMPABLE),
            output_rating: Fixed64::ZERO,
            demand: Fixed64::ZERO,
        },
    );
    node.containers
        .insert(m, Container::with_amount(m, fixed(capacity), fixed(amount)));
    node
}

/// A habitat: power sink drawing `demand_watts`, oxygen/water/food stores,
/// CO2 buffer, and a heated thermal mass.
pub fn habitat(demand_watts: f64) -> Node {
    let mut node = Node::new()
        .with_port(electrical(), Port::sink(fixed(demand_watts)))
        .with_port(matter(Matter::Oxygen), Port::pumpable())
        .with_port(matter(Matter::Water), Port::pumpable())
        .with_port(matter(Matter::Food), Port::pumpable());
    node.containers.insert(
        Matter::Oxygen,
        Container::new(Matter::Oxygen, fixed(100.0)),
    );
    node.containers
        .insert(Matter::Water, Container::new(Matter::Water, fixed(200.0)));
    node.containers
        .insert(Matter::Food, Container::new(Matter::Food, fixed(100.0)));
    node.containers.insert(
        Matter::CarbonDioxide,
        Container::new(Matter::CarbonDioxide, fixed(50.0)),
    );
    let mut mass = EnergyContainer::with_amount(EnergyKind::Thermal, fixed(400.0), fixed(280.0));
    mass.target = fixed(293.0);
    node.energy.insert(EnergyKind::Thermal, mass);
    node
}

/// An ore extractor: pumpable source producing `rate` units per second.
pub fn extractor(m: Matter, rate: f64, capacity: f64) -> Node {
    let mut node = Node::new().with_port(
        matter(m),
        Port {
            capabilities: Capabilities::SOURCE.and(Capabilities::PUMPABLE),
            output_rating: fixed(rate),
            demand: Fixed64::ZERO,
        },
    );
    node.containers.insert(m, Container::new(m, fixed(capacity)));
    node
}

// ===========================================================================
// Converter builders
// ===========================================================================

/// A converter spec that pulls `m` at `rate` per second from partners.
pub fn intake_converter(m: Matter, rate: f64, policy: OverflowPolicy) -> Converter {
    Converter {
        intakes: vec![Intake {
            matter: m,
            rate_per_second: fixed(rate),
            policy,
        }],
        ..Converter::default()
    }
}

/// A powered heater spec: needs `min_watts` and steers the node's thermal
/// mass toward its target at `rate` per second.
pub fn heater_converter(min_watts: f64, rate: f64) -> Converter {
    Converter {
        heating: Some(HeatingRule {
            rate_per_second: fixed(rate),
        }),
        min_power_demand: fixed(min_watts),
        ..Converter::default()
    }
}

/// A CO2 scrubber spec: converts CO2 back to oxygen at `rate` per second.
pub fn scrubber_converter(rate: f64) -> Converter {
    Converter {
        rules: vec![ConversionRule {
            consumes: vec![(Matter::CarbonDioxide, fixed(rate))],
            produces: vec![(Matter::Oxygen, fixed(rate))],
        }],
        ..Converter::default()
    }
}
