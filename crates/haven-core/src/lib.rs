//! Haven Core -- the life-support and power simulation for colony games.
//!
//! This crate provides the resource containers, capability-port nodes,
//! typed flow networks, converter exchange protocol, events, serialization,
//! and deterministic fixed-point arithmetic the colony layer depends on.
//!
//! # Tick Pipeline
//!
//! Each step of [`engine::Engine::advance`] runs the following phases:
//!
//! 1. **Pre-tick** -- Advance node countdowns and mark container tick starts.
//! 2. **Aggregate** -- Recompute network totals, exchange surplus/deficit
//!    with batteries, and update each grid's status state machine.
//! 3. **Convert** -- Converters pump matter from adjacent partners and
//!    transform it against their own containers.
//! 4. **Record** -- Capture per-container rate-of-change telemetry.
//! 5. **Post-tick** -- Deliver buffered events to subscribers in batch.
//! 6. **Bookkeeping** -- Increment the tick counter.
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- Main simulation engine and pipeline orchestrator.
//! - [`grid::NetworkManager`] -- Nodes, typed edges, and the derived
//!   per-resource flow networks with merge/split connectivity.
//! - [`container::Container`] -- Capacity-bounded buffer with the
//!   push-leftover / pull-taken contract.
//! - [`node::Node`] -- Entity with capability ports (source, sink,
//!   battery, pumpable) and owned containers.
//! - [`converter::ConverterModule`] -- Pump/transform protocol with cached
//!   adjacency and degraded-state latching.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.
//! - [`event::EventBus`] -- Subscription-based event bus with buffered delivery.
//! - [`serialize`] -- Versioned serialization and snapshot support via bitcode.

pub mod container;
pub mod converter;
#[cfg(feature = "data-loader")]
pub mod data_loader;
pub mod engine;
pub mod event;
pub mod fixed;
pub mod grid;
pub mod id;
pub mod matter;
pub mod node;
pub mod serialize;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
