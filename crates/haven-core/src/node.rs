//! Nodes: entities that own containers and expose capability ports.
//!
//! A node declares, per resource kind it exchanges, a [`Port`] carrying
//! explicit capability flags (source / sink / battery / pumpable) plus its
//! rated output and demand. Capabilities are plain flags queried by field
//! match — no runtime type inspection.

use std::collections::BTreeMap;

use crate::container::{Container, EnergyContainer};
use crate::fixed::{Fixed64, Ticks};
use crate::id::DepositId;
use crate::matter::{EnergyKind, Matter, ResourceKind};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from node lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// `initialize_starting_containers` was called more than once.
    #[error("node already received its starting containers")]
    AlreadyInitialized,
    /// A deposit binding was given to a node with no pumpable port.
    #[error("node has no pumpable port to bind a deposit to")]
    NotPumpable,
}

// ---------------------------------------------------------------------------
// Capabilities and ports
// ---------------------------------------------------------------------------

/// Capability flags for one port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Can supply the resource to the network (rated by `output_rating`).
    pub source: bool,
    /// Draws the resource from the network (rated by `demand`).
    pub sink: bool,
    /// Buffers surplus and covers deficits (power family only in practice).
    pub battery: bool,
    /// Exchanges matter with adjacent nodes via the converter protocol.
    pub pumpable: bool,
}

impl Capabilities {
    pub const SOURCE: Capabilities = Capabilities {
        source: true,
        sink: false,
        battery: false,
        pumpable: false,
    };
    pub const SINK: Capabilities = Capabilities {
        source: false,
        sink: true,
        battery: false,
        pumpable: false,
    };
    pub const BATTERY: Capabilities = Capabilities {
        source: false,
        sink: false,
        battery: true,
        pumpable: false,
    };
    pub const PUMPABLE: Capabilities = Capabilities {
        source: false,
        sink: false,
        battery: false,
        pumpable: true,
    };

    /// Combine two capability sets.
    pub const fn and(self, other: Capabilities) -> Capabilities {
        Capabilities {
            source: self.source || other.source,
            sink: self.sink || other.sink,
            battery: self.battery || other.battery,
            pumpable: self.pumpable || other.pumpable,
        }
    }

    /// Whether any flag is set.
    pub const fn any(self) -> bool {
        self.source || self.sink || self.battery || self.pumpable
    }
}

/// One resource-kind attachment point on a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub capabilities: Capabilities,
    /// Rated output when `capabilities.source` (watts for power, units/s
    /// for matter).
    pub output_rating: Fixed64,
    /// Steady draw when `capabilities.sink`.
    pub demand: Fixed64,
}

impl Port {
    pub fn source(output_rating: Fixed64) -> Self {
        Port {
            capabilities: Capabilities::SOURCE,
            output_rating,
            demand: Fixed64::ZERO,
        }
    }

    pub fn sink(demand: Fixed64) -> Self {
        Port {
            capabilities: Capabilities::SINK,
            output_rating: Fixed64::ZERO,
            demand,
        }
    }

    pub fn battery() -> Self {
        Port {
            capabilities: Capabilities::BATTERY,
            output_rating: Fixed64::ZERO,
            demand: Fixed64::ZERO,
        }
    }

    pub fn pumpable() -> Self {
        Port {
            capabilities: Capabilities::PUMPABLE,
            output_rating: Fixed64::ZERO,
            demand: Fixed64::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// An entity owning containers and exposing capability ports.
///
/// Identity is the `NodeId` slotmap key assigned by the network manager;
/// it is stable for the node's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Attachment points, keyed by the resource kind they exchange.
    pub ports: BTreeMap<ResourceKind, Port>,
    /// Owned matter buffers.
    pub containers: BTreeMap<Matter, Container>,
    /// Owned energy buffers (battery charge, thermal mass).
    pub energy: BTreeMap<EnergyKind, EnergyContainer>,
    /// Deposit binding for extractor nodes, set by the construction system.
    pub deposit: Option<DepositId>,
    /// Whether the construction handoff has run.
    initialized: bool,
    /// Ticks remaining before this node may pump again.
    pub pump_cooldown: Ticks,
    /// Ticks remaining in the detach-interference window after a neighbor
    /// edge was severed.
    pub detach_interference: Ticks,
}

impl Node {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a port. Repeated calls for the same kind merge capabilities
    /// and overwrite ratings.
    pub fn with_port(mut self, kind: ResourceKind, port: Port) -> Self {
        match self.ports.get_mut(&kind) {
            Some(existing) => {
                existing.capabilities = existing.capabilities.and(port.capabilities);
                existing.output_rating = port.output_rating;
                existing.demand = port.demand;
            }
            None => {
                self.ports.insert(kind, port);
            }
        }
        self
    }

    /// Whether an edge of `kind` may terminate at this node.
    pub fn accepts(&self, kind: ResourceKind) -> bool {
        self.ports
            .get(&kind)
            .is_some_and(|p| p.capabilities.any())
    }

    /// Construction handoff: install the starting containers. Called by the
    /// external builder exactly once per completed node.
    pub fn initialize_starting_containers(
        &mut self,
        containers: Vec<Container>,
        energy: Vec<EnergyContainer>,
    ) -> Result<(), NodeError> {
        if self.initialized {
            return Err(NodeError::AlreadyInitialized);
        }
        for c in containers {
            self.containers.insert(c.matter, c);
        }
        for e in energy {
            self.energy.insert(e.kind, e);
        }
        self.initialized = true;
        Ok(())
    }

    /// Bind a deposit to an extractor node.
    pub fn bind_deposit(&mut self, deposit: DepositId) -> Result<(), NodeError> {
        let pumpable = self
            .ports
            .values()
            .any(|p| p.capabilities.pumpable);
        if !pumpable {
            return Err(NodeError::NotPumpable);
        }
        self.deposit = Some(deposit);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Advance countdown fields by one tick. Clearing a field cancels the
    /// timed effect; there is no hidden suspended state.
    pub fn tick_countdowns(&mut self) {
        self.pump_cooldown = self.pump_cooldown.saturating_sub(1);
        self.detach_interference = self.detach_interference.saturating_sub(1);
    }

    /// Mark tick start on every owned container.
    pub fn begin_tick(&mut self) {
        for c in self.containers.values_mut() {
            c.begin_tick();
        }
        for e in self.energy.values_mut() {
            e.begin_tick();
        }
    }

    /// Record per-tick deltas on every owned container.
    pub fn record_deltas(&mut self) {
        for c in self.containers.values_mut() {
            c.record_delta();
        }
        for e in self.energy.values_mut() {
            e.record_delta();
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
