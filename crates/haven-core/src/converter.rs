//! Converter tick protocol.
//!
//! Converters are nodes that exchange matter with their pipeline
//! neighbors and transform it internally (habitats scrub CO2, extractors
//! produce ore, heaters steer thermal mass toward a target). Each tick a
//! converter:
//!
//! 1. Resolves its adjacent exchange partners from a cached list,
//!    rebuilt only when connectivity changed.
//! 2. Pulls each intake's per-tick quota from the partners **in list
//!    order** — the first-listed partner is preferentially drained. The
//!    list follows edge-creation order; this is the documented stable
//!    tie-break, not an incidental ordering.
//! 3. Pushes the take into its own container; overflow is discarded or
//!    returned to the drained partners per the intake policy.
//! 4. Applies internal conversion rules via the same push/pull contract,
//!    never exceeding any container's capacity or availability.
//!
//! A converter that cannot meet its minimum operating power goes
//! degraded (event on the transition only) instead of erroring, and the
//! surrounding network tick continues.

use crate::event::{Event, EventBus};
use crate::fixed::{Fixed64, Seconds, Ticks};
use crate::grid::{GridStatus, NetworkManager};
use crate::id::NodeId;
use crate::matter::{EnergyKind, Matter, ResourceKind};
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;

// ---------------------------------------------------------------------------
// Converter spec
// ---------------------------------------------------------------------------

/// What to do with intake that exceeds the converter's own capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Drop the excess (user-visible "insufficient capacity" effect).
    Discard,
    /// Return the excess to the partners it was drained from.
    BackPressure,
}

/// One external intake: matter pulled from adjacent partners each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intake {
    pub matter: Matter,
    /// Units pulled per simulated second.
    pub rate_per_second: Fixed64,
    pub policy: OverflowPolicy,
}

/// An internal transformation: consume some matter kinds, produce others,
/// both against the converter's own containers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRule {
    /// (kind, units per second) consumed.
    pub consumes: Vec<(Matter, Fixed64)>,
    /// (kind, units per second) produced.
    pub produces: Vec<(Matter, Fixed64)>,
}

/// Steers the node's thermal container toward its `target` while powered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatingRule {
    /// Kelvin-scaled units added per simulated second.
    pub rate_per_second: Fixed64,
}

/// Per-node converter configuration and latched runtime state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Converter {
    pub intakes: Vec<Intake>,
    pub rules: Vec<ConversionRule>,
    pub heating: Option<HeatingRule>,
    /// Electrical demand below which the converter cannot operate.
    /// Zero means the converter runs unpowered.
    pub min_power_demand: Fixed64,
    /// Ticks of pump cooldown applied after a successful exchange.
    pub pump_cooldown_ticks: Ticks,
    /// Degraded/off latch; transitions emit events.
    pub degraded: bool,
}

impl Default for Converter {
    fn default() -> Self {
        Self {
            intakes: Vec::new(),
            rules: Vec::new(),
            heating: None,
            min_power_demand: Fixed64::ZERO,
            pump_cooldown_ticks: 0,
            degraded: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Converter module
// ---------------------------------------------------------------------------

/// Owns every converter spec and the cached adjacency lists.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ConverterModule {
    pub converters: SecondaryMap<NodeId, Converter>,
    /// Cached exchange partners per converter, in edge-creation order.
    #[serde(skip)]
    adjacency: SecondaryMap<NodeId, Vec<(Matter, NodeId)>>,
    /// Topology generation the cache was built against. Any connectivity
    /// change invalidates the whole cache; stale partner references are a
    /// correctness bug, not a cosmetic one.
    #[serde(skip)]
    cached_generation: Option<u64>,
}

impl ConverterModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a converter on a node.
    pub fn add_converter(&mut self, node: NodeId, converter: Converter) {
        self.converters.insert(node, converter);
        self.cached_generation = None;
    }

    /// Remove a node's converter spec and cache entry.
    pub fn remove_node(&mut self, node: NodeId) {
        self.converters.remove(node);
        self.adjacency.remove(node);
    }

    /// Cached partners for a node (test/telemetry visibility).
    pub fn partners(&self, node: NodeId) -> &[(Matter, NodeId)] {
        self.adjacency.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    fn rebuild_adjacency(&mut self, manager: &NetworkManager) {
        self.adjacency.clear();
        for (node_id, _) in &self.converters {
            let mut partners = Vec::new();
            for (_, edge) in &manager.edges {
                let ResourceKind::Matter(matter) = edge.kind else {
                    continue;
                };
                let other = if edge.from == node_id {
                    edge.to
                } else if edge.to == node_id {
                    edge.from
                } else {
                    continue;
                };
                partners.push((edge.seq, matter, other));
            }
            // Slot iteration order is not creation order once a detach
            // frees a slot for reuse; the edge sequence is.
            partners.sort_by_key(|(seq, _, _)| *seq);
            self.adjacency.insert(
                node_id,
                partners.into_iter().map(|(_, m, n)| (m, n)).collect(),
            );
        }
        self.cached_generation = Some(manager.topology_generation());
    }

    /// Advance every converter by one tick. Runs after the grid
    /// aggregation so this tick's network status is visible.
    pub fn tick(
        &mut self,
        manager: &mut NetworkManager,
        dt: Seconds,
        tick: Ticks,
        bus: &mut EventBus,
    ) {
        if self.cached_generation != Some(manager.topology_generation()) {
            self.rebuild_adjacency(manager);
        }

        let converter_ids: Vec<NodeId> = self.converters.keys().collect();
        for node_id in converter_ids {
            if manager.nodes.get(node_id).is_none() {
                // Node was destroyed; drop the spec rather than operate on
                // a stale reference.
                self.remove_node(node_id);
                continue;
            }

            let powered = self.is_powered(node_id, manager);
            let Some(converter) = self.converters.get_mut(node_id) else {
                continue;
            };
            if !powered {
                if !converter.degraded {
                    converter.degraded = true;
                    bus.emit(Event::ConverterDegraded {
                        node: node_id,
                        tick,
                    });
                }
                continue;
            }
            if converter.degraded {
                converter.degraded = false;
                bus.emit(Event::ConverterResumed {
                    node: node_id,
                    tick,
                });
            }

            self.pump_intakes(node_id, manager, dt, tick, bus);
            self.apply_rules(node_id, manager, dt);
            self.apply_heating(node_id, manager, dt);
        }
    }

    /// A converter with a power requirement needs its electrical network
    /// out of blackout.
    fn is_powered(&self, node_id: NodeId, manager: &NetworkManager) -> bool {
        let converter = &self.converters[node_id];
        if converter.min_power_demand <= Fixed64::ZERO {
            return true;
        }
        let kind = ResourceKind::Energy(EnergyKind::Electrical);
        match manager.network_of(node_id, kind) {
            Some(net) => manager.status(net) != Some(GridStatus::Blackout),
            // Not on any grid at all: cannot operate.
            None => false,
        }
    }

    /// Steps 2 and 3 of the protocol: drain partners in list order, then
    /// store the take locally.
    fn pump_intakes(
        &mut self,
        node_id: NodeId,
        manager: &mut NetworkManager,
        dt: Seconds,
        tick: Ticks,
        bus: &mut EventBus,
    ) {
        {
            let node = &manager.nodes[node_id];
            if node.pump_cooldown > 0 || node.detach_interference > 0 {
                return;
            }
        }

        let converter = self.converters[node_id].clone();
        let partners = self.adjacency.get(node_id).cloned().unwrap_or_default();
        let mut exchanged = false;

        for intake in &converter.intakes {
            let quota = intake.rate_per_second * dt;
            let mut pulled = Fixed64::ZERO;
            let mut drained: Vec<(NodeId, Fixed64)> = Vec::new();

            for (matter, partner) in &partners {
                if *matter != intake.matter || pulled >= quota {
                    continue;
                }
                let Some(partner_node) = manager.nodes.get_mut(*partner) else {
                    continue;
                };
                if partner_node.detach_interference > 0 {
                    continue;
                }
                let Some(container) = partner_node.containers.get_mut(&intake.matter) else {
                    continue;
                };
                let taken = container.pull(quota - pulled);
                if taken > Fixed64::ZERO {
                    pulled += taken;
                    drained.push((*partner, taken));
                }
            }

            if pulled <= Fixed64::ZERO {
                continue;
            }
            exchanged = true;

            let Some(node) = manager.nodes.get_mut(node_id) else {
                return;
            };
            let leftover = match node.containers.get_mut(&intake.matter) {
                Some(own) => {
                    let was_full = own.headroom() == Fixed64::ZERO;
                    let leftover = own.push(pulled);
                    if !was_full && own.headroom() == Fixed64::ZERO {
                        bus.emit(Event::StorageFull {
                            node: node_id,
                            kind: ResourceKind::Matter(intake.matter),
                            tick,
                        });
                    }
                    leftover
                }
                None => pulled,
            };

            if leftover > Fixed64::ZERO && intake.policy == OverflowPolicy::BackPressure {
                // Return the excess starting with the last partner drained.
                let mut remaining = leftover;
                for (partner, taken) in drained.iter().rev() {
                    if remaining <= Fixed64::ZERO {
                        break;
                    }
                    let Some(partner_node) = manager.nodes.get_mut(*partner) else {
                        continue;
                    };
                    if let Some(container) = partner_node.containers.get_mut(&intake.matter) {
                        let back = remaining.min(*taken);
                        let rejected = container.push(back);
                        remaining -= back - rejected;
                    }
                }
            }
            // Discard policy: leftover is simply dropped.
        }

        if exchanged && converter.pump_cooldown_ticks > 0 {
            manager.nodes[node_id].pump_cooldown = converter.pump_cooldown_ticks;
        }
    }

    /// Step 4: internal transformation against the node's own containers.
    /// The rule runs at the largest fraction of its nominal rate that
    /// neither overdraws a consumed container nor overfills a produced one.
    fn apply_rules(&mut self, node_id: NodeId, manager: &mut NetworkManager, dt: Seconds) {
        let converter = self.converters[node_id].clone();
        let Some(node) = manager.nodes.get_mut(node_id) else {
            return;
        };

        for rule in &converter.rules {
            let mut fraction = Fixed64::ONE;

            for (matter, rate) in &rule.consumes {
                let want = *rate * dt;
                if want <= Fixed64::ZERO {
                    continue;
                }
                let available = node
                    .containers
                    .get(matter)
                    .map(|c| c.amount())
                    .unwrap_or(Fixed64::ZERO);
                fraction = fraction.min((available / want).min(Fixed64::ONE));
            }
            for (matter, rate) in &rule.produces {
                let want = *rate * dt;
                if want <= Fixed64::ZERO {
                    continue;
                }
                let headroom = node
                    .containers
                    .get(matter)
                    .map(|c| c.headroom())
                    .unwrap_or(Fixed64::ZERO);
                fraction = fraction.min((headroom / want).min(Fixed64::ONE));
            }

            if fraction <= Fixed64::ZERO {
                continue;
            }
            for (matter, rate) in &rule.consumes {
                if let Some(container) = node.containers.get_mut(matter) {
                    let _ = container.pull(*rate * dt * fraction);
                }
            }
            for (matter, rate) in &rule.produces {
                if let Some(container) = node.containers.get_mut(matter) {
                    let _ = container.push(*rate * dt * fraction);
                }
            }
        }
    }

    /// Heating steers the thermal buffer toward its target, never past it.
    fn apply_heating(&mut self, node_id: NodeId, manager: &mut NetworkManager, dt: Seconds) {
        let Some(heating) = self.converters[node_id].heating else {
            return;
        };
        let Some(node) = manager.nodes.get_mut(node_id) else {
            return;
        };
        let Some(thermal) = node.energy.get_mut(&EnergyKind::Thermal) else {
            return;
        };
        let shortfall = thermal.target - thermal.amount();
        if shortfall <= Fixed64::ZERO {
            return;
        }
        let step = (heating.rate_per_second * dt).min(shortfall);
        let _ = thermal.push(step);
    }
}

// ===========================================================================
// Tests
// ===========================================================================
