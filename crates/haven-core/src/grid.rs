//! Flow networks: the connected components formed by nodes and typed edges.
//!
//! The [`NetworkManager`] owns every node and edge in the colony and keeps
//! one [`FlowNetwork`] per connected component per resource kind. Power
//! grids and matter pipelines are independent families; a habitat sits in
//! an oxygen network and an electrical network at the same time.
//!
//! Networks are derived state: attach and detach update membership
//! immediately (merging or splitting components), while the per-tick
//! aggregates and the [`GridStatus`] state machine are recomputed from
//! current membership every tick.
//!
//! # Battery order
//!
//! Surplus charges and deficits drain member batteries in ascending
//! [`NodeId`] order. This is the documented stable tie-break; member lists
//! are kept sorted so the order survives merges and splits.

use std::collections::BTreeMap;

use crate::event::{Event, EventBus};
use crate::fixed::{Fixed64, Seconds, Ticks};
use crate::id::{EdgeId, NetworkId, NodeId};
use crate::matter::ResourceKind;
use crate::node::Node;
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};

/// Ticks a node refuses pump exchanges after one of its edges is severed.
pub const DETACH_INTERFERENCE_TICKS: Ticks = 4;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from connectivity commands.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("node not found: {0:?}")]
    NodeNotFound(NodeId),
    #[error("edge not found: {0:?}")]
    EdgeNotFound(EdgeId),
    #[error("cannot connect a node to itself: {0:?}")]
    SelfConnection(NodeId),
    /// Capability/resource-kind mismatch. No state was mutated.
    #[error("invalid connection: {kind:?} not accepted by both endpoints")]
    InvalidConnection {
        from: NodeId,
        to: NodeId,
        kind: ResourceKind,
    },
}

// ---------------------------------------------------------------------------
// Environment service
// ---------------------------------------------------------------------------

/// Explicit sun/time service passed into the tick — no ambient global
/// lookup. Scales the actual output of power-family sources (solar panels
/// at night produce nothing).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// Multiplier in [0, 1] applied to power-family source output.
    pub solar_output_factor: Fixed64,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            solar_output_factor: Fixed64::ONE,
        }
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// A typed connector joining exactly two nodes. The edge holds non-owning
/// references (ids) to its endpoints; world anchor data lives with the
/// excluded visualization layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: ResourceKind,
    /// Monotonic creation sequence. Slot order is not creation order once
    /// freed slots are reused, so orderings documented as "edge-creation
    /// order" sort by this instead.
    pub seq: u64,
}

// ---------------------------------------------------------------------------
// Aggregates and status
// ---------------------------------------------------------------------------

/// Cached per-tick aggregates for one network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GridAggregates {
    /// Sum of member source output ratings.
    pub rated_capacity: Fixed64,
    /// Environmentally-scaled actual output, clamped to rated.
    pub current_output: Fixed64,
    /// Sum of member sink demands.
    pub load: Fixed64,
    /// `current_output - load` (negative while drawing battery).
    pub surplus: Fixed64,
    /// Sum of member battery capacities.
    pub battery_installed: Fixed64,
    /// Sum of member battery charge after this tick's exchange.
    pub battery_available: Fixed64,
}

/// Discrete per-network status, recomputed each tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridStatus {
    /// Output exceeds load; batteries charging.
    Surplus,
    /// Output exactly meets load.
    #[default]
    Balanced,
    /// Output short of load; batteries covering the deficit.
    DrawingBattery,
    /// Batteries exhausted; load unmet.
    Blackout,
}

// ---------------------------------------------------------------------------
// FlowNetwork
// ---------------------------------------------------------------------------

/// One connected component of nodes sharing a resource kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNetwork {
    pub id: NetworkId,
    /// The resource kind every edge in this network carries.
    pub kind: ResourceKind,
    /// Member node ids, kept sorted ascending.
    pub members: Vec<NodeId>,
    /// Member edge ids.
    pub edges: Vec<EdgeId>,
    pub aggregates: GridAggregates,
    pub status: GridStatus,
    /// Aggregates as last reported to the event bus; summary events fire
    /// only when these change.
    #[serde(skip)]
    last_summary: Option<GridAggregates>,
}

impl FlowNetwork {
    fn new(id: NetworkId, kind: ResourceKind) -> Self {
        Self {
            id,
            kind,
            members: Vec::new(),
            edges: Vec::new(),
            aggregates: GridAggregates::default(),
            status: GridStatus::default(),
            last_summary: None,
        }
    }

    fn add_member(&mut self, node: NodeId) {
        if let Err(pos) = self.members.binary_search(&node) {
            self.members.insert(pos, node);
        }
    }

    fn remove_member(&mut self, node: NodeId) {
        if let Ok(pos) = self.members.binary_search(&node) {
            self.members.remove(pos);
        }
    }
}

// ---------------------------------------------------------------------------
// NetworkManager
// ---------------------------------------------------------------------------

/// Owns every node and edge and maintains the derived flow networks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkManager {
    pub nodes: SlotMap<NodeId, Node>,
    pub edges: SlotMap<EdgeId, Edge>,
    networks: BTreeMap<NetworkId, FlowNetwork>,
    /// Per-node membership: resource kind -> network containing the node.
    membership: SecondaryMap<NodeId, BTreeMap<ResourceKind, NetworkId>>,
    next_network_id: u32,
    next_edge_seq: u64,
    /// Bumped on every attach/detach/node removal. Converter adjacency
    /// caches compare against this to detect stale lists.
    topology_generation: u64,
}

impl Default for NetworkManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkManager {
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            edges: SlotMap::with_key(),
            networks: BTreeMap::new(),
            membership: SecondaryMap::new(),
            next_network_id: 0,
            next_edge_seq: 0,
            topology_generation: 0,
        }
    }

    fn alloc_network(&mut self, kind: ResourceKind) -> NetworkId {
        let id = NetworkId(self.next_network_id);
        self.next_network_id += 1;
        self.networks.insert(id, FlowNetwork::new(id, kind));
        id
    }

    /// Add a node. Every port kind starts as a singleton network; edges
    /// merge them later.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let kinds: Vec<ResourceKind> = node.ports.keys().copied().collect();
        let id = self.nodes.insert(node);
        let mut map = BTreeMap::new();
        for kind in kinds {
            let net = self.alloc_network(kind);
            self.networks.get_mut(&net).unwrap().add_member(id);
            self.refresh_aggregates(net);
            map.insert(kind, net);
        }
        self.membership.insert(id, map);
        self.topology_generation += 1;
        id
    }

    /// Remove a node, detaching all incident edges first. Countdown fields
    /// and adjacency caches referencing the node are invalidated through
    /// the topology generation bump.
    pub fn remove_node(&mut self, node: NodeId, bus: &mut EventBus, tick: Ticks) {
        let incident: Vec<EdgeId> = self
            .edges
            .iter()
            .filter(|(_, e)| e.from == node || e.to == node)
            .map(|(id, _)| id)
            .collect();
        for edge in incident {
            // Node removal is itself a player action; detach cannot fail
            // for an edge id we just enumerated.
            let _ = self.detach(edge, bus, tick);
        }
        if let Some(map) = self.membership.remove(node) {
            for (_, net_id) in map {
                if let Some(network) = self.networks.get_mut(&net_id) {
                    network.remove_member(node);
                    if network.members.is_empty() {
                        self.networks.remove(&net_id);
                    } else {
                        self.refresh_aggregates(net_id);
                    }
                }
            }
        }
        self.nodes.remove(node);
        self.topology_generation += 1;
    }

    /// Connect two nodes with an edge carrying `kind`.
    ///
    /// Validation happens before any mutation: on rejection no partial
    /// edge exists, an [`Event::InvalidConnection`] is buffered for the
    /// external prompt, and the error is returned.
    pub fn attach(
        &mut self,
        from: NodeId,
        to: NodeId,
        kind: ResourceKind,
        bus: &mut EventBus,
        tick: Ticks,
    ) -> Result<EdgeId, ConnectError> {
        if from == to {
            return Err(ConnectError::SelfConnection(from));
        }
        let from_node = self
            .nodes
            .get(from)
            .ok_or(ConnectError::NodeNotFound(from))?;
        let to_node = self.nodes.get(to).ok_or(ConnectError::NodeNotFound(to))?;

        if !from_node.accepts(kind) || !to_node.accepts(kind) {
            bus.emit(Event::InvalidConnection {
                from,
                to,
                kind,
                tick,
            });
            return Err(ConnectError::InvalidConnection { from, to, kind });
        }

        let seq = self.next_edge_seq;
        self.next_edge_seq += 1;
        let edge = self.edges.insert(Edge {
            from,
            to,
            kind,
            seq,
        });
        let net_from = self.membership[from][&kind];
        let net_to = self.membership[to][&kind];

        let home = if net_from == net_to {
            net_from
        } else {
            self.merge(net_from, net_to)
        };
        let network = self.networks.get_mut(&home).unwrap();
        network.edges.push(edge);
        self.refresh_aggregates(home);

        self.topology_generation += 1;
        bus.emit(Event::EdgeAttached {
            edge,
            network: home,
            tick,
        });
        Ok(edge)
    }

    /// Merge two networks of the same kind; the lower id survives.
    fn merge(&mut self, a: NetworkId, b: NetworkId) -> NetworkId {
        let (keep, absorb) = if a < b { (a, b) } else { (b, a) };
        let absorbed = self.networks.remove(&absorb).unwrap();
        let network = self.networks.get_mut(&keep).unwrap();
        for member in &absorbed.members {
            network.add_member(*member);
        }
        network.edges.extend(absorbed.edges);
        for member in absorbed.members {
            if let Some(map) = self.membership.get_mut(member) {
                map.insert(absorbed.kind, keep);
            }
        }
        keep
    }

    /// Remove an edge. If the removal disconnects the component, the
    /// network is split into two exact, independent networks — no node
    /// retains the pre-split aggregates.
    pub fn detach(
        &mut self,
        edge: EdgeId,
        bus: &mut EventBus,
        tick: Ticks,
    ) -> Result<(), ConnectError> {
        let data = self
            .edges
            .remove(edge)
            .ok_or(ConnectError::EdgeNotFound(edge))?;
        let net_id = self.membership[data.from][&data.kind];
        let network = self.networks.get_mut(&net_id).unwrap();
        network.edges.retain(|e| *e != edge);

        let reachable = self.reachable_from(net_id, data.from);
        if !reachable.contains(&data.to) {
            let new_id = self.split(net_id, &reachable, tick, bus);
            self.refresh_aggregates(new_id);
        }
        self.refresh_aggregates(net_id);

        for endpoint in [data.from, data.to] {
            if let Some(node) = self.nodes.get_mut(endpoint) {
                node.detach_interference = DETACH_INTERFERENCE_TICKS;
            }
        }

        self.topology_generation += 1;
        bus.emit(Event::EdgeDetached { edge, tick });
        Ok(())
    }

    /// Breadth-first walk over a network's remaining edges.
    fn reachable_from(&self, net_id: NetworkId, start: NodeId) -> Vec<NodeId> {
        let network = &self.networks[&net_id];
        let mut reachable = vec![start];
        let mut frontier = vec![start];
        while let Some(current) = frontier.pop() {
            for edge_id in &network.edges {
                let edge = &self.edges[*edge_id];
                let next = if edge.from == current {
                    edge.to
                } else if edge.to == current {
                    edge.from
                } else {
                    continue;
                };
                if !reachable.contains(&next) {
                    reachable.push(next);
                    frontier.push(next);
                }
            }
        }
        reachable.sort_unstable();
        reachable
    }

    /// Move everything not in `keep_members` out of `net_id` into a fresh
    /// network.
    fn split(
        &mut self,
        net_id: NetworkId,
        keep_members: &[NodeId],
        tick: Ticks,
        bus: &mut EventBus,
    ) -> NetworkId {
        let kind = self.networks[&net_id].kind;
        let new_id = self.alloc_network(kind);

        let network = self.networks.get_mut(&net_id).unwrap();
        let mut moved_members = Vec::new();
        network.members.retain(|m| {
            if keep_members.binary_search(m).is_ok() {
                true
            } else {
                moved_members.push(*m);
                false
            }
        });
        let mut moved_edges = Vec::new();
        let edges = &self.edges;
        network.edges.retain(|e| {
            let data = &edges[*e];
            if keep_members.binary_search(&data.from).is_ok() {
                true
            } else {
                moved_edges.push(*e);
                false
            }
        });

        let new_network = self.networks.get_mut(&new_id).unwrap();
        for member in &moved_members {
            new_network.add_member(*member);
        }
        new_network.edges = moved_edges;
        for member in moved_members {
            if let Some(map) = self.membership.get_mut(member) {
                map.insert(kind, new_id);
            }
        }

        bus.emit(Event::NetworkSplit {
            original: net_id,
            split_off: new_id,
            tick,
        });
        new_id
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn network(&self, id: NetworkId) -> Option<&FlowNetwork> {
        self.networks.get(&id)
    }

    pub fn networks(&self) -> impl Iterator<Item = &FlowNetwork> {
        self.networks.values()
    }

    pub fn network_of(&self, node: NodeId, kind: ResourceKind) -> Option<NetworkId> {
        self.membership.get(node)?.get(&kind).copied()
    }

    pub fn status(&self, id: NetworkId) -> Option<GridStatus> {
        self.networks.get(&id).map(|n| n.status)
    }

    pub fn aggregates(&self, id: NetworkId) -> Option<GridAggregates> {
        self.networks.get(&id).map(|n| n.aggregates)
    }

    /// Current topology generation; bumped on every connectivity change.
    pub fn topology_generation(&self) -> u64 {
        self.topology_generation
    }

    // -----------------------------------------------------------------------
    // Aggregation tick
    // -----------------------------------------------------------------------

    /// Recompute membership sums without touching battery charge. Used
    /// after merges/splits so no network carries stale aggregates between
    /// the mutation and the next tick.
    fn refresh_aggregates(&mut self, net_id: NetworkId) {
        let network = &self.networks[&net_id];
        let kind = network.kind;
        let mut agg = GridAggregates::default();
        for member in &network.members {
            let Some(node) = self.nodes.get(*member) else {
                continue;
            };
            let Some(port) = node.ports.get(&kind) else {
                continue;
            };
            if port.capabilities.source {
                agg.rated_capacity += port.output_rating;
            }
            if port.capabilities.sink {
                agg.load += port.demand;
            }
            if port.capabilities.battery {
                if let Some(reserve) = reserve_of(node, kind) {
                    agg.battery_installed += reserve.0;
                    agg.battery_available += reserve.1;
                }
            }
        }
        agg.current_output = agg.rated_capacity;
        agg.surplus = agg.current_output - agg.load;
        self.networks.get_mut(&net_id).unwrap().aggregates = agg;
    }

    /// Advance every network by one tick: recompute aggregates from
    /// current membership, exchange with batteries over `dt` simulated
    /// seconds, update status, and emit transition events.
    pub fn tick(&mut self, env: &Environment, dt: Seconds, tick: Ticks, bus: &mut EventBus) {
        let network_ids: Vec<NetworkId> = self.networks.keys().copied().collect();

        for net_id in network_ids {
            let network = &self.networks[&net_id];
            let kind = network.kind;
            let members = network.members.clone();
            let old_status = network.status;

            // Sum ratings and demands over current membership.
            let mut rated = Fixed64::ZERO;
            let mut load = Fixed64::ZERO;
            let mut batteries: Vec<NodeId> = Vec::new();
            for member in &members {
                let Some(node) = self.nodes.get(*member) else {
                    continue;
                };
                let Some(port) = node.ports.get(&kind) else {
                    continue;
                };
                if port.capabilities.source {
                    rated += port.output_rating;
                }
                if port.capabilities.sink {
                    load += port.demand;
                }
                if port.capabilities.battery {
                    batteries.push(*member);
                }
            }
            // `members` is sorted, so batteries already follow the
            // documented ascending-instance-id draw order.

            let factor = match kind.family() {
                crate::matter::NetworkFamily::Power => env.solar_output_factor,
                crate::matter::NetworkFamily::Pipeline => Fixed64::ONE,
            };
            let current_output = (rated * factor).min(rated);
            let deficit = load - current_output;

            // Aggregates stay in rate units; battery exchange converts to
            // stored energy over the step.
            let status;
            if deficit <= Fixed64::ZERO {
                let mut excess = -deficit * dt;
                for battery in &batteries {
                    if excess <= Fixed64::ZERO {
                        break;
                    }
                    self.charge_battery(*battery, kind, &mut excess, tick, bus);
                }
                status = if current_output > load {
                    GridStatus::Surplus
                } else {
                    GridStatus::Balanced
                };
            } else {
                let mut remaining = deficit * dt;
                for battery in &batteries {
                    if remaining <= Fixed64::ZERO {
                        break;
                    }
                    self.drain_battery(*battery, kind, &mut remaining, tick, bus);
                }
                status = if remaining <= Fixed64::ZERO {
                    GridStatus::DrawingBattery
                } else {
                    GridStatus::Blackout
                };
            }

            // Post-exchange battery totals.
            let mut installed = Fixed64::ZERO;
            let mut available = Fixed64::ZERO;
            for battery in &batteries {
                if let Some(node) = self.nodes.get(*battery)
                    && let Some((cap, amt)) = reserve_of(node, kind)
                {
                    installed += cap;
                    available += amt;
                }
            }

            let aggregates = GridAggregates {
                rated_capacity: rated,
                current_output,
                load,
                surplus: current_output - load,
                battery_installed: installed,
                battery_available: available,
            };

            let network = self.networks.get_mut(&net_id).unwrap();
            network.aggregates = aggregates;
            network.status = status;

            if status != old_status {
                bus.emit(Event::GridStatusChanged {
                    network: net_id,
                    from: old_status,
                    to: status,
                    tick,
                });
            }
            if network.last_summary != Some(aggregates) {
                network.last_summary = Some(aggregates);
                bus.emit(Event::GridSummary {
                    network: net_id,
                    rated_capacity: aggregates.rated_capacity,
                    current_output: aggregates.current_output,
                    load: aggregates.load,
                    surplus: aggregates.surplus,
                    battery_available: aggregates.battery_available,
                    battery_installed: aggregates.battery_installed,
                    tick,
                });
            }
        }
    }

    fn charge_battery(
        &mut self,
        node_id: NodeId,
        kind: ResourceKind,
        excess: &mut Fixed64,
        tick: Ticks,
        bus: &mut EventBus,
    ) {
        let Some(node) = self.nodes.get_mut(node_id) else {
            return;
        };
        let Some(mut reserve) = reserve_mut(node, kind) else {
            return;
        };
        let had_headroom = reserve.headroom() > Fixed64::ZERO;
        let leftover = reserve.push(*excess);
        let accepted = *excess - leftover;
        *excess = leftover;
        if had_headroom && accepted > Fixed64::ZERO && reserve.headroom() == Fixed64::ZERO {
            bus.emit(Event::StorageFull {
                node: node_id,
                kind,
                tick,
            });
        }
    }

    fn drain_battery(
        &mut self,
        node_id: NodeId,
        kind: ResourceKind,
        remaining: &mut Fixed64,
        tick: Ticks,
        bus: &mut EventBus,
    ) {
        let Some(node) = self.nodes.get_mut(node_id) else {
            return;
        };
        let Some(mut reserve) = reserve_mut(node, kind) else {
            return;
        };
        let had_charge = reserve.amount() > Fixed64::ZERO;
        let taken = reserve.pull(*remaining);
        *remaining -= taken;
        if had_charge && reserve.amount() == Fixed64::ZERO {
            bus.emit(Event::StorageEmpty {
                node: node_id,
                kind,
                tick,
            });
        }
    }

    /// Rebuild all network membership from the edge set. Used after
    /// restoring a snapshot: topology comes from persisted edges, never
    /// from world geometry.
    pub fn rebuild_networks(&mut self) {
        self.networks.clear();
        self.membership.clear();
        self.next_network_id = 0;

        let node_ids: Vec<NodeId> = self.nodes.keys().collect();
        for node_id in node_ids {
            let kinds: Vec<ResourceKind> =
                self.nodes[node_id].ports.keys().copied().collect();
            let mut map = BTreeMap::new();
            for kind in kinds {
                let net = self.alloc_network(kind);
                self.networks.get_mut(&net).unwrap().add_member(node_id);
                map.insert(kind, net);
            }
            self.membership.insert(node_id, map);
        }

        let edge_ids: Vec<EdgeId> = self.edges.keys().collect();
        for edge_id in edge_ids {
            let edge = self.edges[edge_id];
            let net_from = self.membership[edge.from][&edge.kind];
            let net_to = self.membership[edge.to][&edge.kind];
            let home = if net_from == net_to {
                net_from
            } else {
                self.merge(net_from, net_to)
            };
            self.networks.get_mut(&home).unwrap().edges.push(edge_id);
        }

        let ids: Vec<NetworkId> = self.networks.keys().copied().collect();
        for id in ids {
            self.refresh_aggregates(id);
        }
        self.topology_generation += 1;
    }
}

/// (capacity, amount) of a node's reserve buffer for `kind`, if any.
///
/// Energy kinds use the matching energy container; matter kinds use the
/// matter container, so tanks double as pipeline reserves under the same
/// push/pull contract.
fn reserve_of(node: &Node, kind: ResourceKind) -> Option<(Fixed64, Fixed64)> {
    match kind {
        ResourceKind::Energy(k) => node.energy.get(&k).map(|e| (e.capacity(), e.amount())),
        ResourceKind::Matter(m) => node
            .containers
            .get(&m)
            .map(|c| (c.capacity(), c.amount())),
    }
}

/// Mutable reserve access with a unified push/pull surface.
enum Reserve<'a> {
    Energy(&'a mut crate::container::EnergyContainer),
    Matter(&'a mut crate::container::Container),
}

impl Reserve<'_> {
    fn amount(&self) -> Fixed64 {
        match self {
            Reserve::Energy(e) => e.amount(),
            Reserve::Matter(c) => c.amount(),
        }
    }

    fn headroom(&self) -> Fixed64 {
        match self {
            Reserve::Energy(e) => e.headroom(),
            Reserve::Matter(c) => c.headroom(),
        }
    }

    #[must_use]
    fn push(&mut self, amount: Fixed64) -> Fixed64 {
        match self {
            Reserve::Energy(e) => e.push(amount),
            Reserve::Matter(c) => c.push(amount),
        }
    }

    #[must_use]
    fn pull(&mut self, amount: Fixed64) -> Fixed64 {
        match self {
            Reserve::Energy(e) => e.pull(amount),
            Reserve::Matter(c) => c.pull(amount),
        }
    }
}

fn reserve_mut(node: &mut Node, kind: ResourceKind) -> Option<Reserve<'_>> {
    match kind {
        ResourceKind::Energy(k) => node.energy.get_mut(&k).map(Reserve::Energy),
        ResourceKind::Matter(m) => node.containers.get_mut(&m).map(Reserve::Matter),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
