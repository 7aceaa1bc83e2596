//! Supply bridging between the survival state machine and core containers.
//!
//! The survival module never touches colony nodes directly. It pulls
//! through the [`SupplySource`] trait, implemented both by the personal
//! pack (owned containers) and by a mutable view over a core node
//! (vehicle or habitat stores).

use std::collections::BTreeMap;

use haven_core::container::Container;
use haven_core::fixed::Fixed64;
use haven_core::matter::Matter;
use haven_core::node::Node;
use serde::{Deserialize, Serialize};

/// A store the survival module can draw consumption from.
pub trait SupplySource {
    /// Remove up to `amount`; returns the amount actually removed.
    fn pull(&mut self, matter: Matter, amount: Fixed64) -> Fixed64;
    /// Current contents for `matter` (zero when absent).
    fn amount(&self, matter: Matter) -> Fixed64;
    /// Capacity for `matter` (zero when absent).
    fn capacity(&self, matter: Matter) -> Fixed64;
}

// ---------------------------------------------------------------------------
// Pack supply
// ---------------------------------------------------------------------------

/// The personal pack: a set of owned containers carried everywhere.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackSupply {
    containers: BTreeMap<Matter, Container>,
}

impl PackSupply {
    pub fn new(loadout: Vec<Container>) -> Self {
        let containers = loadout.into_iter().map(|c| (c.matter, c)).collect();
        Self { containers }
    }

    /// Top every container up to capacity (powered habitat entry).
    pub fn refill(&mut self) {
        for container in self.containers.values_mut() {
            container.fill();
        }
    }

    pub fn container(&self, matter: Matter) -> Option<&Container> {
        self.containers.get(&matter)
    }
}

impl SupplySource for PackSupply {
    fn pull(&mut self, matter: Matter, amount: Fixed64) -> Fixed64 {
        match self.containers.get_mut(&matter) {
            Some(container) => container.pull(amount),
            None => Fixed64::ZERO,
        }
    }

    fn amount(&self, matter: Matter) -> Fixed64 {
        self.containers
            .get(&matter)
            .map(Container::amount)
            .unwrap_or(Fixed64::ZERO)
    }

    fn capacity(&self, matter: Matter) -> Fixed64 {
        self.containers
            .get(&matter)
            .map(Container::capacity)
            .unwrap_or(Fixed64::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Node supply
// ---------------------------------------------------------------------------

/// A mutable supply view over a core node's containers, used while the
/// astronaut draws from a vehicle or habitat.
#[derive(Debug)]
pub struct NodeSupply<'a> {
    node: &'a mut Node,
}

impl<'a> NodeSupply<'a> {
    pub fn new(node: &'a mut Node) -> Self {
        Self { node }
    }
}

impl SupplySource for NodeSupply<'_> {
    fn pull(&mut self, matter: Matter, amount: Fixed64) -> Fixed64 {
        match self.node.containers.get_mut(&matter) {
            Some(container) => container.pull(amount),
            None => Fixed64::ZERO,
        }
    }

    fn amount(&self, matter: Matter) -> Fixed64 {
        self.node
            .containers
            .get(&matter)
            .map(Container::amount)
            .unwrap_or(Fixed64::ZERO)
    }

    fn capacity(&self, matter: Matter) -> Fixed64 {
        self.node
            .containers
            .get(&matter)
            .map(Container::capacity)
            .unwrap_or(Fixed64::ZERO)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use haven_core::fixed::f64_to_fixed64 as f;
    use haven_core::test_utils::tank;

    #[test]
    fn pack_pull_is_bounded_by_contents() {
        let mut pack = PackSupply::new(vec![Container::with_amount(
            Matter::Water,
            f(10.0),
            f(3.0),
        )]);
        assert_eq!(pack.pull(Matter::Water, f(5.0)), f(3.0));
        assert_eq!(pack.amount(Matter::Water), Fixed64::ZERO);
        // Matter the pack does not carry pulls nothing.
        assert_eq!(pack.pull(Matter::Food, f(1.0)), Fixed64::ZERO);
    }

    #[test]
    fn refill_tops_every_container() {
        let mut pack = PackSupply::new(vec![
            Container::with_amount(Matter::Oxygen, f(10.0), f(1.0)),
            Container::with_amount(Matter::Water, f(20.0), f(0.0)),
        ]);
        pack.refill();
        assert_eq!(pack.amount(Matter::Oxygen), f(10.0));
        assert_eq!(pack.amount(Matter::Water), f(20.0));
    }

    #[test]
    fn node_supply_draws_from_node_containers() {
        let mut node = tank(Matter::Oxygen, 50.0, 30.0);
        {
            let mut supply = NodeSupply::new(&mut node);
            assert_eq!(supply.capacity(Matter::Oxygen), f(50.0));
            assert_eq!(supply.pull(Matter::Oxygen, f(12.0)), f(12.0));
        }
        // The draw lands on the node itself.
        assert_eq!(node.containers[&Matter::Oxygen].amount(), f(18.0));
    }
}
