use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a node (habitat, storage device, converter) in the colony
    /// graph. Stable for the node's lifetime; used to key edge membership
    /// and to order battery draws deterministically.
    pub struct NodeId;

    /// Identifies an edge (power line, pipeline, umbilical).
    pub struct EdgeId;
}

/// Identifies a flow network. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub u32);

/// Identifies a resource deposit bound to an extractor node by the
/// external construction system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepositId(pub u64);

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn node_ids_are_ordered() {
        let mut sm = SlotMap::<NodeId, ()>::with_key();
        let a = sm.insert(());
        let b = sm.insert(());
        // Slotmap keys are Ord, which the grid relies on for the documented
        // ascending-instance-id battery draw order.
        assert!(a < b || b < a);
    }

    #[test]
    fn network_id_equality() {
        assert_eq!(NetworkId(3), NetworkId(3));
        assert_ne!(NetworkId(3), NetworkId(4));
    }

    #[test]
    fn deposit_ids_are_hashable() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(DepositId(7), "iron_vein");
        assert_eq!(map[&DepositId(7)], "iron_vein");
    }
}
