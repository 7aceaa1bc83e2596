//! Typed event system with buffered batch delivery.
//!
//! Events are emitted during the aggregation and converter phases and
//! delivered in batch at post-tick. Everything here fires on state
//! *transitions* only, never every tick — subscribers (UI bars, audio
//! cues, the connection prompt) therefore need no deduplication of
//! their own.

use crate::fixed::{Fixed64, Ticks};
use crate::grid::GridStatus;
use crate::id::{EdgeId, NetworkId, NodeId};
use crate::matter::ResourceKind;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A simulation event. All events carry the tick at which they occurred.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // -- Flow networks --
    /// A network's discrete status changed.
    GridStatusChanged {
        network: NetworkId,
        from: GridStatus,
        to: GridStatus,
        tick: Ticks,
    },
    /// Updated status readout for a network (rated/current/load/surplus,
    /// battery string). Emitted only when the aggregates changed.
    GridSummary {
        network: NetworkId,
        rated_capacity: Fixed64,
        current_output: Fixed64,
        load: Fixed64,
        surplus: Fixed64,
        battery_available: Fixed64,
        battery_installed: Fixed64,
        tick: Ticks,
    },

    // -- Connectivity --
    /// An attach was rejected before mutation; drives the external
    /// one-shot prompt.
    InvalidConnection {
        from: NodeId,
        to: NodeId,
        kind: ResourceKind,
        tick: Ticks,
    },
    EdgeAttached {
        edge: EdgeId,
        network: NetworkId,
        tick: Ticks,
    },
    EdgeDetached {
        edge: EdgeId,
        tick: Ticks,
    },
    /// A detach partitioned a network into two independent components.
    NetworkSplit {
        original: NetworkId,
        split_off: NetworkId,
        tick: Ticks,
    },

    // -- Converters --
    /// A converter fell below its minimum operating input and went
    /// degraded/off.
    ConverterDegraded { node: NodeId, tick: Ticks },
    ConverterResumed { node: NodeId, tick: Ticks },

    // -- Storage boundaries --
    StorageFull {
        node: NodeId,
        kind: ResourceKind,
        tick: Ticks,
    },
    StorageEmpty {
        node: NodeId,
        kind: ResourceKind,
        tick: Ticks,
    },
}

// ---------------------------------------------------------------------------
// Event bus
// ---------------------------------------------------------------------------

/// A passive listener: read-only, used for UI updates, audio, telemetry.
pub type Listener = Box<dyn FnMut(&Event)>;

/// Buffered event bus. Emission during a tick only appends; delivery to
/// listeners happens once, in batch, at post-tick.
#[derive(Default)]
pub struct EventBus {
    buffer: Vec<Event>,
    listeners: Vec<Listener>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("buffered", &self.buffer.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a passive listener called once per delivered event.
    pub fn subscribe(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    /// Buffer an event for post-tick delivery.
    pub fn emit(&mut self, event: Event) {
        self.buffer.push(event);
    }

    /// Number of events awaiting delivery.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Deliver all buffered events to listeners and return the batch.
    pub fn deliver(&mut self) -> Vec<Event> {
        let batch = std::mem::take(&mut self.buffer);
        for event in &batch {
            for listener in &mut self.listeners {
                listener(event);
            }
        }
        batch
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn emit_buffers_until_delivery() {
        let mut bus = EventBus::new();
        bus.emit(Event::ConverterDegraded { node: NodeId::default(), tick: 1 });
        assert_eq!(bus.pending(), 1);

        let batch = bus.deliver();
        assert_eq!(batch.len(), 1);
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn listeners_see_every_event_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);

        let mut bus = EventBus::new();
        bus.subscribe(Box::new(move |e| {
            if let Event::ConverterDegraded { tick, .. } = e {
                sink.borrow_mut().push(*tick);
            }
        }));

        bus.emit(Event::ConverterDegraded { node: NodeId::default(), tick: 1 });
        bus.emit(Event::ConverterDegraded { node: NodeId::default(), tick: 2 });
        let _ = bus.deliver();

        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn delivery_is_drained_once() {
        let mut bus = EventBus::new();
        bus.emit(Event::ConverterResumed { node: NodeId::default(), tick: 5 });
        assert_eq!(bus.deliver().len(), 1);
        assert!(bus.deliver().is_empty());
    }
}
