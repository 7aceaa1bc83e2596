//! Capacity-bounded resource buffers.
//!
//! Containers never error on the hot per-tick path: [`Container::push`]
//! returns the leftover that did not fit and [`Container::pull`] returns
//! the amount actually taken. Partial transfer is a first-class outcome
//! the caller handles (reroute, discard, degrade), not an error.

use crate::fixed::{Fixed64, clamp_unit};
use crate::matter::{EnergyKind, Matter};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Container (matter)
// ---------------------------------------------------------------------------

/// A capacity-bounded buffer for one matter kind.
///
/// Invariant: `0 <= amount <= capacity` at every observable point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// The matter kind this buffer holds.
    pub matter: Matter,
    /// Current contents, in simulation units.
    amount: Fixed64,
    /// Maximum contents, in simulation units.
    capacity: Fixed64,
    /// Net change recorded for the last completed tick. Telemetry only;
    /// never used for control decisions.
    last_delta: Fixed64,
    /// Amount at the start of the current tick (for delta recording).
    #[serde(default)]
    tick_start: Fixed64,
}

impl Container {
    /// Create an empty container.
    pub fn new(matter: Matter, capacity: Fixed64) -> Self {
        Self::with_amount(matter, capacity, Fixed64::ZERO)
    }

    /// Create a container with an initial fill, clamped to capacity.
    pub fn with_amount(matter: Matter, capacity: Fixed64, amount: Fixed64) -> Self {
        let amount = amount.clamp(Fixed64::ZERO, capacity.max(Fixed64::ZERO));
        Self {
            matter,
            amount,
            capacity: capacity.max(Fixed64::ZERO),
            last_delta: Fixed64::ZERO,
            tick_start: amount,
        }
    }

    /// Current contents.
    pub fn amount(&self) -> Fixed64 {
        self.amount
    }

    /// Maximum contents.
    pub fn capacity(&self) -> Fixed64 {
        self.capacity
    }

    /// Remaining headroom.
    pub fn headroom(&self) -> Fixed64 {
        self.capacity - self.amount
    }

    /// Add up to `amount`, bounded by remaining capacity. Returns the
    /// portion that could not be absorbed.
    #[must_use = "leftover indicates the amount that did not fit"]
    pub fn push(&mut self, amount: Fixed64) -> Fixed64 {
        if amount <= Fixed64::ZERO {
            return Fixed64::ZERO;
        }
        let accepted = amount.min(self.headroom());
        self.amount += accepted;
        amount - accepted
    }

    /// Remove up to `amount`, bounded by current contents. Returns the
    /// amount actually removed; `taken < amount` means partial service.
    #[must_use = "returns the amount actually removed, which may be less than requested"]
    pub fn pull(&mut self, amount: Fixed64) -> Fixed64 {
        if amount <= Fixed64::ZERO {
            return Fixed64::ZERO;
        }
        let taken = amount.min(self.amount);
        self.amount -= taken;
        taken
    }

    /// Fill to capacity. Used by the habitat top-up on context entry.
    pub fn fill(&mut self) {
        self.amount = self.capacity;
    }

    /// Fill ratio in [0, 1]; 0 when capacity is 0.
    pub fn utilization(&self) -> Fixed64 {
        match self.amount.checked_div(self.capacity) {
            Some(ratio) => clamp_unit(ratio),
            None => Fixed64::ZERO,
        }
    }

    /// Mark the start of a tick for rate-of-change recording.
    pub fn begin_tick(&mut self) {
        self.tick_start = self.amount;
    }

    /// Record the net change since [`Self::begin_tick`].
    pub fn record_delta(&mut self) {
        self.last_delta = self.amount - self.tick_start;
    }

    /// Net change over the last completed tick.
    pub fn rate_of_change(&self) -> Fixed64 {
        self.last_delta
    }
}

// ---------------------------------------------------------------------------
// EnergyContainer
// ---------------------------------------------------------------------------

/// A capacity-bounded buffer for one energy kind (battery charge in
/// watt-hours, or kelvin-scaled thermal mass).
///
/// Same invariant and push/pull contract as [`Container`], plus a `target`
/// equilibrium value the heating logic steers toward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyContainer {
    /// The energy kind this buffer holds.
    pub kind: EnergyKind,
    amount: Fixed64,
    capacity: Fixed64,
    /// Target/equilibrium level used by heating logic.
    pub target: Fixed64,
    last_delta: Fixed64,
    #[serde(default)]
    tick_start: Fixed64,
}

impl EnergyContainer {
    pub fn new(kind: EnergyKind, capacity: Fixed64) -> Self {
        Self::with_amount(kind, capacity, Fixed64::ZERO)
    }

    pub fn with_amount(kind: EnergyKind, capacity: Fixed64, amount: Fixed64) -> Self {
        let capacity = capacity.max(Fixed64::ZERO);
        let amount = amount.clamp(Fixed64::ZERO, capacity);
        Self {
            kind,
            amount,
            capacity,
            target: Fixed64::ZERO,
            last_delta: Fixed64::ZERO,
            tick_start: amount,
        }
    }

    pub fn amount(&self) -> Fixed64 {
        self.amount
    }

    pub fn capacity(&self) -> Fixed64 {
        self.capacity
    }

    pub fn headroom(&self) -> Fixed64 {
        self.capacity - self.amount
    }

    /// Add up to `amount`; returns the portion that did not fit.
    #[must_use = "leftover indicates the amount that did not fit"]
    pub fn push(&mut self, amount: Fixed64) -> Fixed64 {
        if amount <= Fixed64::ZERO {
            return Fixed64::ZERO;
        }
        let accepted = amount.min(self.headroom());
        self.amount += accepted;
        amount - accepted
    }

    /// Remove up to `amount`; returns the amount actually removed.
    #[must_use = "returns the amount actually removed, which may be less than requested"]
    pub fn pull(&mut self, amount: Fixed64) -> Fixed64 {
        if amount <= Fixed64::ZERO {
            return Fixed64::ZERO;
        }
        let taken = amount.min(self.amount);
        self.amount -= taken;
        taken
    }

    pub fn utilization(&self) -> Fixed64 {
        match self.amount.checked_div(self.capacity) {
            Some(ratio) => clamp_unit(ratio),
            None => Fixed64::ZERO,
        }
    }

    pub fn begin_tick(&mut self) {
        self.tick_start = self.amount;
    }

    pub fn record_delta(&mut self) {
        self.last_delta = self.amount - self.tick_start;
    }

    pub fn rate_of_change(&self) -> Fixed64 {
        self.last_delta
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::f64_to_fixed64 as f;

    // -----------------------------------------------------------------------
    // Push clamps at capacity and returns the exact leftover
    // -----------------------------------------------------------------------
    #[test]
    fn push_overflow_returns_leftover() {
        // Scenario: capacity 5, current 2, push 4 -> leftover 1, amount 5.
        let mut c = Container::with_amount(Matter::Water, f(5.0), f(2.0));
        let leftover = c.push(f(4.0));
        assert_eq!(leftover, f(1.0));
        assert_eq!(c.amount(), f(5.0));
    }

    // -----------------------------------------------------------------------
    // Pull clamps at zero and returns the amount actually taken
    // -----------------------------------------------------------------------
    #[test]
    fn pull_undersupply_returns_taken() {
        // Scenario: capacity 5, current 2, pull 4 -> taken 2, amount 0.
        let mut c = Container::with_amount(Matter::Water, f(5.0), f(2.0));
        let taken = c.pull(f(4.0));
        assert_eq!(taken, f(2.0));
        assert_eq!(c.amount(), Fixed64::ZERO);
    }

    #[test]
    fn push_full_fit_returns_zero_leftover() {
        let mut c = Container::new(Matter::Oxygen, f(10.0));
        assert_eq!(c.push(f(3.0)), Fixed64::ZERO);
        assert_eq!(c.amount(), f(3.0));
    }

    #[test]
    fn negative_push_and_pull_are_no_ops() {
        let mut c = Container::with_amount(Matter::Oxygen, f(10.0), f(5.0));
        assert_eq!(c.push(f(-1.0)), Fixed64::ZERO);
        assert_eq!(c.pull(f(-1.0)), Fixed64::ZERO);
        assert_eq!(c.amount(), f(5.0));
    }

    #[test]
    fn utilization_clamped_and_zero_capacity_safe() {
        let mut c = Container::new(Matter::Food, f(4.0));
        assert_eq!(c.utilization(), Fixed64::ZERO);
        let _ = c.push(f(1.0));
        assert_eq!(c.utilization(), f(0.25));

        let empty = Container::new(Matter::Food, Fixed64::ZERO);
        assert_eq!(empty.utilization(), Fixed64::ZERO);
    }

    #[test]
    fn rate_of_change_records_net_tick_delta() {
        let mut c = Container::with_amount(Matter::Water, f(10.0), f(4.0));
        c.begin_tick();
        let _ = c.push(f(3.0));
        let _ = c.pull(f(1.0));
        c.record_delta();
        assert_eq!(c.rate_of_change(), f(2.0));
    }

    #[test]
    fn initial_amount_clamped_to_capacity() {
        let c = Container::with_amount(Matter::Ore, f(5.0), f(9.0));
        assert_eq!(c.amount(), f(5.0));
    }

    #[test]
    fn fill_tops_up_to_capacity() {
        let mut c = Container::with_amount(Matter::Oxygen, f(8.0), f(1.5));
        c.fill();
        assert_eq!(c.amount(), f(8.0));
    }

    #[test]
    fn energy_container_same_contract() {
        let mut e = EnergyContainer::with_amount(EnergyKind::Electrical, f(100.0), f(90.0));
        assert_eq!(e.push(f(25.0)), f(15.0));
        assert_eq!(e.amount(), f(100.0));
        assert_eq!(e.pull(f(250.0)), f(100.0));
        assert_eq!(e.amount(), Fixed64::ZERO);
    }

    #[test]
    fn energy_container_tracks_target() {
        let mut e = EnergyContainer::new(EnergyKind::Thermal, f(400.0));
        e.target = f(293.0);
        assert_eq!(e.target, f(293.0));
    }
}
