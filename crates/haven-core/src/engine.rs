//! The simulation engine: owns the colony graph and orchestrates the
//! per-tick pipeline.
//!
//! # Architecture
//!
//! The `Engine` owns:
//! - A [`NetworkManager`] (nodes, edges, derived flow networks)
//! - A [`ConverterModule`] (per-node converter specs and adjacency caches)
//! - An [`Environment`] (explicit sun/time service)
//! - A [`SimState`] (tick counter, accumulator)
//! - A [`TickStrategy`] (per-frame vs. fixed-step)
//! - An [`EventBus`] for typed simulation events
//!
//! # Pipeline
//!
//! Each step runs:
//! 1. **Pre-tick** -- advance node countdowns, mark container tick starts
//! 2. **Aggregate** -- recompute network totals, exchange with batteries,
//!    update grid status
//! 3. **Convert** -- converters pump from partners and transform matter
//! 4. **Record** -- capture per-container rate-of-change telemetry
//! 5. **Post-tick** -- deliver buffered events to subscribers
//! 6. **Bookkeeping** -- increment the tick counter

use crate::converter::ConverterModule;
use crate::event::{Event, EventBus};
use crate::fixed::{Fixed64, Seconds, Ticks, f64_to_fixed64};
use crate::grid::{Environment, NetworkManager};
use serde::{Deserialize, Serialize};

/// Ceiling on steps per `advance()` call so a long stall cannot wedge the
/// caller in a catch-up loop.
const MAX_STEPS_PER_ADVANCE: u64 = 240;

// ---------------------------------------------------------------------------
// Strategy and state
// ---------------------------------------------------------------------------

/// How the engine advances time. Chosen at engine construction.
///
/// Both strategies execute the same pipeline per step; they differ only in
/// how wall-clock time maps to steps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum TickStrategy {
    /// One step per `advance()` call, with the caller's full (scaled)
    /// delta as the step duration.
    PerFrame,

    /// Accumulate scaled time and run as many fixed steps as fit,
    /// carrying the remainder forward. Deterministic for a given input
    /// sequence regardless of frame pacing.
    FixedStep {
        /// Duration of one simulation step, in seconds.
        step: Seconds,
    },
}

impl TickStrategy {
    /// Fixed-step at the standard 4 steps per simulated second.
    pub fn fixed_default() -> Self {
        TickStrategy::FixedStep {
            step: f64_to_fixed64(0.25),
        }
    }
}

/// Mutable simulation clock state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimState {
    /// Current tick counter. Incremented once per step.
    pub tick: Ticks,
    /// Accumulated time remainder for fixed-step mode, in seconds.
    pub accumulator: Seconds,
    /// Multiplier applied to incoming deltas (pause menus and fast
    /// forward live outside; this is the sim-speed knob).
    pub time_scale: Fixed64,
}

impl SimState {
    pub fn new() -> Self {
        Self {
            tick: 0,
            accumulator: Fixed64::ZERO,
            time_scale: Fixed64::ONE,
        }
    }
}

impl Default for SimState {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of an `Engine::advance()` call.
#[derive(Debug, Default)]
pub struct AdvanceResult {
    /// Number of simulation steps actually executed.
    pub steps_run: u64,
    /// Events delivered during this advance, in emission order.
    pub events: Vec<Event>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The core simulation engine.
#[derive(Debug)]
pub struct Engine {
    pub manager: NetworkManager,
    pub converters: ConverterModule,
    pub environment: Environment,
    pub sim_state: SimState,
    pub event_bus: EventBus,
    pub(crate) strategy: TickStrategy,
    pub(crate) paused: bool,
}

impl Engine {
    /// Create a new engine with the given tick strategy.
    pub fn new(strategy: TickStrategy) -> Self {
        Self {
            manager: NetworkManager::new(),
            converters: ConverterModule::new(),
            environment: Environment::default(),
            sim_state: SimState::new(),
            event_bus: EventBus::new(),
            strategy,
            paused: false,
        }
    }

    /// Reassemble an engine from restored parts (snapshot path).
    pub fn from_parts(
        manager: NetworkManager,
        converters: ConverterModule,
        environment: Environment,
        sim_state: SimState,
        strategy: TickStrategy,
    ) -> Self {
        Self {
            manager,
            converters,
            environment,
            sim_state,
            event_bus: EventBus::new(),
            strategy,
            paused: false,
        }
    }

    pub fn tick(&self) -> Ticks {
        self.sim_state.tick
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn set_time_scale(&mut self, scale: Fixed64) {
        self.sim_state.time_scale = scale.max(Fixed64::ZERO);
    }

    /// Advance the simulation by `delta` wall-clock seconds.
    ///
    /// Applies the time scale, then runs steps per the strategy. While
    /// paused, no steps run and no time accumulates.
    pub fn advance(&mut self, delta: Seconds) -> AdvanceResult {
        let mut result = AdvanceResult::default();
        if self.paused || delta <= Fixed64::ZERO {
            return result;
        }
        let scaled = delta * self.sim_state.time_scale;
        if scaled <= Fixed64::ZERO {
            return result;
        }

        match self.strategy {
            TickStrategy::PerFrame => {
                self.step(scaled, &mut result);
            }
            TickStrategy::FixedStep { step } => {
                self.sim_state.accumulator += scaled;
                while self.sim_state.accumulator >= step
                    && result.steps_run < MAX_STEPS_PER_ADVANCE
                {
                    self.sim_state.accumulator -= step;
                    self.step(step, &mut result);
                }
            }
        }
        result
    }

    /// [`advance`](Engine::advance) for hosts that pass the time scale
    /// with every frame instead of holding it as engine state. The scale
    /// persists, exactly as if set via
    /// [`set_time_scale`](Engine::set_time_scale).
    pub fn advance_scaled(&mut self, delta: Seconds, time_scale: Fixed64) -> AdvanceResult {
        self.set_time_scale(time_scale);
        self.advance(delta)
    }

    /// Run exactly one pipeline step of `dt` simulated seconds.
    fn step(&mut self, dt: Seconds, result: &mut AdvanceResult) {
        let tick = self.sim_state.tick + 1;

        // Phase 1: pre-tick.
        for (_, node) in &mut self.manager.nodes {
            node.tick_countdowns();
            node.begin_tick();
        }

        // Phase 2: aggregate.
        self.manager
            .tick(&self.environment, dt, tick, &mut self.event_bus);

        // Phase 3: convert.
        self.converters
            .tick(&mut self.manager, dt, tick, &mut self.event_bus);

        // Phase 4: record telemetry.
        for (_, node) in &mut self.manager.nodes {
            node.record_deltas();
        }

        // Phase 5: post-tick delivery.
        result.events.extend(self.event_bus.deliver());

        // Phase 6: bookkeeping.
        self.sim_state.tick = tick;
        result.steps_run += 1;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
