//! Haven Survival -- the astronaut deprivation state machine layered over
//! the core colony simulation.
//!
//! Each survival resource (oxygen, water, food, warmth) is tracked
//! independently: per tick the module pulls the configured consumption
//! from the active supply context, accrues deprivation time while the
//! pull falls short, and walks a one-way state machine toward a single
//! fatal outcome. The first resource to cross its survival limit wins;
//! there is no combined health score.
//!
//! The module is evaluated by the caller *after* `Engine::advance`, so it
//! always observes post-tick container state.

pub mod bridge;

use std::collections::BTreeMap;

use haven_core::fixed::{Fixed64, Seconds};
use haven_core::matter::Matter;
use serde::{Deserialize, Serialize};

use crate::bridge::{PackSupply, SupplySource};

// ---------------------------------------------------------------------------
// Kinds and states
// ---------------------------------------------------------------------------

/// A survival resource tracked by the deprivation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeprivationKind {
    Oxygen,
    Water,
    Food,
    /// Warmth: met while the context is powered, never pulled as matter.
    Power,
}

impl DeprivationKind {
    pub const ALL: [DeprivationKind; 4] = [
        DeprivationKind::Oxygen,
        DeprivationKind::Water,
        DeprivationKind::Food,
        DeprivationKind::Power,
    ];

    /// Death-cause string reported when this resource turns fatal.
    pub const fn cause(self) -> &'static str {
        match self {
            DeprivationKind::Oxygen => "ASPHYXIATION",
            DeprivationKind::Water => "DEHYDRATION",
            DeprivationKind::Food => "STARVATION",
            DeprivationKind::Power => "FREEZING",
        }
    }

    /// The matter pulled from the supply, if any.
    pub const fn matter(self) -> Option<Matter> {
        match self {
            DeprivationKind::Oxygen => Some(Matter::Oxygen),
            DeprivationKind::Water => Some(Matter::Water),
            DeprivationKind::Food => Some(Matter::Food),
            DeprivationKind::Power => None,
        }
    }
}

/// Per-resource survival state. One-way while deprived; recovery returns
/// to the hint-derived state, but `Fatal` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurvivalState {
    #[default]
    Nominal,
    /// Supply hint at two hours or less.
    Warning,
    /// Supply hint at one hour or less.
    Critical,
    /// Consumption currently unmet; the fatal timer is running.
    Depleted,
    /// The survival limit was crossed. Terminal.
    Fatal,
}

/// Where consumption is drawn from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplyContext {
    /// The personal pack's own containers.
    #[default]
    Pack,
    /// A vehicle node's containers.
    Vehicle,
    /// A habitat node's containers.
    Habitat,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Consumption rate and fatal limit for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Units consumed per simulated second.
    pub consumption_per_second: Fixed64,
    /// Seconds of unmet consumption before death.
    pub survival_limit_seconds: Fixed64,
}

/// Survival tuning, loadable from data files.
///
/// Defaults: oxygen kills in 150 seconds, water in 24 hours, food in
/// 72 hours, and an unpowered (freezing) context in 600 seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurvivalConfig {
    pub oxygen: ResourceConfig,
    pub water: ResourceConfig,
    pub food: ResourceConfig,
    /// Seconds without power/warmth before death.
    pub power_limit_seconds: Fixed64,
}

impl Default for SurvivalConfig {
    fn default() -> Self {
        Self {
            oxygen: ResourceConfig {
                consumption_per_second: Fixed64::from_num(0.1),
                survival_limit_seconds: Fixed64::from_num(150),
            },
            water: ResourceConfig {
                consumption_per_second: Fixed64::from_num(0.02),
                survival_limit_seconds: Fixed64::from_num(86_400),
            },
            food: ResourceConfig {
                consumption_per_second: Fixed64::from_num(0.01),
                survival_limit_seconds: Fixed64::from_num(259_200),
            },
            power_limit_seconds: Fixed64::from_num(600),
        }
    }
}

impl SurvivalConfig {
    fn resource(&self, kind: DeprivationKind) -> ResourceConfig {
        match kind {
            DeprivationKind::Oxygen => self.oxygen,
            DeprivationKind::Water => self.water,
            DeprivationKind::Food => self.food,
            DeprivationKind::Power => ResourceConfig {
                consumption_per_second: Fixed64::ZERO,
                survival_limit_seconds: self.power_limit_seconds,
            },
        }
    }
}

/// Load survival tuning from a JSON string.
#[cfg(feature = "data-loader")]
pub fn load_config_json(json: &str) -> Result<SurvivalConfig, serde_json::Error> {
    serde_json::from_str(json)
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Survival events. All fire on transitions or value changes only.
#[derive(Debug, Clone, PartialEq)]
pub enum SurvivalEvent {
    /// Supply bar readout changed (percentage of capacity plus the
    /// coarse hours-left hint).
    BarChanged {
        kind: DeprivationKind,
        percentage: Fixed64,
        hours_left: Option<u64>,
    },
    /// Supply hint dropped to two hours or less. One-shot per episode.
    Warning { kind: DeprivationKind },
    /// Supply hint dropped to one hour or less. One-shot per episode.
    Critical { kind: DeprivationKind },
    /// Consumption went unmet; the fatal timer started.
    Depleted { kind: DeprivationKind },
    /// Consumption is fully met again after a deprivation episode.
    Recovered { kind: DeprivationKind },
    /// A survival limit was crossed. Fired exactly once, ever.
    Death { cause: &'static str },
}

// ---------------------------------------------------------------------------
// Per-resource tracking
// ---------------------------------------------------------------------------

/// Runtime state for one survival resource.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeprivationResource {
    pub kind: DeprivationKind,
    pub consumption_per_second: Fixed64,
    pub survival_limit_seconds: Fixed64,
    /// Accumulated unmet time. Strictly increases while unmet; reset to
    /// exactly zero the tick consumption is fully met.
    pub deprivation_seconds: Fixed64,
    pub state: SurvivalState,
    warning_latched: bool,
    critical_latched: bool,
}

impl DeprivationResource {
    fn new(kind: DeprivationKind, config: ResourceConfig) -> Self {
        Self {
            kind,
            consumption_per_second: config.consumption_per_second,
            survival_limit_seconds: config.survival_limit_seconds,
            deprivation_seconds: Fixed64::ZERO,
            state: SurvivalState::default(),
            warning_latched: false,
            critical_latched: false,
        }
    }

    /// Fraction of the fatal limit already consumed, clamped to [0, 1].
    pub fn deprivation_ratio(&self) -> Fixed64 {
        if self.survival_limit_seconds <= Fixed64::ZERO {
            return Fixed64::ZERO;
        }
        (self.deprivation_seconds / self.survival_limit_seconds).min(Fixed64::ONE)
    }
}

/// Coarse supply hint: `ceil(amount / (rate * 60))`. `None` when the
/// resource has no consumption rate.
fn hours_left_hint(amount: Fixed64, consumption_per_second: Fixed64) -> Option<u64> {
    if consumption_per_second <= Fixed64::ZERO {
        return None;
    }
    let per_hint_unit = consumption_per_second * Fixed64::from_num(60);
    let hint: Fixed64 = (amount / per_hint_unit).ceil();
    Some(hint.to_num::<u64>())
}

// ---------------------------------------------------------------------------
// Survival module
// ---------------------------------------------------------------------------

/// The survival state machine for one astronaut.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurvivalModule {
    pub resources: BTreeMap<DeprivationKind, DeprivationResource>,
    context: SupplyContext,
    dead: bool,
    /// Last bar readout emitted per kind, for change-only events.
    #[serde(skip)]
    last_bars: BTreeMap<DeprivationKind, (Fixed64, Option<u64>)>,
}

impl SurvivalModule {
    pub fn new(config: &SurvivalConfig) -> Self {
        let resources = DeprivationKind::ALL
            .into_iter()
            .map(|kind| (kind, DeprivationResource::new(kind, config.resource(kind))))
            .collect();
        Self {
            resources,
            context: SupplyContext::default(),
            dead: false,
            last_bars: BTreeMap::new(),
        }
    }

    pub fn context(&self) -> SupplyContext {
        self.context
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Switch back to pack supply (stepping outside).
    pub fn exit_to_pack(&mut self) {
        self.context = SupplyContext::Pack;
    }

    /// Board a vehicle. No refill; vehicles are supply sources, not
    /// resupply stations.
    pub fn enter_vehicle(&mut self) {
        self.context = SupplyContext::Vehicle;
    }

    /// Enter a habitat. Entering a *powered* habitat tops the pack up to
    /// maximum, except on `resume` (initial load), which must not grant a
    /// second refill.
    pub fn enter_habitat(&mut self, pack: &mut PackSupply, powered: bool, resume: bool) {
        self.context = SupplyContext::Habitat;
        if powered && !resume {
            pack.refill();
        }
    }

    /// Multiplicative movement-speed coefficient in (0, 1]. Purely
    /// cosmetic; deprivation kills via the timer, never via this.
    pub fn movement_penalty(&self) -> Fixed64 {
        let half = Fixed64::from_num(0.5);
        let mut coefficient = Fixed64::ONE;
        for resource in self.resources.values() {
            coefficient *= Fixed64::ONE - resource.deprivation_ratio() * half;
        }
        coefficient.max(Fixed64::from_num(0.05))
    }

    /// Advance the state machine by `dt` seconds against the active
    /// supply. `powered` reports whether the current context provides
    /// warmth (habitat grid out of blackout, vehicle running, or suit
    /// heater for the pack).
    ///
    /// The one-shot Warning/Critical latches re-arm when the hours-left
    /// hint rises back above the threshold, not on the first satisfied
    /// tick: a supply flickering at the boundary stays latched, a real
    /// refill re-arms both.
    ///
    /// Call once per engine step, after `Engine::advance`.
    pub fn tick(
        &mut self,
        dt: Seconds,
        supply: &mut dyn SupplySource,
        powered: bool,
    ) -> Vec<SurvivalEvent> {
        let mut events = Vec::new();
        if self.dead || dt <= Fixed64::ZERO {
            return events;
        }

        for kind in DeprivationKind::ALL {
            let Some(resource) = self.resources.get_mut(&kind) else {
                continue;
            };

            // Meet consumption from the supply.
            let met = match kind.matter() {
                Some(matter) => {
                    let want = resource.consumption_per_second * dt;
                    let taken = supply.pull(matter, want);
                    taken >= want
                }
                None => powered,
            };

            let was_deprived = resource.deprivation_seconds > Fixed64::ZERO;
            if met {
                resource.deprivation_seconds = Fixed64::ZERO;
                if was_deprived {
                    events.push(SurvivalEvent::Recovered { kind });
                }
            } else {
                resource.deprivation_seconds += dt;
                if !was_deprived {
                    events.push(SurvivalEvent::Depleted { kind });
                }
            }

            // Fatal check. First resource to cross its limit wins.
            if resource.deprivation_seconds > resource.survival_limit_seconds {
                resource.state = SurvivalState::Fatal;
                self.dead = true;
                events.push(SurvivalEvent::Death {
                    cause: kind.cause(),
                });
                return events;
            }

            // Hint thresholds, independent of the fatal timer.
            let hint = match kind.matter() {
                Some(matter) => {
                    hours_left_hint(supply.amount(matter), resource.consumption_per_second)
                }
                None => None,
            };
            if let Some(hours) = hint {
                if hours > 2 {
                    resource.warning_latched = false;
                }
                if hours > 1 {
                    resource.critical_latched = false;
                }
                if hours <= 2 && !resource.warning_latched {
                    resource.warning_latched = true;
                    events.push(SurvivalEvent::Warning { kind });
                }
                if hours <= 1 && !resource.critical_latched {
                    resource.critical_latched = true;
                    events.push(SurvivalEvent::Critical { kind });
                }
            }

            resource.state = if resource.deprivation_seconds > Fixed64::ZERO {
                SurvivalState::Depleted
            } else if resource.critical_latched {
                SurvivalState::Critical
            } else if resource.warning_latched {
                SurvivalState::Warning
            } else {
                SurvivalState::Nominal
            };

            // Bar readout, change-only.
            if let Some(matter) = kind.matter() {
                let capacity = supply.capacity(matter);
                let percentage = if capacity > Fixed64::ZERO {
                    (supply.amount(matter) / capacity).min(Fixed64::ONE)
                } else {
                    Fixed64::ZERO
                };
                let bar = (percentage, hint);
                if self.last_bars.get(&kind) != Some(&bar) {
                    self.last_bars.insert(kind, bar);
                    events.push(SurvivalEvent::BarChanged {
                        kind,
                        percentage,
                        hours_left: hint,
                    });
                }
            }
        }
        events
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::PackSupply;
    use haven_core::container::Container;
    use haven_core::fixed::f64_to_fixed64 as f;

    fn oxygen_only_config(rate: f64, limit: f64) -> SurvivalConfig {
        SurvivalConfig {
            oxygen: ResourceConfig {
                consumption_per_second: f(rate),
                survival_limit_seconds: f(limit),
            },
            // Other resources idle so the scenario isolates oxygen.
            water: ResourceConfig {
                consumption_per_second: Fixed64::ZERO,
                survival_limit_seconds: f(1e9),
            },
            food: ResourceConfig {
                consumption_per_second: Fixed64::ZERO,
                survival_limit_seconds: f(1e9),
            },
            power_limit_seconds: f(1e9),
        }
    }

    fn oxygen_pack(amount: f64) -> PackSupply {
        PackSupply::new(vec![Container::with_amount(
            Matter::Oxygen,
            f(100.0),
            f(amount),
        )])
    }

    #[test]
    fn asphyxiation_scenario_fires_each_event_once() {
        // Oxygen at 1 unit/s from a 10-unit pack, 150 second limit.
        let config = oxygen_only_config(1.0, 150.0);
        let mut module = SurvivalModule::new(&config);
        let mut pack = oxygen_pack(10.0);

        let mut warnings = 0;
        let mut criticals = 0;
        let mut deaths = Vec::new();
        for _ in 0..600 {
            for event in module.tick(f(1.0), &mut pack, true) {
                match event {
                    SurvivalEvent::Warning { .. } => warnings += 1,
                    SurvivalEvent::Critical { .. } => criticals += 1,
                    SurvivalEvent::Death { cause } => deaths.push(cause),
                    _ => {}
                }
            }
        }

        assert_eq!(warnings, 1);
        assert_eq!(criticals, 1);
        assert_eq!(deaths, vec!["ASPHYXIATION"]);
        assert!(module.is_dead());
        // Pack ran dry after 10 seconds; limit crossed 150 seconds later.
        assert_eq!(
            module.resources[&DeprivationKind::Oxygen].state,
            SurvivalState::Fatal
        );
    }

    #[test]
    fn met_consumption_resets_deprivation_to_exactly_zero() {
        let config = oxygen_only_config(1.0, 150.0);
        let mut module = SurvivalModule::new(&config);

        // Starve for a while.
        let mut empty = oxygen_pack(0.0);
        for _ in 0..20 {
            let _ = module.tick(f(1.0), &mut empty, true);
        }
        assert_eq!(
            module.resources[&DeprivationKind::Oxygen].deprivation_seconds,
            f(20.0)
        );

        // One met tick resets the timer completely.
        let mut full = oxygen_pack(100.0);
        let events = module.tick(f(1.0), &mut full, true);
        assert_eq!(
            module.resources[&DeprivationKind::Oxygen].deprivation_seconds,
            Fixed64::ZERO
        );
        assert!(
            events
                .iter()
                .any(|e| matches!(e, SurvivalEvent::Recovered { kind: DeprivationKind::Oxygen }))
        );
    }

    #[test]
    fn power_deprivation_freezes() {
        let mut config = oxygen_only_config(0.0, 1e9);
        config.power_limit_seconds = f(600.0);
        let mut module = SurvivalModule::new(&config);
        let mut pack = oxygen_pack(100.0);

        let mut deaths = Vec::new();
        for _ in 0..601 {
            for event in module.tick(f(1.0), &mut pack, false) {
                if let SurvivalEvent::Death { cause } = event {
                    deaths.push(cause);
                }
            }
        }
        assert_eq!(deaths, vec!["FREEZING"]);
    }

    #[test]
    fn warning_relatches_after_refill() {
        let config = oxygen_only_config(1.0, 1e9);
        let mut module = SurvivalModule::new(&config);
        // 200 of 300 units at 1/s: hint starts above 2 "hours".
        let mut pack = PackSupply::new(vec![Container::with_amount(
            Matter::Oxygen,
            f(300.0),
            f(200.0),
        )]);

        let mut warnings = 0;
        for _ in 0..150 {
            for event in module.tick(f(1.0), &mut pack, true) {
                if matches!(event, SurvivalEvent::Warning { .. }) {
                    warnings += 1;
                }
            }
        }
        assert_eq!(warnings, 1);

        // Refill raises the hint; the next depletion warns again.
        pack.refill();
        let mut warnings_after = 0;
        for _ in 0..250 {
            for event in module.tick(f(1.0), &mut pack, true) {
                if matches!(event, SurvivalEvent::Warning { .. }) {
                    warnings_after += 1;
                }
            }
        }
        assert_eq!(warnings_after, 1);
    }

    #[test]
    fn bar_events_fire_on_change_only() {
        let config = oxygen_only_config(0.0, 1e9);
        let mut module = SurvivalModule::new(&config);
        let mut pack = oxygen_pack(50.0);

        // Zero consumption: the bar settles after the first readout.
        let first = module.tick(f(1.0), &mut pack, true);
        assert!(
            first
                .iter()
                .any(|e| matches!(e, SurvivalEvent::BarChanged { .. }))
        );
        for _ in 0..10 {
            let events = module.tick(f(1.0), &mut pack, true);
            assert!(
                !events
                    .iter()
                    .any(|e| matches!(e, SurvivalEvent::BarChanged { .. }))
            );
        }
    }

    #[test]
    fn dead_module_goes_silent() {
        let config = oxygen_only_config(1.0, 5.0);
        let mut module = SurvivalModule::new(&config);
        let mut pack = oxygen_pack(0.0);

        let mut deaths = 0;
        for _ in 0..50 {
            for event in module.tick(f(1.0), &mut pack, true) {
                if matches!(event, SurvivalEvent::Death { .. }) {
                    deaths += 1;
                }
            }
        }
        assert_eq!(deaths, 1);
        assert!(module.tick(f(1.0), &mut pack, true).is_empty());
    }

    #[test]
    fn movement_penalty_is_cosmetic_and_bounded() {
        let config = oxygen_only_config(1.0, 100.0);
        let mut module = SurvivalModule::new(&config);
        assert_eq!(module.movement_penalty(), Fixed64::ONE);

        let mut empty = oxygen_pack(0.0);
        for _ in 0..50 {
            let _ = module.tick(f(1.0), &mut empty, true);
        }
        let penalty = module.movement_penalty();
        assert!(penalty < Fixed64::ONE);
        assert!(penalty > Fixed64::ZERO);
        assert!(!module.is_dead());
    }

    #[test]
    fn habitat_entry_refills_pack_except_on_resume() {
        let config = SurvivalConfig::default();
        let mut module = SurvivalModule::new(&config);
        let mut pack = oxygen_pack(10.0);

        // Resume load: no refill.
        module.enter_habitat(&mut pack, true, true);
        assert_eq!(pack.amount(Matter::Oxygen), f(10.0));

        // Unpowered habitat: no refill either.
        module.enter_habitat(&mut pack, false, false);
        assert_eq!(pack.amount(Matter::Oxygen), f(10.0));

        // Powered, fresh entry: topped up to capacity.
        module.enter_habitat(&mut pack, true, false);
        assert_eq!(pack.amount(Matter::Oxygen), f(100.0));
        assert_eq!(module.context(), SupplyContext::Habitat);
    }

    #[cfg(feature = "data-loader")]
    #[test]
    fn config_loads_from_json() {
        let json = r#"{
            "oxygen": {"consumption_per_second": 1.0, "survival_limit_seconds": 150.0},
            "water": {"consumption_per_second": 0.02, "survival_limit_seconds": 86400.0},
            "food": {"consumption_per_second": 0.01, "survival_limit_seconds": 259200.0},
            "power_limit_seconds": 600.0
        }"#;
        let config = load_config_json(json).unwrap();
        assert_eq!(config.oxygen.consumption_per_second, f(1.0));
        assert_eq!(config.power_limit_seconds, f(600.0));
    }
}
