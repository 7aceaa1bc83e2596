//! Headless colony integration tests.
//!
//! Drives a small colony (solar array, battery bank, habitat, tanks)
//! through full day/night cycles with no UI attached and checks the grid
//! status state machine, transition-only eventing, connectivity symmetry,
//! and matter conservation across the whole engine pipeline.

use haven_core::engine::{Engine, TickStrategy};
use haven_core::event::Event;
use haven_core::fixed::Fixed64;
use haven_core::grid::GridStatus;
use haven_core::matter::{EnergyKind, Matter};
use haven_core::node::{Node, Port};
use haven_core::test_utils::*;

fn day(engine: &mut Engine) {
    engine.environment.solar_output_factor = Fixed64::ONE;
}

fn night(engine: &mut Engine) {
    engine.environment.solar_output_factor = Fixed64::ZERO;
}

/// Solar 400 W, habitat drawing 300 W, 600 Wh battery starting empty.
fn power_colony() -> (Engine, haven_core::id::NodeId, haven_core::id::NodeId) {
    let mut engine = Engine::new(TickStrategy::PerFrame);
    let solar = engine.manager.add_node(solar_array(400.0));
    let bank = engine.manager.add_node(battery_bank(600.0, 0.0));
    let habitat = engine
        .manager
        .add_node(Node::new().with_port(electrical(), Port::sink(fixed(300.0))));
    engine
        .manager
        .attach(solar, bank, electrical(), &mut engine.event_bus, 0)
        .unwrap();
    engine
        .manager
        .attach(bank, habitat, electrical(), &mut engine.event_bus, 0)
        .unwrap();
    (engine, bank, habitat)
}

#[test]
fn day_night_cycle_walks_the_status_machine() {
    let (mut engine, bank, habitat) = power_colony();
    let net = engine.manager.network_of(habitat, electrical()).unwrap();
    let mut transitions = Vec::new();

    let mut advance = |engine: &mut Engine, ticks: u32, transitions: &mut Vec<GridStatus>| {
        for _ in 0..ticks {
            for event in engine.advance(fixed(1.0)).events {
                if let Event::GridStatusChanged { to, .. } = event {
                    transitions.push(to);
                }
            }
        }
    };

    // Daylight: 100 W surplus charges the bank to full over 6 ticks.
    day(&mut engine);
    advance(&mut engine, 8, &mut transitions);
    assert_eq!(engine.manager.status(net), Some(GridStatus::Surplus));
    assert_eq!(
        engine.manager.nodes[bank].energy[&EnergyKind::Electrical].amount(),
        fixed(600.0)
    );

    // Night: the 300 W load drains the bank, then the grid goes dark.
    night(&mut engine);
    advance(&mut engine, 2, &mut transitions);
    assert_eq!(engine.manager.status(net), Some(GridStatus::DrawingBattery));
    assert_eq!(
        engine.manager.nodes[bank].energy[&EnergyKind::Electrical].amount(),
        fixed(0.0)
    );
    advance(&mut engine, 1, &mut transitions);
    assert_eq!(engine.manager.status(net), Some(GridStatus::Blackout));

    // Dawn: straight back to surplus.
    day(&mut engine);
    advance(&mut engine, 1, &mut transitions);
    assert_eq!(engine.manager.status(net), Some(GridStatus::Surplus));

    // One event per transition, nothing per steady-state tick.
    assert_eq!(
        transitions,
        vec![
            GridStatus::Surplus,
            GridStatus::DrawingBattery,
            GridStatus::Blackout,
            GridStatus::Surplus,
        ]
    );
}

#[test]
fn storage_boundary_events_fire_once_per_episode() {
    let (mut engine, _, _) = power_colony();

    day(&mut engine);
    let mut full_events = 0;
    for _ in 0..10 {
        for event in engine.advance(fixed(1.0)).events {
            if matches!(event, Event::StorageFull { .. }) {
                full_events += 1;
            }
        }
    }
    assert_eq!(full_events, 1);

    night(&mut engine);
    let mut empty_events = 0;
    for _ in 0..10 {
        for event in engine.advance(fixed(1.0)).events {
            if matches!(event, Event::StorageEmpty { .. }) {
                empty_events += 1;
            }
        }
    }
    assert_eq!(empty_events, 1);
}

#[test]
fn detach_restores_independent_network_totals() {
    let mut engine = Engine::new(TickStrategy::PerFrame);
    let source = engine.manager.add_node(solar_array(500.0));
    let sink = engine
        .manager
        .add_node(Node::new().with_port(electrical(), Port::sink(fixed(300.0))));
    let edge = engine
        .manager
        .attach(source, sink, electrical(), &mut engine.event_bus, 0)
        .unwrap();

    let _ = engine.advance(fixed(1.0));
    let joined = engine.manager.network_of(source, electrical()).unwrap();
    assert_eq!(
        engine.manager.network_of(sink, electrical()),
        Some(joined)
    );
    let agg = engine.manager.aggregates(joined).unwrap();
    assert_eq!(agg.rated_capacity, fixed(500.0));
    assert_eq!(agg.load, fixed(300.0));

    engine.manager.detach(edge, &mut engine.event_bus, 1).unwrap();
    let _ = engine.advance(fixed(1.0));

    let source_net = engine.manager.network_of(source, electrical()).unwrap();
    let sink_net = engine.manager.network_of(sink, electrical()).unwrap();
    assert_ne!(source_net, sink_net);
    let source_agg = engine.manager.aggregates(source_net).unwrap();
    assert_eq!(source_agg.rated_capacity, fixed(500.0));
    assert_eq!(source_agg.load, fixed(0.0));
    let sink_agg = engine.manager.aggregates(sink_net).unwrap();
    assert_eq!(sink_agg.rated_capacity, fixed(0.0));
    assert_eq!(sink_agg.load, fixed(300.0));
}

#[test]
fn oxygen_chain_conserves_matter_through_the_habitat() {
    let mut engine = Engine::new(TickStrategy::fixed_default());
    let hab = engine.manager.add_node(habitat(300.0));
    let tank_a = engine.manager.add_node(tank(Matter::Oxygen, 80.0, 60.0));
    let tank_b = engine.manager.add_node(tank(Matter::Oxygen, 80.0, 20.0));
    engine
        .manager
        .attach(hab, tank_a, matter(Matter::Oxygen), &mut engine.event_bus, 0)
        .unwrap();
    engine
        .manager
        .attach(hab, tank_b, matter(Matter::Oxygen), &mut engine.event_bus, 0)
        .unwrap();
    engine.converters.add_converter(
        hab,
        intake_converter(
            Matter::Oxygen,
            1.5,
            haven_core::converter::OverflowPolicy::BackPressure,
        ),
    );

    let total = |engine: &Engine| {
        engine
            .manager
            .nodes
            .values()
            .filter_map(|n| n.containers.get(&Matter::Oxygen))
            .map(|c| c.amount())
            .fold(Fixed64::ZERO, |a, b| a + b)
    };
    let before = total(&engine);

    for _ in 0..120 {
        let _ = engine.advance(fixed(0.25));
    }
    assert_eq!(total(&engine), before);

    // First-attached tank drains first.
    let a = engine.manager.nodes[tank_a].containers[&Matter::Oxygen].amount();
    let b = engine.manager.nodes[tank_b].containers[&Matter::Oxygen].amount();
    assert!(a < fixed(60.0));
    assert_eq!(b, fixed(20.0));
}

#[test]
fn invalid_connection_leaves_no_trace_and_prompts() {
    let mut engine = Engine::new(TickStrategy::PerFrame);
    let solar = engine.manager.add_node(solar_array(400.0));
    let water_tank = engine.manager.add_node(tank(Matter::Water, 50.0, 10.0));

    // A power line cannot terminate at a node with no electrical port.
    let result = engine.manager.attach(
        solar,
        water_tank,
        electrical(),
        &mut engine.event_bus,
        0,
    );
    assert!(result.is_err());
    assert_eq!(engine.manager.edges.len(), 0);

    let events = engine.advance(fixed(1.0)).events;
    assert!(
        events
            .iter()
            .any(|e| matches!(e, Event::InvalidConnection { .. }))
    );
}

#[test]
fn template_loaded_nodes_run_through_the_pipeline() {
    let json = r#"{
        "templates": [
            {
                "name": "solar_array",
                "ports": [
                    {"kind": "electrical", "capabilities": ["source"], "output_rating": 400.0}
                ]
            },
            {
                "name": "heated_cabin",
                "ports": [
                    {"kind": "electrical", "capabilities": ["sink"], "demand": 200.0}
                ],
                "energy": [
                    {"kind": "thermal", "capacity": 400.0, "amount": 270.0, "target": 293.0}
                ],
                "converter": {"heating_rate": 4.0, "min_power_demand": 200.0}
            }
        ]
    }"#;
    let library = haven_core::data_loader::load_templates_json(json).unwrap();

    let mut engine = Engine::new(TickStrategy::PerFrame);
    let (solar_node, _) = library.get("solar_array").unwrap().instantiate();
    let (cabin_node, cabin_converter) = library.get("heated_cabin").unwrap().instantiate();
    let solar = engine.manager.add_node(solar_node);
    let cabin = engine.manager.add_node(cabin_node);
    engine
        .manager
        .attach(solar, cabin, electrical(), &mut engine.event_bus, 0)
        .unwrap();
    engine
        .converters
        .add_converter(cabin, cabin_converter.unwrap());

    for _ in 0..5 {
        let _ = engine.advance(fixed(1.0));
    }
    // Powered cabin warms toward its 293 target at 4/s.
    assert_eq!(
        engine.manager.nodes[cabin].energy[&EnergyKind::Thermal].amount(),
        fixed(290.0)
    );
}
