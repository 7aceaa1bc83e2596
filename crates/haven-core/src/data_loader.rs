//! Data-driven node templates from JSON.
//!
//! Feature-gated behind `data-loader`. Colony content (solar arrays,
//! habitats, extractors) is defined in data files and instantiated into
//! validated [`Node`]s plus optional [`Converter`] specs.

use std::collections::BTreeMap;

use crate::container::{Container, EnergyContainer};
use crate::converter::{ConversionRule, Converter, HeatingRule, Intake, OverflowPolicy};
use crate::fixed::{Fixed64, f64_to_fixed64};
use crate::matter::{EnergyKind, Matter, ResourceKind};
use crate::node::{Capabilities, Node, Port};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("unknown resource kind: {0}")]
    UnknownResource(String),
    #[error("unknown capability: {0}")]
    UnknownCapability(String),
    #[error("unknown overflow policy: {0}")]
    UnknownPolicy(String),
    #[error("duplicate template name: {0}")]
    DuplicateTemplate(String),
    #[error("template {template}: negative value for {field}")]
    NegativeValue { template: String, field: String },
    #[error("template {template}: declared container has zero capacity")]
    ZeroCapacity { template: String },
}

// ---------------------------------------------------------------------------
// JSON data structures
// ---------------------------------------------------------------------------

/// Top-level template file structure for JSON deserialization.
#[derive(Debug, serde::Deserialize)]
pub struct TemplateData {
    #[serde(default)]
    pub templates: Vec<NodeTemplateData>,
}

/// JSON representation of one node template.
#[derive(Debug, serde::Deserialize)]
pub struct NodeTemplateData {
    pub name: String,
    #[serde(default)]
    pub ports: Vec<PortData>,
    #[serde(default)]
    pub containers: Vec<ContainerData>,
    #[serde(default)]
    pub energy: Vec<EnergyData>,
    #[serde(default)]
    pub converter: Option<ConverterData>,
}

/// JSON representation of a port. `kind` is `"electrical"`, `"thermal"`,
/// or a matter name such as `"oxygen"`.
#[derive(Debug, serde::Deserialize)]
pub struct PortData {
    pub kind: String,
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub output_rating: f64,
    #[serde(default)]
    pub demand: f64,
}

#[derive(Debug, serde::Deserialize)]
pub struct ContainerData {
    pub matter: String,
    pub capacity: f64,
    #[serde(default)]
    pub amount: f64,
}

#[derive(Debug, serde::Deserialize)]
pub struct EnergyData {
    pub kind: String,
    pub capacity: f64,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub target: f64,
}

#[derive(Debug, serde::Deserialize)]
pub struct ConverterData {
    #[serde(default)]
    pub intakes: Vec<IntakeData>,
    #[serde(default)]
    pub rules: Vec<RuleData>,
    #[serde(default)]
    pub heating_rate: Option<f64>,
    #[serde(default)]
    pub min_power_demand: f64,
    #[serde(default)]
    pub pump_cooldown_ticks: u64,
}

#[derive(Debug, serde::Deserialize)]
pub struct IntakeData {
    pub matter: String,
    pub rate: f64,
    /// `"discard"` or `"back_pressure"`.
    #[serde(default = "default_policy")]
    pub policy: String,
}

fn default_policy() -> String {
    "discard".to_owned()
}

#[derive(Debug, serde::Deserialize)]
pub struct RuleData {
    #[serde(default)]
    pub consumes: Vec<RateEntryData>,
    #[serde(default)]
    pub produces: Vec<RateEntryData>,
}

#[derive(Debug, serde::Deserialize)]
pub struct RateEntryData {
    pub matter: String,
    pub rate: f64,
}

// ---------------------------------------------------------------------------
// Template library
// ---------------------------------------------------------------------------

/// A validated node template ready for instantiation.
#[derive(Debug, Clone)]
pub struct NodeTemplate {
    node: Node,
    converter: Option<Converter>,
}

impl NodeTemplate {
    /// Stamp out a fresh node (and converter spec) from this template.
    pub fn instantiate(&self) -> (Node, Option<Converter>) {
        (self.node.clone(), self.converter.clone())
    }
}

/// Named templates loaded from data files.
#[derive(Debug, Default)]
pub struct TemplateLibrary {
    templates: BTreeMap<String, NodeTemplate>,
}

impl TemplateLibrary {
    pub fn get(&self, name: &str) -> Option<&NodeTemplate> {
        self.templates.get(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Loading functions
// ---------------------------------------------------------------------------

/// Load a template library from a JSON string.
pub fn load_templates_json(json: &str) -> Result<TemplateLibrary, DataLoadError> {
    let data: TemplateData = serde_json::from_str(json)?;
    build_library(data)
}

/// Load a template library from JSON bytes.
pub fn load_templates_json_bytes(bytes: &[u8]) -> Result<TemplateLibrary, DataLoadError> {
    let data: TemplateData = serde_json::from_slice(bytes)?;
    build_library(data)
}

fn parse_kind(name: &str) -> Result<ResourceKind, DataLoadError> {
    match name {
        "electrical" => Ok(ResourceKind::Energy(EnergyKind::Electrical)),
        "thermal" => Ok(ResourceKind::Energy(EnergyKind::Thermal)),
        other => parse_matter(other).map(ResourceKind::Matter),
    }
}

fn parse_matter(name: &str) -> Result<Matter, DataLoadError> {
    Matter::from_name(name).ok_or_else(|| DataLoadError::UnknownResource(name.to_owned()))
}

fn parse_capabilities(names: &[String]) -> Result<Capabilities, DataLoadError> {
    let mut caps = Capabilities::default();
    for name in names {
        caps = match name.as_str() {
            "source" => caps.and(Capabilities::SOURCE),
            "sink" => caps.and(Capabilities::SINK),
            "battery" => caps.and(Capabilities::BATTERY),
            "pumpable" => caps.and(Capabilities::PUMPABLE),
            other => return Err(DataLoadError::UnknownCapability(other.to_owned())),
        };
    }
    Ok(caps)
}

fn parse_policy(name: &str) -> Result<OverflowPolicy, DataLoadError> {
    match name {
        "discard" => Ok(OverflowPolicy::Discard),
        "back_pressure" => Ok(OverflowPolicy::BackPressure),
        other => Err(DataLoadError::UnknownPolicy(other.to_owned())),
    }
}

fn non_negative(template: &str, field: &str, v: f64) -> Result<Fixed64, DataLoadError> {
    if v < 0.0 {
        return Err(DataLoadError::NegativeValue {
            template: template.to_owned(),
            field: field.to_owned(),
        });
    }
    Ok(f64_to_fixed64(v))
}

// A template that declares a container gets a usable one. Zero-capacity
// buffers are legal at runtime but meaningless in a definition file.
fn positive_capacity(template: &str, v: f64) -> Result<Fixed64, DataLoadError> {
    let capacity = non_negative(template, "capacity", v)?;
    if capacity == Fixed64::ZERO {
        return Err(DataLoadError::ZeroCapacity {
            template: template.to_owned(),
        });
    }
    Ok(capacity)
}

fn build_template(data: &NodeTemplateData) -> Result<NodeTemplate, DataLoadError> {
    let mut node = Node::new();
    for port in &data.ports {
        let kind = parse_kind(&port.kind)?;
        node = node.with_port(
            kind,
            Port {
                capabilities: parse_capabilities(&port.capabilities)?,
                output_rating: non_negative(&data.name, "output_rating", port.output_rating)?,
                demand: non_negative(&data.name, "demand", port.demand)?,
            },
        );
    }
    for c in &data.containers {
        let matter = parse_matter(&c.matter)?;
        let capacity = positive_capacity(&data.name, c.capacity)?;
        let amount = non_negative(&data.name, "amount", c.amount)?;
        node.containers
            .insert(matter, Container::with_amount(matter, capacity, amount));
    }
    for e in &data.energy {
        let kind = match parse_kind(&e.kind)? {
            ResourceKind::Energy(k) => k,
            ResourceKind::Matter(_) => {
                return Err(DataLoadError::UnknownResource(e.kind.clone()));
            }
        };
        let capacity = positive_capacity(&data.name, e.capacity)?;
        let amount = non_negative(&data.name, "amount", e.amount)?;
        let mut container = EnergyContainer::with_amount(kind, capacity, amount);
        container.target = non_negative(&data.name, "target", e.target)?;
        node.energy.insert(kind, container);
    }

    let converter = match &data.converter {
        Some(cd) => {
            let mut converter = Converter {
                min_power_demand: non_negative(&data.name, "min_power_demand", cd.min_power_demand)?,
                pump_cooldown_ticks: cd.pump_cooldown_ticks,
                ..Converter::default()
            };
            for intake in &cd.intakes {
                converter.intakes.push(Intake {
                    matter: parse_matter(&intake.matter)?,
                    rate_per_second: non_negative(&data.name, "rate", intake.rate)?,
                    policy: parse_policy(&intake.policy)?,
                });
            }
            for rule in &cd.rules {
                let mut parsed = ConversionRule {
                    consumes: Vec::new(),
                    produces: Vec::new(),
                };
                for entry in &rule.consumes {
                    parsed.consumes.push((
                        parse_matter(&entry.matter)?,
                        non_negative(&data.name, "rate", entry.rate)?,
                    ));
                }
                for entry in &rule.produces {
                    parsed.produces.push((
                        parse_matter(&entry.matter)?,
                        non_negative(&data.name, "rate", entry.rate)?,
                    ));
                }
                converter.rules.push(parsed);
            }
            if let Some(rate) = cd.heating_rate {
                converter.heating = Some(HeatingRule {
                    rate_per_second: non_negative(&data.name, "heating_rate", rate)?,
                });
            }
            Some(converter)
        }
        None => None,
    };

    Ok(NodeTemplate { node, converter })
}

fn build_library(data: TemplateData) -> Result<TemplateLibrary, DataLoadError> {
    let mut library = TemplateLibrary::default();
    for template in &data.templates {
        if library.templates.contains_key(&template.name) {
            return Err(DataLoadError::DuplicateTemplate(template.name.clone()));
        }
        let built = build_template(template)?;
        library.templates.insert(template.name.clone(), built);
    }
    Ok(library)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::f64_to_fixed64 as f;

    const COLONY_JSON: &str = r#"{
        "templates": [
            {
                "name": "solar_array",
                "ports": [
                    {"kind": "electrical", "capabilities": ["source"], "output_rating": 500.0}
                ]
            },
            {
                "name": "oxygen_tank",
                "ports": [
                    {"kind": "oxygen", "capabilities": ["sink", "pumpable"]}
                ],
                "containers": [
                    {"matter": "oxygen", "capacity": 100.0, "amount": 40.0}
                ]
            },
            {
                "name": "heated_habitat",
                "ports": [
                    {"kind": "electrical", "capabilities": ["sink"], "demand": 300.0},
                    {"kind": "oxygen", "capabilities": ["pumpable"]}
                ],
                "containers": [
                    {"matter": "oxygen", "capacity": 100.0}
                ],
                "energy": [
                    {"kind": "thermal", "capacity": 400.0, "amount": 280.0, "target": 293.0}
                ],
                "converter": {
                    "intakes": [
                        {"matter": "oxygen", "rate": 2.0, "policy": "back_pressure"}
                    ],
                    "heating_rate": 5.0,
                    "min_power_demand": 300.0
                }
            }
        ]
    }"#;

    #[test]
    fn loads_and_instantiates_templates() {
        let library = load_templates_json(COLONY_JSON).unwrap();
        assert_eq!(library.len(), 3);

        let (solar, converter) = library.get("solar_array").unwrap().instantiate();
        assert!(converter.is_none());
        let port = solar
            .ports
            .get(&ResourceKind::Energy(EnergyKind::Electrical))
            .unwrap();
        assert!(port.capabilities.source);
        assert_eq!(port.output_rating, f(500.0));

        let (tank, _) = library.get("oxygen_tank").unwrap().instantiate();
        assert_eq!(tank.containers[&Matter::Oxygen].amount(), f(40.0));
    }

    #[test]
    fn converter_spec_round_trips() {
        let library = load_templates_json(COLONY_JSON).unwrap();
        let (habitat, converter) = library.get("heated_habitat").unwrap().instantiate();
        let converter = converter.unwrap();

        assert_eq!(converter.min_power_demand, f(300.0));
        assert_eq!(converter.intakes.len(), 1);
        assert_eq!(converter.intakes[0].matter, Matter::Oxygen);
        assert_eq!(converter.intakes[0].policy, OverflowPolicy::BackPressure);
        assert_eq!(converter.heating.unwrap().rate_per_second, f(5.0));
        assert_eq!(habitat.energy[&EnergyKind::Thermal].target, f(293.0));
    }

    #[test]
    fn unknown_resource_is_rejected() {
        let json = r#"{"templates": [{"name": "x", "ports": [
            {"kind": "plasma", "capabilities": ["source"]}
        ]}]}"#;
        assert!(matches!(
            load_templates_json(json),
            Err(DataLoadError::UnknownResource(name)) if name == "plasma"
        ));
    }

    #[test]
    fn unknown_capability_is_rejected() {
        let json = r#"{"templates": [{"name": "x", "ports": [
            {"kind": "oxygen", "capabilities": ["teleport"]}
        ]}]}"#;
        assert!(matches!(
            load_templates_json(json),
            Err(DataLoadError::UnknownCapability(name)) if name == "teleport"
        ));
    }

    #[test]
    fn duplicate_template_is_rejected() {
        let json = r#"{"templates": [
            {"name": "x"},
            {"name": "x"}
        ]}"#;
        assert!(matches!(
            load_templates_json(json),
            Err(DataLoadError::DuplicateTemplate(name)) if name == "x"
        ));
    }

    #[test]
    fn negative_values_are_rejected() {
        let json = r#"{"templates": [{"name": "x", "containers": [
            {"matter": "water", "capacity": -1.0}
        ]}]}"#;
        assert!(matches!(
            load_templates_json(json),
            Err(DataLoadError::NegativeValue { .. })
        ));
    }

    #[test]
    fn zero_capacity_containers_are_rejected() {
        let json = r#"{"templates": [{"name": "x", "containers": [
            {"matter": "water", "capacity": 0.0}
        ]}]}"#;
        assert!(matches!(
            load_templates_json(json),
            Err(DataLoadError::ZeroCapacity { .. })
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            load_templates_json("{not json"),
            Err(DataLoadError::JsonParse(_))
        ));
    }
}
