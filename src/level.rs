// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Simulation Core - Level Definitions

//! Serializable level description and its conversion into a live
//! [`Network`]. Malformed entries fail closed: the entry is skipped and a
//! [`ValidationIssue`] is reported instead of aborting the load.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::network::Network;
use crate::settings::{LevelPolicy, SimulationSettings};
use crate::types::{PacketType, Point2D, PortDirection, PortRef, PortShape, SystemId, SystemKind};
use crate::wire::WireError;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default horizontal offset of ports from the system centre (px).
pub const PORT_OFFSET_X: f64 = 30.0;

/// Default vertical spacing between ports on one side (px).
pub const PORT_SPACING_Y: f64 = 20.0;

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum LevelError {
    #[error("malformed level definition: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ValidationIssue {
    #[error("duplicate system id '{id}'")]
    DuplicateSystem { id: String },

    #[error("injection {index} names unknown source system '{source_id}'")]
    UnknownInjectionSource { index: usize, source_id: String },

    #[error("wire {index} names unknown system '{system}'")]
    UnknownWireSystem { index: usize, system: String },

    #[error("wire {index} rejected: {reason}")]
    InvalidWire { index: usize, reason: WireError },

    #[error("wire {index} needs {required:.1} length but only {available:.1} remains")]
    WireBudgetExceeded { index: usize, required: f64, available: f64 },
}

// ─── Definitions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDefinition {
    pub shape: PortShape,
    /// Absolute position; laid out beside the system when absent.
    #[serde(default)]
    pub position: Option<Point2D>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemDefinition {
    pub id: String,
    #[serde(default)]
    pub kind: SystemKind,
    pub position: Point2D,
    #[serde(default)]
    pub inputs: Vec<PortDefinition>,
    #[serde(default)]
    pub outputs: Vec<PortDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortAddress {
    pub system: String,
    pub direction: PortDirection,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireDefinition {
    pub from: PortAddress,
    pub to: PortAddress,
    #[serde(default)]
    pub bends: Vec<Point2D>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectionDefinition {
    pub time: f64,
    pub packet_type: PacketType,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelDefinition {
    pub name: String,
    /// Simulated seconds before the level can complete.
    pub duration: f64,
    pub wire_length_budget: f64,
    pub policy: LevelPolicy,
    pub settings: SimulationSettings,
    pub systems: Vec<SystemDefinition>,
    pub wires: Vec<WireDefinition>,
    pub injections: Vec<InjectionDefinition>,
}

impl Default for LevelDefinition {
    fn default() -> Self {
        Self {
            name: String::from("untitled"),
            duration: 60.0,
            wire_length_budget: 10_000.0,
            policy: LevelPolicy::default(),
            settings: SimulationSettings::default(),
            systems: Vec::new(),
            wires: Vec::new(),
            injections: Vec::new(),
        }
    }
}

/// A resolved injection entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledInjection {
    pub time: f64,
    pub packet_type: PacketType,
    pub source: SystemId,
    pub executed: bool,
}

/// A level turned into live state.
#[derive(Debug, Clone)]
pub struct BuiltLevel {
    pub network: Network,
    pub injections: Vec<ScheduledInjection>,
    pub remaining_wire_length: f64,
    pub issues: Vec<ValidationIssue>,
}

impl LevelDefinition {
    pub fn new(name: impl Into<String>, duration: f64) -> Self {
        Self { name: name.into(), duration, ..Self::default() }
    }

    pub fn from_json(json: &str) -> Result<Self, LevelError> {
        Ok(serde_json::from_str(json)?)
    }

    // ─── Builder helpers ───────────────────────────────────────────────────

    pub fn with_budget(mut self, budget: f64) -> Self {
        self.wire_length_budget = budget;
        self
    }

    pub fn with_policy(mut self, policy: LevelPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_settings(mut self, settings: SimulationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn system(mut self, id: &str, kind: SystemKind, at: (f64, f64), inputs: &[PortShape], outputs: &[PortShape]) -> Self {
        let ports = |shapes: &[PortShape]| {
            shapes.iter().map(|&shape| PortDefinition { shape, position: None }).collect()
        };
        self.systems.push(SystemDefinition {
            id: id.to_string(),
            kind,
            position: Point2D::new(at.0, at.1),
            inputs: ports(inputs),
            outputs: ports(outputs),
        });
        self
    }

    /// Wire output `out_index` of `from` to input `in_index` of `to`.
    pub fn wire(self, from: &str, out_index: usize, to: &str, in_index: usize) -> Self {
        self.wire_with_bends(from, out_index, to, in_index, &[])
    }

    pub fn wire_with_bends(mut self, from: &str, out_index: usize, to: &str, in_index: usize, bends: &[(f64, f64)]) -> Self {
        self.wires.push(WireDefinition {
            from: PortAddress { system: from.to_string(), direction: PortDirection::Output, index: out_index },
            to: PortAddress { system: to.to_string(), direction: PortDirection::Input, index: in_index },
            bends: bends.iter().map(|&(x, y)| Point2D::new(x, y)).collect(),
        });
        self
    }

    pub fn inject(mut self, time: f64, packet_type: PacketType, source: &str) -> Self {
        self.injections.push(InjectionDefinition { time, packet_type, source: source.to_string() });
        self
    }

    // ─── Build ─────────────────────────────────────────────────────────────

    pub fn build(&self) -> BuiltLevel {
        let mut network = Network::new();
        let mut issues = Vec::new();
        let mut seen = HashSet::new();

        for def in &self.systems {
            if !seen.insert(def.id.as_str()) {
                issues.push(ValidationIssue::DuplicateSystem { id: def.id.clone() });
                continue;
            }
            let id = network.add_system(def.id.clone(), def.kind, def.position);
            if let Some(system) = network.system_mut(id) {
                for (direction, ports, dx) in [
                    (PortDirection::Input, &def.inputs, -PORT_OFFSET_X),
                    (PortDirection::Output, &def.outputs, PORT_OFFSET_X),
                ] {
                    let n = ports.len();
                    for (i, port) in ports.iter().enumerate() {
                        let position = port
                            .position
                            .unwrap_or_else(|| default_port_position(def.position, dx, i, n));
                        system.add_port(direction, port.shape, position);
                    }
                }
            }
        }

        let mut remaining = self.wire_length_budget;
        for (index, def) in self.wires.iter().enumerate() {
            let resolve = |addr: &PortAddress| {
                network
                    .system_by_name(&addr.system)
                    .map(|s| PortRef { system: s, direction: addr.direction, index: addr.index })
                    .ok_or_else(|| ValidationIssue::UnknownWireSystem { index, system: addr.system.clone() })
            };
            let ends = resolve(&def.from).and_then(|a| resolve(&def.to).map(|b| (a, b)));
            let (a, b) = match ends {
                Ok(ends) => ends,
                Err(issue) => {
                    issues.push(issue);
                    continue;
                }
            };
            match network.connect(a, b, &def.bends, self.settings.smooth_curves) {
                Ok(id) => {
                    let length = network.wire(id).map(|w| w.consumed_length()).unwrap_or(0.0);
                    if length > remaining {
                        network.disconnect(id);
                        network.wires.pop();
                        issues.push(ValidationIssue::WireBudgetExceeded { index, required: length, available: remaining });
                    } else {
                        remaining -= length;
                    }
                }
                Err(reason) => issues.push(ValidationIssue::InvalidWire { index, reason }),
            }
        }

        let mut injections = Vec::new();
        for (index, def) in self.injections.iter().enumerate() {
            match network.system_by_name(&def.source) {
                Some(source) => injections.push(ScheduledInjection {
                    time: def.time,
                    packet_type: def.packet_type,
                    source,
                    executed: false,
                }),
                None => issues.push(ValidationIssue::UnknownInjectionSource { index, source_id: def.source.clone() }),
            }
        }
        injections.sort_by(|a, b| a.time.total_cmp(&b.time));

        for issue in &issues {
            warn!(level = %self.name, %issue, "Level entry skipped");
        }
        info!(
            level = %self.name,
            systems = network.systems().len(),
            wires = network.wires().len(),
            injections = injections.len(),
            "Level built"
        );

        BuiltLevel { network, injections, remaining_wire_length: remaining, issues }
    }
}

fn default_port_position(center: Point2D, dx: f64, i: usize, n: usize) -> Point2D {
    let dy = (i as f64 - (n as f64 - 1.0) / 2.0) * PORT_SPACING_Y;
    Point2D::new(center.x + dx, center.y + dy)
}
