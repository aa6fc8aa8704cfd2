// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Simulation Core - Settings and Level Policy

use serde::{Deserialize, Serialize};

/// Tunables shared by every level. Missing JSON fields take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Deviation from the wire path beyond which a packet is lost (px).
    pub off_wire_loss_threshold: f64,
    /// Share of failed systems that ends the level.
    pub failed_systems_ratio: f64,
    /// Share of injected units lost that ends the level.
    pub packet_loss_ratio: f64,
    pub smooth_curves: bool,
    pub collisions: bool,
    /// Arrival speed above which a system takes damage (px/s).
    pub speed_damage_threshold: f64,
    /// Seconds a packet may spend on one wire.
    pub max_travel_time: f64,
    /// Simulated seconds between timeline snapshots.
    pub timeline_interval: f64,
    /// Fixed step used when replaying after a rewind (s).
    pub replay_step: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            off_wire_loss_threshold: 20.0,
            failed_systems_ratio: 0.5,
            packet_loss_ratio: 0.5,
            smooth_curves: true,
            collisions: true,
            speed_damage_threshold: 150.0,
            max_travel_time: 30.0,
            timeline_interval: 0.25,
            replay_step: 1.0 / 60.0,
        }
    }
}

/// Per-level behaviour switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelPolicy {
    /// Also accept a source/destination path over the undirected graph.
    pub lenient_connectivity: bool,
    pub speed_damage: bool,
    /// Seconds after the duration before in-flight packets stop blocking
    /// completion.
    pub completion_grace: f64,
}

impl Default for LevelPolicy {
    fn default() -> Self {
        Self {
            lenient_connectivity: false,
            speed_damage: true,
            completion_grace: 10.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let s: SimulationSettings = serde_json::from_str(r#"{"collisions": false}"#).unwrap();
        assert!(!s.collisions);
        assert_eq!(s.off_wire_loss_threshold, 20.0);
        assert_eq!(s.speed_damage_threshold, 150.0);

        let p: LevelPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(p, LevelPolicy::default());
    }
}
