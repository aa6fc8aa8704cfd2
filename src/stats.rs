// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Simulation Core - Level Statistics

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::packet::Packet;
use crate::types::LossCause;

/// The single authoritative set of level counters. Every injection,
/// delivery and loss in the simulation is recorded here and nowhere else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelStats {
    pub injected_packets: u32,
    pub injected_units: u32,
    pub delivered_packets: u32,
    pub delivered_units: u32,
    pub lost_packets: u32,
    pub lost_units: u32,
    pub loss_by_cause: BTreeMap<LossCause, u32>,
    pub coins: u32,
    pub remaining_wire_length: f64,
}

impl LevelStats {
    pub fn with_wire_budget(budget: f64) -> Self {
        Self { remaining_wire_length: budget, ..Self::default() }
    }

    pub fn record_injection(&mut self, packet: &Packet) {
        self.injected_packets += 1;
        self.injected_units += packet.units();
    }

    pub fn record_delivery(&mut self, packet: &Packet) {
        self.delivered_packets += 1;
        self.delivered_units += packet.units();
    }

    pub fn record_loss(&mut self, packet: &Packet, cause: LossCause) {
        self.lost_packets += 1;
        self.lost_units += packet.units();
        *self.loss_by_cause.entry(cause).or_insert(0) += 1;
    }

    pub fn record_coins(&mut self, coins: u32) {
        self.coins += coins;
    }

    pub fn losses(&self, cause: LossCause) -> u32 {
        self.loss_by_cause.get(&cause).copied().unwrap_or(0)
    }

    /// Lost units as a share of injected units.
    pub fn loss_ratio(&self) -> f64 {
        if self.injected_units == 0 {
            0.0
        } else {
            self.lost_units as f64 / self.injected_units as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PacketId, PacketType, Point2D};

    #[test]
    fn test_loss_accounting() {
        let mut stats = LevelStats::with_wire_budget(500.0);
        let p = Packet::new(PacketId(1), PacketType::TriangleMessenger, Point2D::default(), 30.0);
        stats.record_injection(&p);
        stats.record_loss(&p, LossCause::OffPath);
        assert_eq!(stats.lost_units, 3);
        assert_eq!(stats.losses(LossCause::OffPath), 1);
        assert_eq!(stats.losses(LossCause::SpeedDamage), 0);
        assert!((stats.loss_ratio() - 1.0).abs() < 1e-12);
        assert_eq!(stats.remaining_wire_length, 500.0);
    }

    #[test]
    fn test_empty_ratio() {
        assert_eq!(LevelStats::default().loss_ratio(), 0.0);
    }
}
