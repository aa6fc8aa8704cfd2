// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Bench - Per-Tick Metric Trackers

use wirenet_engine::Simulation;

// ─── Wire Occupancy ─────────────────────────────────────────────────────────

/// Checks every tick that no wire carries more than one packet.
pub struct OccupancyTracker {
    pub ticks: u64,
    pub max_occupancy: usize,
    pub violations: u32,
    busy_wire_ticks: u64,
    wire_ticks: u64,
}

impl OccupancyTracker {
    pub fn new() -> Self {
        Self { ticks: 0, max_occupancy: 0, violations: 0, busy_wire_ticks: 0, wire_ticks: 0 }
    }

    pub fn record_tick(&mut self, sim: &Simulation) {
        self.ticks += 1;
        for wire in sim.network().wires() {
            let count = wire.active_packet_count();
            self.max_occupancy = self.max_occupancy.max(count);
            if count > 1 {
                self.violations += 1;
            }
            if !wire.is_destroyed() {
                self.wire_ticks += 1;
                if count > 0 {
                    self.busy_wire_ticks += 1;
                }
            }
        }
    }

    /// Share of live wire-ticks that carried a packet, in percent.
    pub fn utilization_pct(&self) -> f64 {
        if self.wire_ticks == 0 {
            return 0.0;
        }
        self.busy_wire_ticks as f64 / self.wire_ticks as f64 * 100.0
    }
}

// ─── Backlog ────────────────────────────────────────────────────────────────

/// Peak and average number of packets alive in the network.
pub struct BacklogTracker {
    pub peak: usize,
    total: u64,
    samples: u64,
}

impl BacklogTracker {
    pub fn new() -> Self {
        Self { peak: 0, total: 0, samples: 0 }
    }

    pub fn record_tick(&mut self, in_flight: usize) {
        self.peak = self.peak.max(in_flight);
        self.total += in_flight as u64;
        self.samples += 1;
    }

    pub fn mean(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.total as f64 / self.samples as f64
        }
    }
}
