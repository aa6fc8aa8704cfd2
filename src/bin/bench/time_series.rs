// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Bench - JSONL Time Series Recorder
//
// One JSON line per recorded tick for offline analysis.

use serde::Serialize;
use std::io::Write;
use wirenet_engine::simulation::TickReport;
use wirenet_engine::Simulation;

#[derive(Debug, Serialize)]
pub struct TickSnapshot {
    pub tick: u64,
    #[serde(flatten)]
    pub report: TickReport,
    pub failed_systems: usize,
    pub destroyed_wires: usize,
    pub connected: bool,
}

pub struct TimeSeriesRecorder {
    snapshots: Vec<TickSnapshot>,
    every: u64,
}

impl TimeSeriesRecorder {
    /// Keep one snapshot per `every` ticks.
    pub fn new(every: u64) -> Self {
        Self { snapshots: Vec::new(), every: every.max(1) }
    }

    pub fn record(&mut self, tick: u64, report: TickReport, sim: &Simulation) {
        if tick % self.every != 0 && !report.status.is_finished() {
            return;
        }
        let network = sim.network();
        self.snapshots.push(TickSnapshot {
            tick,
            report,
            failed_systems: network.failed_system_count(),
            destroyed_wires: network.wires().iter().filter(|w| w.is_destroyed()).count(),
            connected: sim.is_connected(),
        });
    }

    pub fn write_jsonl(&self, path: &std::path::Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(path)?;
        for snapshot in &self.snapshots {
            let line = serde_json::to_string(snapshot).map_err(std::io::Error::other)?;
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }
}
