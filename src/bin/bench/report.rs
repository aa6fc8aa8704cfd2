// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Bench - Report Types

use std::collections::BTreeMap;

use serde::Serialize;
use wirenet_engine::{LevelStatus, LossCause};

// ─── Statistics (per-metric Monte Carlo aggregation) ────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub mean: f64,
    pub std_dev: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub min: f64,
    pub max: f64,
    pub n: usize,
}

impl Stats {
    pub fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self { mean: 0.0, std_dev: 0.0, ci_lower: 0.0, ci_upper: 0.0, min: 0.0, max: 0.0, n: 0 };
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let variance = if n > 1 {
            samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };
        let std_dev = variance.sqrt();
        let stderr = std_dev / (n as f64).sqrt();
        let z = 1.96; // 95% CI
        Self {
            mean,
            std_dev,
            ci_lower: mean - z * stderr,
            ci_upper: mean + z * stderr,
            min: samples.iter().cloned().fold(f64::INFINITY, f64::min),
            max: samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            n,
        }
    }

    pub fn half_width(&self) -> f64 {
        (self.ci_upper - self.ci_lower) / 2.0
    }
}

// ─── Single-Run Result ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct BenchResult {
    pub scenario: String,
    pub name: String,
    pub category: String,
    pub seed: u64,
    pub pass: bool,
    pub status: LevelStatus,
    pub scheduled: u32,
    pub injected: u32,
    pub delivered: u32,
    pub lost: u32,
    /// Delivered packets as a share of injected packets, in percent.
    pub delivery_rate: f64,
    pub loss_ratio: f64,
    pub loss_by_cause: BTreeMap<LossCause, u32>,
    pub coins: u32,
    pub failed_systems: usize,
    pub destroyed_wires: usize,
    pub max_wire_occupancy: usize,
    pub occupancy_violations: u32,
    pub wire_utilization_pct: f64,
    pub peak_backlog: usize,
    pub mean_backlog: f64,
    pub ticks: u64,
    pub sim_time: f64,
    pub elapsed_ms: u128,
    pub ticks_per_sec: f64,
}

// ─── Monte Carlo Report (per-scenario aggregation) ──────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct MonteCarloReport {
    pub scenario_name: String,
    pub label: String,
    pub category: String,
    pub n_runs: usize,
    pub pass_rate: f64,
    pub delivery_rate: Stats,
    pub loss_ratio: Stats,
    pub coins: Stats,
    pub wire_utilization_pct: Stats,
    pub peak_backlog: Stats,
    pub sim_time: Stats,
    pub elapsed_ms: Stats,
    pub ticks_per_sec: Stats,
    pub status_counts: BTreeMap<String, usize>,
    pub individual_runs: Vec<BenchResult>,
}

// ─── Top-Level Report ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct BenchReport {
    pub timestamp: String,
    pub version: &'static str,
    pub prng: &'static str,
    pub n_runs_per_scenario: usize,
    pub tick_seconds: f64,
    pub summary: Summary,
    pub scenarios: Vec<MonteCarloReport>,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_from_samples() {
        let stats = Stats::from_samples(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(stats.n, 4);
        assert!((stats.mean - 2.5).abs() < 1e-12);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert!(stats.ci_lower < stats.mean && stats.mean < stats.ci_upper);
    }

    #[test]
    fn test_stats_empty() {
        let stats = Stats::from_samples(&[]);
        assert_eq!(stats.n, 0);
        assert_eq!(stats.half_width(), 0.0);
    }
}
