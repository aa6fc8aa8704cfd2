// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Bench - Monte Carlo Runner
//
// Each scenario runs N times with seeds base..base+N. The seed drives both
// the traffic schedule and the simulation's own random source.

use std::collections::BTreeMap;
use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};
use wirenet_engine::{LevelStatus, Simulation};

use crate::metrics::{BacklogTracker, OccupancyTracker};
use crate::report::*;
use crate::scenarios::Scenario;
use crate::time_series::TimeSeriesRecorder;
use crate::traffic::TrafficGenerator;

/// Fixed tick length for every run.
pub const TICK_SECONDS: f64 = 1.0 / 60.0;

/// Simulated seconds allowed past duration and grace before a run is cut.
const OVERRUN_SECONDS: f64 = 5.0;

/// Offset that keeps the traffic stream independent of the engine's stream.
const TRAFFIC_SEED_SALT: u64 = 0x5eed_7a4f_f1c0;

pub fn run_single(scenario: &Scenario, seed: u64, time_series_dir: Option<&std::path::Path>) -> BenchResult {
    let start = Instant::now();

    let mut traffic = TrafficGenerator::new(
        ChaCha8Rng::seed_from_u64(seed ^ TRAFFIC_SEED_SALT),
        scenario.sources,
        scenario.mix,
    );
    let mut level = (scenario.level)();
    for arrival in traffic.schedule(scenario.lambda, scenario.injection_window) {
        level = level.inject(arrival.time, arrival.packet_type, arrival.source);
    }
    let mut sim = Simulation::from_level(&level, seed);
    for issue in sim.validation_issues() {
        warn!(scenario = scenario.name, ?issue, "Scenario level has a validation issue");
    }

    let failures: Vec<(f64, Option<wirenet_engine::SystemId>)> = scenario
        .failures
        .iter()
        .map(|&(time, name)| (time, sim.network().system_by_name(name)))
        .collect();
    let mut next_failure = 0;

    let mut occupancy = OccupancyTracker::new();
    let mut backlog = BacklogTracker::new();
    let mut time_series = time_series_dir.map(|_| TimeSeriesRecorder::new(15));

    let horizon = sim.duration() + sim.policy().completion_grace + OVERRUN_SECONDS;
    let max_ticks = (horizon / TICK_SECONDS).ceil() as u64;
    let mut ticks = 0;
    while ticks < max_ticks && !sim.status().is_finished() {
        while let Some(&(time, system)) = failures.get(next_failure) {
            if time > sim.current_time() {
                break;
            }
            if let Some(system) = system {
                sim.fail_system(system);
            }
            next_failure += 1;
        }

        let report = sim.tick(TICK_SECONDS);
        ticks += 1;
        occupancy.record_tick(&sim);
        backlog.record_tick(report.in_flight);
        if let Some(ts) = time_series.as_mut() {
            ts.record(ticks, report, &sim);
        }
    }

    if let (Some(ts), Some(dir)) = (&time_series, time_series_dir) {
        let path = dir.join(format!("seed-{}.jsonl", seed));
        if let Err(e) = ts.write_jsonl(&path) {
            warn!(path = %path.display(), error = %e, "Failed to write time series");
        }
    }

    let elapsed = start.elapsed();
    let stats = sim.stats();
    let status = sim.status();
    let delivery_rate = if stats.injected_packets > 0 {
        stats.delivered_packets as f64 / stats.injected_packets as f64 * 100.0
    } else {
        0.0
    };

    let criteria = &scenario.criteria;
    let mut pass = true;
    if let Some(max) = criteria.max_loss_ratio {
        pass &= stats.loss_ratio() <= max;
    }
    if let Some(min) = criteria.min_delivery_rate {
        pass &= delivery_rate >= min;
    }
    if let Some(expected) = criteria.expected_status {
        pass &= status == expected;
    }
    if criteria.require_single_occupancy {
        pass &= occupancy.violations == 0;
    }
    debug!(scenario = scenario.name, seed, pass, ?status, ticks, "Run finished");

    BenchResult {
        scenario: scenario.label.to_string(),
        name: scenario.name.to_string(),
        category: scenario.category.to_string(),
        seed,
        pass,
        status,
        scheduled: traffic.arrival_count,
        injected: stats.injected_packets,
        delivered: stats.delivered_packets,
        lost: stats.lost_packets,
        delivery_rate,
        loss_ratio: stats.loss_ratio(),
        loss_by_cause: stats.loss_by_cause.clone(),
        coins: stats.coins,
        failed_systems: sim.network().failed_system_count(),
        destroyed_wires: sim.network().wires().iter().filter(|w| w.is_destroyed()).count(),
        max_wire_occupancy: occupancy.max_occupancy,
        occupancy_violations: occupancy.violations,
        wire_utilization_pct: occupancy.utilization_pct(),
        peak_backlog: backlog.peak,
        mean_backlog: backlog.mean(),
        ticks,
        sim_time: sim.current_time(),
        elapsed_ms: elapsed.as_millis(),
        ticks_per_sec: ticks as f64 / elapsed.as_secs_f64().max(0.001),
    }
}

pub fn run_monte_carlo(
    scenario: &Scenario,
    n_runs: usize,
    base_seed: u64,
    time_series_base: Option<&std::path::Path>,
) -> MonteCarloReport {
    let ts_dir = time_series_base.map(|base| base.join(scenario.name.to_lowercase()));
    let results = (0..n_runs)
        .map(|i| run_single(scenario, base_seed + i as u64, ts_dir.as_deref()))
        .collect();
    aggregate(scenario, results)
}

fn status_key(status: LevelStatus) -> String {
    match status {
        LevelStatus::Running => "running".to_string(),
        LevelStatus::Completed => "completed".to_string(),
        LevelStatus::GameOver { reason } => format!("game_over:{:?}", reason).to_lowercase(),
    }
}

fn aggregate(scenario: &Scenario, results: Vec<BenchResult>) -> MonteCarloReport {
    let n = results.len();
    let passed = results.iter().filter(|r| r.pass).count();
    let metric = |f: fn(&BenchResult) -> f64| Stats::from_samples(&results.iter().map(f).collect::<Vec<_>>());

    let mut status_counts = BTreeMap::new();
    for r in &results {
        *status_counts.entry(status_key(r.status)).or_insert(0) += 1;
    }

    MonteCarloReport {
        scenario_name: scenario.name.to_string(),
        label: scenario.label.to_string(),
        category: scenario.category.to_string(),
        n_runs: n,
        pass_rate: if n == 0 { 0.0 } else { passed as f64 / n as f64 },
        delivery_rate: metric(|r| r.delivery_rate),
        loss_ratio: metric(|r| r.loss_ratio),
        coins: metric(|r| r.coins as f64),
        wire_utilization_pct: metric(|r| r.wire_utilization_pct),
        peak_backlog: metric(|r| r.peak_backlog as f64),
        sim_time: metric(|r| r.sim_time),
        elapsed_ms: metric(|r| r.elapsed_ms as f64),
        ticks_per_sec: metric(|r| r.ticks_per_sec),
        status_counts,
        individual_runs: results,
    }
}
