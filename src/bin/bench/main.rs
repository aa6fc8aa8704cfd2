// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Bench Runner - Monte Carlo over seeded scenario levels
//
// Usage:
//   cargo run --release --bin bench                      # All scenarios, 30 runs each
//   cargo run --release --bin bench -- --runs 5          # Quick mode
//   cargo run --release --bin bench -- FAILOVER          # Filter by name, label or category
//   cargo run --release --bin bench -- --time-series     # Per-run JSONL output
//   cargo run --release --bin bench -- --seed 42         # Custom base seed
//
// Log verbosity follows RUST_LOG (default: warn).

mod metrics;
mod monte_carlo;
mod report;
mod scenarios;
mod time_series;
mod traffic;

use std::error::Error;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use report::*;
use scenarios::*;
use tracing_subscriber::EnvFilter;

/// Share of runs that must pass for a scenario to pass.
const PASS_THRESHOLD: f64 = 0.9;

// ─── CLI Parsing ────────────────────────────────────────────────────────────

struct CliArgs {
    runs: usize,
    seed: u64,
    time_series: bool,
    filter: Option<String>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut cli = CliArgs { runs: 30, seed: 0, time_series: false, filter: None };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--runs" => {
                i += 1;
                if i < args.len() {
                    cli.runs = args[i].parse().unwrap_or(30);
                }
            }
            "--seed" => {
                i += 1;
                if i < args.len() {
                    cli.seed = args[i].parse().unwrap_or(0);
                }
            }
            "--time-series" => cli.time_series = true,
            arg if !arg.starts_with('-') => cli.filter = Some(arg.to_string()),
            _ => eprintln!("Unknown argument: {}", args[i]),
        }
        i += 1;
    }

    cli
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let cli = parse_args();
    let all_scenarios = scenarios();

    let to_run: Vec<&Scenario> = match &cli.filter {
        Some(f) => {
            let f_lower = f.to_lowercase();
            all_scenarios
                .iter()
                .filter(|s| {
                    s.name.to_lowercase().contains(&f_lower)
                        || s.label.to_lowercase().contains(&f_lower)
                        || s.category.to_lowercase().contains(&f_lower)
                })
                .collect()
        }
        None => all_scenarios.iter().collect(),
    };

    if to_run.is_empty() {
        eprintln!("No scenarios match filter: {:?}", cli.filter);
        std::process::exit(1);
    }

    let ts_dir = cli.time_series.then(|| std::path::PathBuf::from("benchmark-results/time-series"));

    println!("\n  Wirenet Bench Runner v{}", env!("CARGO_PKG_VERSION"));
    println!("  PRNG: ChaCha8Rng | Runs/scenario: {} | Base seed: {}", cli.runs, cli.seed);
    println!("  Running {} scenario(s)...\n", to_run.len());
    println!(
        "  {:<32} {:>5} {:>12} {:>7} {:>7} {:>8} {:>8}",
        "Scenario", "Pass%", "Deliver%", "Loss", "Coins", "Util%", "Time"
    );
    println!("  {}", "-".repeat(88));

    let suite_start = Instant::now();
    let mut mc_reports = Vec::new();

    for scenario in &to_run {
        let report = monte_carlo::run_monte_carlo(scenario, cli.runs, cli.seed, ts_dir.as_deref());
        let status = if report.pass_rate >= PASS_THRESHOLD { "PASS" } else { "FAIL" };
        println!(
            "  {:<32} {:>4}% {:>6.1}±{:<4.1} {:>7.3} {:>7.1} {:>7.1}% {:>6.0}ms  {}",
            report.label,
            (report.pass_rate * 100.0) as u32,
            report.delivery_rate.mean,
            report.delivery_rate.half_width(),
            report.loss_ratio.mean,
            report.coins.mean,
            report.wire_utilization_pct.mean,
            report.elapsed_ms.mean,
            status,
        );
        mc_reports.push(report);
    }

    let suite_elapsed = suite_start.elapsed();

    // ─── Summary ────────────────────────────────────────────────────────

    let total = mc_reports.len();
    let passed = mc_reports.iter().filter(|r| r.pass_rate >= PASS_THRESHOLD).count();
    let failed = total - passed;

    println!("  {}", "-".repeat(88));
    println!(
        "  Total: {}  Passed: {}  Failed: {}  Suite time: {:.1}s\n",
        total,
        passed,
        failed,
        suite_elapsed.as_secs_f64()
    );

    // ─── Write JSON Report ──────────────────────────────────────────────

    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis().to_string();
    let report = BenchReport {
        timestamp: timestamp.clone(),
        version: env!("CARGO_PKG_VERSION"),
        prng: "ChaCha8Rng",
        n_runs_per_scenario: cli.runs,
        tick_seconds: monte_carlo::TICK_SECONDS,
        summary: Summary { total, passed, failed, pass_rate: passed as f64 / total as f64 },
        scenarios: mc_reports,
    };

    let dir = std::path::Path::new("benchmark-results");
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("bench-{}.json", timestamp));
    std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
    println!("  Results saved to: {}\n", path.display());

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
