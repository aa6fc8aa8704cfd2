// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Bench - Poisson Traffic Generator
//
// Turns a scenario's traffic profile into a concrete injection schedule.
// Arrivals per one-second slot are Poisson distributed; arrival times inside
// a slot are uniform.

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use wirenet_engine::PacketType;

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledArrival {
    pub time: f64,
    pub packet_type: PacketType,
    pub source: &'static str,
}

pub struct TrafficGenerator {
    rng: ChaCha8Rng,
    sources: Vec<&'static str>,
    mix: Vec<(PacketType, f64)>,
    pub arrival_count: u32,
}

impl TrafficGenerator {
    pub fn new(rng: ChaCha8Rng, sources: &[&'static str], mix: &[(PacketType, f64)]) -> Self {
        Self { rng, sources: sources.to_vec(), mix: mix.to_vec(), arrival_count: 0 }
    }

    /// Arrivals over `[0, window)` at `lambda` packets per second, sorted by
    /// time.
    pub fn schedule(&mut self, lambda: f64, window: f64) -> Vec<ScheduledArrival> {
        if self.sources.is_empty() || self.mix.is_empty() || lambda <= 0.0 || window <= 0.0 {
            return Vec::new();
        }
        let mut arrivals = Vec::new();
        let slots = window.ceil() as u32;
        for slot in 0..slots {
            let start = slot as f64;
            let width = (window - start).min(1.0);
            let count = poisson_sample(&mut self.rng, lambda * width);
            for _ in 0..count {
                let time = start + self.rng.gen_range(0.0..width);
                let Some(&source) = self.sources.choose(&mut self.rng) else { continue };
                let packet_type = self.pick_type();
                arrivals.push(ScheduledArrival { time, packet_type, source });
            }
        }
        arrivals.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.arrival_count += arrivals.len() as u32;
        arrivals
    }

    fn pick_type(&mut self) -> PacketType {
        let total: f64 = self.mix.iter().map(|(_, w)| w).sum();
        let mut r = self.rng.gen_range(0.0..total.max(f64::MIN_POSITIVE));
        for &(packet_type, weight) in &self.mix {
            if r < weight {
                return packet_type;
            }
            r -= weight;
        }
        self.mix[self.mix.len() - 1].0
    }
}

/// Poisson sampling via Knuth's method below λ = 30, normal approximation
/// above.
fn poisson_sample(rng: &mut ChaCha8Rng, lambda: f64) -> u32 {
    if lambda <= 0.0 {
        return 0;
    }
    if lambda < 30.0 {
        let l = (-lambda).exp();
        let mut k: u32 = 0;
        let mut p: f64 = 1.0;
        loop {
            k += 1;
            p *= rng.gen::<f64>();
            if p <= l {
                return k - 1;
            }
        }
    } else {
        let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
        let u2: f64 = rng.gen();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        (lambda + lambda.sqrt() * z).round().max(0.0) as u32
    }
}
