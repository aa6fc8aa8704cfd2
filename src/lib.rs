// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Simulation Core

pub mod types;
pub mod geometry;
pub mod packet;
pub mod port;
pub mod wire;
pub mod system;
pub mod network;
pub mod routing;
pub mod connectivity;
pub mod temporal;
pub mod level;
pub mod settings;
pub mod stats;
pub mod simulation;

pub use types::*;
pub use level::{LevelDefinition, LevelError, ValidationIssue};
pub use routing::Disposition;
pub use simulation::{GameOverReason, LevelStatus, Simulation};

use wasm_bindgen::prelude::*;

// ─── WASM Interface ──────────────────────────────────────────────────────────

fn to_js<T: serde::Serialize>(value: &T) -> JsValue {
    serde_wasm_bindgen::to_value(value).unwrap_or(JsValue::NULL)
}

#[wasm_bindgen]
impl Simulation {
    /// Build a simulation from a JSON level definition.
    #[wasm_bindgen(constructor)]
    pub fn from_json(level_json: &str, seed: u64) -> Result<Simulation, JsValue> {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        let level = LevelDefinition::from_json(level_json).map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(Simulation::from_level(&level, seed))
    }

    /// Advance by `dt` seconds and return the tick report.
    #[wasm_bindgen(js_name = tick)]
    pub fn tick_js(&mut self, dt: f64) -> JsValue {
        let report = self.tick(dt);
        to_js(&report)
    }

    /// Run `steps` fixed ticks without returning intermediate reports.
    pub fn run_batch(&mut self, steps: u32, dt: f64) {
        for _ in 0..steps {
            self.tick(dt);
        }
    }

    pub fn get_stats(&self) -> JsValue {
        to_js(&self.stats)
    }

    pub fn get_status(&self) -> JsValue {
        to_js(&self.status)
    }

    pub fn get_systems(&self) -> JsValue {
        to_js(&self.system_summaries())
    }

    pub fn get_wires(&self) -> JsValue {
        to_js(&self.wire_summaries())
    }

    pub fn get_issues(&self) -> JsValue {
        to_js(&self.issues)
    }

    pub fn get_connectivity(&self) -> JsValue {
        to_js(&self.connectivity())
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn pause(&mut self) {
        self.set_paused(true);
    }

    pub fn resume(&mut self) {
        self.set_paused(false);
    }

    pub fn rewind(&mut self, time: f64) -> bool {
        self.rewind_to(time)
    }

    pub fn fail(&mut self, system: u32) -> bool {
        self.fail_system(SystemId(system))
    }

    pub fn set_smooth(&mut self, smooth: bool) {
        self.set_smooth_curves(smooth);
    }

    /// Returns the length charged against the wire budget.
    #[wasm_bindgen(js_name = addBend)]
    pub fn add_bend_js(&mut self, wire: u32, x: f64, y: f64) -> Result<f64, JsValue> {
        self.add_bend(WireId(wire), Point2D::new(x, y))
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = moveBend)]
    pub fn move_bend_js(&mut self, wire: u32, index: usize, x: f64, y: f64) -> Result<f64, JsValue> {
        self.move_bend(WireId(wire), index, Point2D::new(x, y))
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = removeBend)]
    pub fn remove_bend_js(&mut self, wire: u32, index: usize) -> Result<f64, JsValue> {
        self.remove_bend(WireId(wire), index)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }
}
