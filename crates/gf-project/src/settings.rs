//! Run-settings snapshot.
//!
//! Dumped at run start next to the results and read back by downstream
//! analysis tooling; the engine itself only needs the start time, step
//! resolution, and horizon.

use serde::{Deserialize, Serialize};

use crate::schema::{ScenarioDef, SimulationModeDef};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSettings {
    pub scenario_id: String,
    pub scenario_name: String,
    pub mode: SimulationModeDef,
    pub start_time: String,
    pub step_resolution_s: f64,
    pub horizon_steps: usize,
    pub error_tolerance: f64,
    pub max_control_iterations: usize,
    pub cosim_enabled: bool,
}

impl RunSettings {
    pub fn from_scenario(scenario: &ScenarioDef) -> Self {
        Self {
            scenario_id: scenario.id.clone(),
            scenario_name: scenario.name.clone(),
            mode: scenario.simulation.mode,
            start_time: scenario.simulation.start_time.clone(),
            step_resolution_s: scenario.simulation.step_resolution_s,
            horizon_steps: scenario.simulation.horizon_steps,
            error_tolerance: scenario.simulation.error_tolerance,
            max_control_iterations: scenario.simulation.max_control_iterations,
            cosim_enabled: scenario.cosim.is_some(),
        }
    }

    /// Timestamp label for step `i`, derived from the start time when it
    /// parses as ISO-8601, otherwise elapsed seconds.
    pub fn timestamp_for_step(&self, step: usize) -> String {
        let elapsed = self.step_resolution_s * step as f64;
        match chrono::NaiveDateTime::parse_from_str(&self.start_time, "%Y-%m-%dT%H:%M:%S") {
            Ok(start) => {
                let dt = start + chrono::Duration::milliseconds((elapsed * 1000.0) as i64);
                dt.format("%Y-%m-%dT%H:%M:%S").to_string()
            }
            Err(_) => format!("{elapsed}s"),
        }
    }
}
