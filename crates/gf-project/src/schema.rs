//! Scenario schema definitions.

use serde::{Deserialize, Serialize};

pub const LATEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub scenarios: Vec<ScenarioDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioDef {
    pub id: String,
    pub name: String,
    pub circuit: CircuitDef,
    pub simulation: SimulationDef,
    #[serde(default)]
    pub controllers: Vec<ControllerAttachment>,
    #[serde(default)]
    pub exports: ExportDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cosim: Option<CosimDef>,
    #[serde(default)]
    pub overrides: Vec<OverrideDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CircuitDef {
    pub source_pu: f64,
    pub base_volts: f64,
    #[serde(default)]
    pub buses: Vec<BusDef>,
    #[serde(default)]
    pub generators: Vec<GeneratorDef>,
    #[serde(default)]
    pub loads: Vec<LoadDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusDef {
    pub id: String,
    pub r_sens_pu_per_mw: f64,
    pub x_sens_pu_per_mvar: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratorDef {
    pub id: String,
    pub bus: String,
    pub kva_rated: f64,
    pub kw: f64,
    /// Per-step scaling applied to `kw`, cycled over the horizon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadDef {
    pub id: String,
    pub bus: String,
    pub kw: f64,
    pub kvar: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimulationModeDef {
    Snapshot,
    Qsts,
}

impl Default for SimulationModeDef {
    fn default() -> Self {
        SimulationModeDef::Qsts
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationDef {
    #[serde(default)]
    pub mode: SimulationModeDef,
    pub horizon_steps: usize,
    pub step_resolution_s: f64,
    /// ISO-8601 start of the simulated horizon.
    pub start_time: String,
    #[serde(default = "default_error_tolerance")]
    pub error_tolerance: f64,
    #[serde(default = "default_max_control_iterations")]
    pub max_control_iterations: usize,
    /// Hard error ceiling; exceeding it aborts the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_error_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_sweep: Option<FrequencySweepDef>,
}

fn default_error_tolerance() -> f64 {
    1e-3
}

fn default_max_control_iterations() -> usize {
    10
}

/// Harmonic-style sweep re-solved at each timestep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrequencySweepDef {
    pub start_hz: f64,
    pub stop_hz: f64,
    pub points: usize,
}

impl FrequencySweepDef {
    pub fn frequencies(&self) -> Vec<f64> {
        if self.points <= 1 {
            return vec![self.start_hz];
        }
        let span = self.stop_hz - self.start_hz;
        (0..self.points)
            .map(|i| self.start_hz + span * i as f64 / (self.points - 1) as f64)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerAttachment {
    /// Unique within a scenario; per-element instances get `<name>.<element>`.
    pub name: String,
    pub element_class: String,
    /// Specific element names; empty means every element of the class.
    #[serde(default)]
    pub elements: Vec<String>,
    pub kind: ControllerKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ControllerKind {
    VoltVar {
        /// (voltage pu, reactive fraction of rated kva) breakpoints.
        curve: Vec<(f64, f64)>,
        #[serde(default)]
        damping: f64,
        #[serde(default = "default_cut_in_fraction")]
        cut_in_fraction: f64,
    },
    VoltWatt {
        v_start_pu: f64,
        v_full_pu: f64,
        #[serde(default)]
        damping: f64,
    },
    ConstantPowerFactor {
        pf: f64,
    },
    VariablePowerFactor {
        pf_min: f64,
        low_fraction: f64,
    },
    VoltageTrip {
        v_trip_pu: f64,
        v_reconnect_pu: f64,
    },
}

fn default_cut_in_fraction() -> f64 {
    0.1
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExportGroupDef {
    ByElement,
    ByClass,
}

impl Default for ExportGroupDef {
    fn default() -> Self {
        ExportGroupDef::ByElement
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ExportDef {
    #[serde(default)]
    pub group: ExportGroupDef,
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
    #[serde(default)]
    pub targets: Vec<ExportTargetDef>,
}

fn default_max_chunk_bytes() -> usize {
    8 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportTargetDef {
    pub element_class: String,
    /// Specific element names; empty means every element of the class.
    #[serde(default)]
    pub elements: Vec<String>,
    pub properties: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CosimDef {
    #[serde(default)]
    pub iterative: bool,
    #[serde(default = "default_cosim_tolerance")]
    pub error_tolerance: f64,
    #[serde(default = "default_cosim_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_nominal_fallback")]
    pub nominal_fallback: f64,
    #[serde(default = "default_max_valid_magnitude")]
    pub max_valid_magnitude: f64,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionDef>,
    #[serde(default)]
    pub publications: Vec<PublicationDef>,
}

fn default_cosim_tolerance() -> f64 {
    1e-3
}

fn default_cosim_max_iterations() -> usize {
    10
}

fn default_nominal_fallback() -> f64 {
    120.0
}

fn default_max_valid_magnitude() -> f64 {
    1e6
}

/// External signal applied to a local element parameter each step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionDef {
    pub key: String,
    /// `Class.name` of the target element.
    pub element: String,
    pub property: String,
    /// Scaling applied to the raw value; skipped when the value was
    /// substituted by the nominal fallback.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

/// Local value pushed to the broker each step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicationDef {
    pub key: String,
    /// `Class.name` of the source element.
    pub element: String,
    pub property: String,
}

/// User-issued edit applied at the start of a given step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverrideDef {
    pub step: usize,
    /// `Class.name` of the target element.
    pub element: String,
    pub property: String,
    pub value: String,
}
