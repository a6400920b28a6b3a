//! Deterministic synthetic feeder backend.
//!
//! A small stand-in for the external power-flow solver: bus voltages respond
//! linearly to injected and consumed power through per-bus sensitivities.
//! Generation raises the local voltage, load depresses it, which gives
//! volt-var control a real feedback path to iterate against. Useful for tests
//! and for running the pipeline without an external solver binary.

use std::collections::BTreeMap;

use crate::backend::{ElementKey, SolveStatus, SolverBackend, SolverMode, VariableValue};
use crate::error::{SolverError, SolverResult};

#[derive(Debug, Clone)]
enum ElementData {
    /// Upstream source; its `pu` parameter sets the feeder head voltage.
    Source,
    Bus {
        r_sens_pu_per_mw: f64,
        x_sens_pu_per_mvar: f64,
        distance_km: f64,
    },
    Generator {
        bus: usize,
    },
    Load {
        bus: usize,
    },
}

#[derive(Debug, Clone)]
struct SynElement {
    key: ElementKey,
    data: ElementData,
    params: BTreeMap<String, String>,
}

/// In-memory feeder model implementing [`SolverBackend`].
#[derive(Debug)]
pub struct SyntheticFeeder {
    base_volts: f64,
    step_resolution_s: f64,
    seconds: f64,
    step: usize,
    frequency_hz: f64,
    mode: SolverMode,
    elements: Vec<SynElement>,
    /// Bus voltage in pu, indexed like `elements`; only meaningful at `Bus`
    /// entries.
    bus_voltage: Vec<f64>,
    /// Per-element time profiles scaling generator output by step.
    profiles: BTreeMap<String, Vec<f64>>,
    active: Option<usize>,
    solve_calls: usize,
    resolve_calls: usize,
    fail_resolve_at: Option<usize>,
    fail_solve_at: Option<usize>,
}

impl SyntheticFeeder {
    /// New feeder with a single upstream source at `source_pu`.
    pub fn new(source_pu: f64, base_volts: f64, step_resolution_s: f64) -> Self {
        let mut params = BTreeMap::new();
        params.insert("pu".to_string(), format!("{source_pu}"));
        let source = SynElement {
            key: ElementKey::new("Vsource", "source"),
            data: ElementData::Source,
            params,
        };
        Self {
            base_volts,
            step_resolution_s,
            seconds: 0.0,
            step: 0,
            frequency_hz: 60.0,
            mode: SolverMode::Qsts,
            elements: vec![source],
            bus_voltage: vec![source_pu],
            profiles: BTreeMap::new(),
            active: None,
            solve_calls: 0,
            resolve_calls: 0,
            fail_resolve_at: None,
            fail_solve_at: None,
        }
    }

    /// # Panics
    /// Panics when a bus with the same name already exists.
    pub fn add_bus(&mut self, name: &str, r_sens_pu_per_mw: f64, x_sens_pu_per_mvar: f64) {
        assert!(
            self.bus_index(name).is_none(),
            "duplicate bus name: {name}"
        );
        self.elements.push(SynElement {
            key: ElementKey::new("Bus", name),
            data: ElementData::Bus {
                r_sens_pu_per_mw,
                x_sens_pu_per_mvar,
                distance_km: 0.0,
            },
            params: BTreeMap::new(),
        });
        self.bus_voltage.push(self.source_pu());
    }

    /// # Panics
    /// Panics when `bus` is unknown.
    pub fn add_generator(&mut self, name: &str, bus: &str, kva_rated: f64, kw: f64) {
        let bus = self.bus_index(bus).expect("unknown bus for generator");
        let mut params = BTreeMap::new();
        params.insert("kw".to_string(), format!("{kw}"));
        params.insert("kvar".to_string(), "0".to_string());
        params.insert("kva".to_string(), format!("{kva_rated}"));
        params.insert("pf".to_string(), "1".to_string());
        params.insert("enabled".to_string(), "true".to_string());
        self.elements.push(SynElement {
            key: ElementKey::new("Generator", name),
            data: ElementData::Generator { bus },
            params,
        });
        self.bus_voltage.push(0.0);
    }

    /// # Panics
    /// Panics when `bus` is unknown.
    pub fn add_load(&mut self, name: &str, bus: &str, kw: f64, kvar: f64) {
        let bus = self.bus_index(bus).expect("unknown bus for load");
        let mut params = BTreeMap::new();
        params.insert("kw".to_string(), format!("{kw}"));
        params.insert("kvar".to_string(), format!("{kvar}"));
        params.insert("enabled".to_string(), "true".to_string());
        self.elements.push(SynElement {
            key: ElementKey::new("Load", name),
            data: ElementData::Load { bus },
            params,
        });
        self.bus_voltage.push(0.0);
    }

    /// Per-step scaling applied to a generator's `kw` parameter.
    pub fn set_profile(&mut self, element_name: &str, profile: Vec<f64>) {
        self.profiles.insert(element_name.to_string(), profile);
    }

    /// Report non-convergence on the n-th `resolve_without_controls` call
    /// (1-based). Test hook.
    pub fn fail_resolve_on_call(&mut self, n: usize) {
        self.fail_resolve_at = Some(n);
    }

    /// Report non-convergence on the n-th `solve` call (1-based). Test hook.
    pub fn fail_solve_on_call(&mut self, n: usize) {
        self.fail_solve_at = Some(n);
    }

    pub fn solve_calls(&self) -> usize {
        self.solve_calls
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls
    }

    pub fn current_step(&self) -> usize {
        self.step
    }

    fn bus_index(&self, name: &str) -> Option<usize> {
        self.elements
            .iter()
            .position(|e| e.key.class == "Bus" && e.key.name == name)
    }

    fn source_pu(&self) -> f64 {
        self.elements
            .first()
            .and_then(|e| e.params.get("pu"))
            .and_then(|v| v.parse().ok())
            .unwrap_or(1.0)
    }

    fn param_f64(&self, idx: usize, name: &str, default: f64) -> f64 {
        self.elements[idx]
            .params
            .get(name)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn is_enabled(&self, idx: usize) -> bool {
        self.elements[idx]
            .params
            .get("enabled")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true)
    }

    /// Generator active power at the current step, after profile scaling.
    fn effective_kw(&self, idx: usize) -> f64 {
        if !self.is_enabled(idx) {
            return 0.0;
        }
        let kw = self.param_f64(idx, "kw", 0.0);
        match &self.elements[idx].data {
            ElementData::Generator { .. } => {
                let factor = match self.profiles.get(&self.elements[idx].key.name) {
                    Some(p) if !p.is_empty() => p[self.step % p.len()],
                    _ => 1.0,
                };
                kw * factor
            }
            _ => kw,
        }
    }

    fn effective_kvar(&self, idx: usize) -> f64 {
        if !self.is_enabled(idx) {
            return 0.0;
        }
        self.param_f64(idx, "kvar", 0.0)
    }

    fn recompute(&mut self) {
        let source_pu = self.source_pu();
        for bus_idx in 0..self.elements.len() {
            let (r, x) = match self.elements[bus_idx].data {
                ElementData::Bus {
                    r_sens_pu_per_mw,
                    x_sens_pu_per_mvar,
                    ..
                } => (r_sens_pu_per_mw, x_sens_pu_per_mvar),
                ElementData::Source => {
                    self.bus_voltage[bus_idx] = source_pu;
                    continue;
                }
                _ => continue,
            };
            let mut v = source_pu;
            for idx in 0..self.elements.len() {
                let sign = match self.elements[idx].data {
                    ElementData::Generator { bus } if bus == bus_idx => 1.0,
                    ElementData::Load { bus } if bus == bus_idx => -1.0,
                    _ => continue,
                };
                let p_mw = self.effective_kw(idx) / 1000.0;
                let q_mvar = self.effective_kvar(idx) / 1000.0;
                v += sign * (p_mw * r + q_mvar * x);
            }
            self.bus_voltage[bus_idx] = v;
        }
    }

    fn bus_of(&self, idx: usize) -> Option<usize> {
        match self.elements[idx].data {
            ElementData::Generator { bus } | ElementData::Load { bus } => Some(bus),
            ElementData::Bus { .. } => Some(idx),
            ElementData::Source => Some(0),
        }
    }
}

impl SolverBackend for SyntheticFeeder {
    fn solve(&mut self) -> SolverResult<SolveStatus> {
        self.solve_calls += 1;
        self.recompute();
        let converged = self.fail_solve_at != Some(self.solve_calls);
        Ok(SolveStatus {
            converged,
            iterations: 2,
        })
    }

    fn resolve_without_controls(&mut self) -> SolverResult<SolveStatus> {
        self.resolve_calls += 1;
        self.recompute();
        let converged = self.fail_resolve_at != Some(self.resolve_calls);
        Ok(SolveStatus {
            converged,
            iterations: 1,
        })
    }

    fn advance_time_step(&mut self) {
        self.seconds += self.step_resolution_s;
        self.step += 1;
    }

    fn seconds(&self) -> f64 {
        self.seconds
    }

    fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    fn set_frequency_hz(&mut self, hz: f64) {
        self.frequency_hz = hz;
    }

    fn mode(&self) -> SolverMode {
        self.mode
    }

    fn set_mode(&mut self, mode: SolverMode) {
        self.mode = mode;
    }

    fn elements(&self) -> Vec<ElementKey> {
        self.elements.iter().map(|e| e.key.clone()).collect()
    }

    fn buses(&self) -> Vec<String> {
        self.elements
            .iter()
            .filter(|e| matches!(e.data, ElementData::Bus { .. }))
            .map(|e| e.key.name.clone())
            .collect()
    }

    fn set_active(&mut self, key: &ElementKey) -> bool {
        match self.elements.iter().position(|e| &e.key == key) {
            Some(idx) => {
                self.active = Some(idx);
                true
            }
            None => {
                self.active = None;
                false
            }
        }
    }

    fn parameter_names(&self) -> Vec<String> {
        match self.active {
            Some(idx) => self.elements[idx].params.keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    fn variable_names(&self) -> Vec<String> {
        let Some(idx) = self.active else {
            return Vec::new();
        };
        match self.elements[idx].data {
            ElementData::Source => vec!["Voltages".to_string()],
            ElementData::Bus { .. } => vec![
                "DistanceKm".to_string(),
                "Voltages".to_string(),
                "puVmagAngle".to_string(),
            ],
            ElementData::Generator { .. } | ElementData::Load { .. } => vec![
                "Powers".to_string(),
                "VoltagePu".to_string(),
                "Voltages".to_string(),
            ],
        }
    }

    fn get_parameter(&self, name: &str) -> Option<String> {
        let idx = self.active?;
        self.elements[idx].params.get(name).cloned()
    }

    fn set_parameter(&mut self, name: &str, value: &str) -> SolverResult<()> {
        let Some(idx) = self.active else {
            return Err(SolverError::Backend {
                message: "no active element".to_string(),
            });
        };
        if !self.elements[idx].params.contains_key(name) {
            return Err(SolverError::UnknownProperty {
                element: self.elements[idx].key.to_string(),
                property: name.to_string(),
            });
        }
        self.elements[idx]
            .params
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn get_variable(&self, name: &str) -> Option<VariableValue> {
        let idx = self.active?;
        let v_pu = self.bus_voltage[self.bus_of(idx)?];
        match (&self.elements[idx].data, name) {
            (ElementData::Source, "Voltages") => Some(VariableValue::Vector(vec![
                self.source_pu() * self.base_volts,
                0.0,
            ])),
            (ElementData::Bus { distance_km, .. }, "DistanceKm") => {
                Some(VariableValue::Scalar(*distance_km))
            }
            (ElementData::Bus { .. }, "Voltages") => {
                Some(VariableValue::Vector(vec![v_pu * self.base_volts, 0.0]))
            }
            (ElementData::Bus { .. }, "puVmagAngle") => {
                Some(VariableValue::Vector(vec![v_pu, 0.0]))
            }
            (ElementData::Generator { .. } | ElementData::Load { .. }, "Voltages") => {
                Some(VariableValue::Vector(vec![v_pu * self.base_volts, 0.0]))
            }
            (ElementData::Generator { .. } | ElementData::Load { .. }, "VoltagePu") => {
                Some(VariableValue::Scalar(v_pu))
            }
            (ElementData::Generator { .. } | ElementData::Load { .. }, "Powers") => {
                Some(VariableValue::Vector(vec![
                    self.effective_kw(idx),
                    self.effective_kvar(idx),
                ]))
            }
            _ => None,
        }
    }
}
