//! The per-timestep run loop.

use std::path::Path;

use tracing::{debug, info, warn};

use gf_controls::{ControlError, ConvergenceOptions, run_step};
use gf_core::{RunWarning, WarningKind, WarningSink};
use gf_cosim::{CosimOptions, FedValue, Federate, LoopbackFederate, TimeAdvancer};
use gf_project::{RunSettings, ScenarioDef, SimulationModeDef};
use gf_results::{
    ExportGroup, ExportReport, IndexRow, JsonlReport, ResultStore, RunManifest, compute_run_id,
};
use gf_solver::{SolverBackend, SolverContext, SolverMode, SyntheticFeeder};

use crate::compile::compile_scenario;
use crate::error::{SimError, SimResult};

pub const SOLVER_VERSION: &str = "synthetic-feeder-0.1";

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub steps: usize,
    /// Steps where every controller tier converged within budget.
    pub converged_steps: usize,
}

/// Owns the compiled scenario and the fixed per-timestep sequence:
/// overrides, subscriptions, controller convergence, frequency sweep,
/// collection, publications, time advancement.
pub struct SimulationDriver {
    scenario: ScenarioDef,
    settings: RunSettings,
    run_id: String,
    backend: SyntheticFeeder,
    controllers: Vec<gf_controls::ControlElement>,
    handles: std::collections::BTreeMap<String, gf_solver::ElementHandle>,
    store: ResultStore,
    report: Option<JsonlReport>,
    convergence: ConvergenceOptions,
    advancer: Option<TimeAdvancer>,
    federate: Option<Box<dyn Federate>>,
}

impl SimulationDriver {
    /// Compile `scenario` and stand up the run directory under `output_root`.
    ///
    /// When the scenario enables co-simulation and no federate is supplied,
    /// an in-memory loopback federate is used so broker-less runs still
    /// exercise the full sequence.
    pub fn new(
        scenario: ScenarioDef,
        output_root: &Path,
        federate: Option<Box<dyn Federate>>,
    ) -> SimResult<Self> {
        let settings = RunSettings::from_scenario(&scenario);
        let run_id = compute_run_id(&scenario, &settings, SOLVER_VERSION);

        let group = match scenario.exports.group {
            gf_project::ExportGroupDef::ByElement => ExportGroup::ByElement,
            gf_project::ExportGroupDef::ByClass => ExportGroup::ByClass,
        };
        let mut store = ResultStore::create(
            output_root,
            &run_id,
            group,
            scenario.exports.max_chunk_bytes,
        )?;
        let mut report = JsonlReport::create(store.run_dir())?;

        let compiled = compile_scenario(&scenario, &mut report)?;
        let mut backend = compiled.backend;
        backend.set_mode(match scenario.simulation.mode {
            SimulationModeDef::Snapshot => SolverMode::Snapshot,
            SimulationModeDef::Qsts => SolverMode::Qsts,
        });

        // Sweep rows share the property buffers, so capacity covers them.
        let rows_per_step = 1 + scenario
            .simulation
            .frequency_sweep
            .as_ref()
            .map(|s| s.points)
            .unwrap_or(0);
        let total_rows = Self::effective_steps(&scenario) * rows_per_step;
        {
            let mut ctx = SolverContext::new(&mut backend);
            store.initialize_for_run(&mut ctx, &compiled.tracked, total_rows, &mut report)?;
        }
        info!(
            run_id = %run_id,
            estimated_bytes = store.estimated_bytes(),
            "result store initialized"
        );

        store.write_settings(&settings)?;
        store.write_manifest(&RunManifest {
            run_id: run_id.clone(),
            scenario_id: scenario.id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            solver_version: SOLVER_VERSION.to_string(),
            horizon_steps: settings.horizon_steps,
            step_resolution_s: settings.step_resolution_s,
        })?;

        let (advancer, federate) = match &scenario.cosim {
            Some(cosim) => {
                let advancer = TimeAdvancer::new(CosimOptions {
                    iterative: cosim.iterative,
                    error_tolerance: cosim.error_tolerance,
                    max_iterations: cosim.max_iterations,
                    nominal_fallback: cosim.nominal_fallback,
                    max_valid_magnitude: cosim.max_valid_magnitude,
                })?;
                let federate =
                    federate.unwrap_or_else(|| Box::new(LoopbackFederate::new()) as Box<dyn Federate>);
                (Some(advancer), Some(federate))
            }
            None => (None, None),
        };

        let convergence = ConvergenceOptions {
            error_tolerance: scenario.simulation.error_tolerance,
            max_iterations: scenario.simulation.max_control_iterations,
            max_error_threshold: scenario.simulation.max_error_threshold,
        };

        Ok(Self {
            scenario,
            settings,
            run_id,
            backend,
            controllers: compiled.controllers,
            handles: compiled.handles,
            store,
            report: Some(report),
            convergence,
            advancer,
            federate,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn backend(&self) -> &SyntheticFeeder {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut SyntheticFeeder {
        &mut self.backend
    }

    fn effective_steps(scenario: &ScenarioDef) -> usize {
        match scenario.simulation.mode {
            SimulationModeDef::Snapshot => 1,
            SimulationModeDef::Qsts => scenario.simulation.horizon_steps,
        }
    }

    /// Execute the whole horizon. The store is flushed and the warning
    /// report closed whether the run succeeds or aborts.
    pub fn run(&mut self) -> SimResult<RunSummary> {
        let result = self.run_inner();

        let failures = self.store.flush_all();
        for (table, error) in &failures {
            warn!(table = %table, error = %error, "flush failed");
            self.warn_sink(RunWarning {
                kind: WarningKind::ExportFailed,
                step: None,
                controller: None,
                element: Some(table.clone()),
                family: None,
                value: None,
                message: error.to_string(),
            });
        }
        if let Some(report) = self.report.take() {
            if let Err(error) = report.finish() {
                warn!(error = %error, "could not finalize warning report");
            }
        }

        match result {
            Ok(converged_steps) => Ok(RunSummary {
                run_id: self.run_id.clone(),
                steps: Self::effective_steps(&self.scenario),
                converged_steps,
            }),
            Err(e) => Err(e),
        }
    }

    fn run_inner(&mut self) -> SimResult<usize> {
        let total = Self::effective_steps(&self.scenario);
        let mut converged_steps = 0usize;

        for step in 0..total {
            let converged = self.run_one_step(step)?;
            if converged {
                converged_steps += 1;
            } else {
                info!(step, "step finished with partial controller convergence");
            }
        }
        Ok(converged_steps)
    }

    fn run_one_step(&mut self, step: usize) -> SimResult<bool> {
        self.apply_overrides(step);

        // Co-simulation holds the solver at this step until the advancer
        // accepts; without co-simulation the inner loop runs exactly once.
        let converged = loop {
            self.apply_subscriptions(step)?;

            // Base solve after this step's edits are on the circuit, so the
            // controller loop and collection see their effect.
            let status = self.backend.solve()?;
            if !status.converged {
                return Err(SimError::Control(ControlError::ConvergenceFailed {
                    step,
                    what: "base power-flow solve did not converge".to_string(),
                }));
            }

            let outcome = {
                let mut report = self.report.take().ok_or_else(|| SimError::Setup {
                    what: "warning report already closed".to_string(),
                })?;
                let result = run_step(
                    &mut self.controllers,
                    step,
                    &mut self.backend,
                    &self.convergence,
                    &mut report,
                );
                self.report = Some(report);
                result?
            };

            self.publish_values()?;

            match (&mut self.advancer, &mut self.federate) {
                (Some(advancer), Some(federate)) => {
                    let target = (step as f64 + 1.0) * self.settings.step_resolution_s;
                    let (accepted, granted) = advancer.advance(federate.as_mut(), target)?;
                    if accepted {
                        break outcome.converged;
                    }
                    debug!(step, granted, "time not granted, re-iterating step");
                }
                _ => break outcome.converged,
            }
        };

        self.frequency_sweep(step)?;
        self.collect(step)?;
        self.backend.advance_time_step();
        Ok(converged)
    }

    /// User-issued edits scheduled for this step. Best effort: unknown
    /// elements are warned about and skipped.
    fn apply_overrides(&mut self, step: usize) {
        let pending: Vec<gf_project::OverrideDef> = self
            .scenario
            .overrides
            .iter()
            .filter(|o| o.step == step)
            .cloned()
            .collect();
        for edit in pending {
            let Some(handle) = self.handles.get(&edit.element).cloned() else {
                warn!(element = %edit.element, "override target not found");
                self.warn_sink(RunWarning {
                    kind: WarningKind::UnknownElement,
                    step: Some(step),
                    controller: None,
                    element: Some(edit.element.clone()),
                    family: None,
                    value: None,
                    message: "override target not in circuit".to_string(),
                });
                continue;
            };
            let mut ctx = SolverContext::new(&mut self.backend);
            match handle.set_parameter(&mut ctx, &edit.property, &edit.value) {
                Ok(Some(_)) => debug!(element = %edit.element, property = %edit.property, "override applied"),
                Ok(None) => warn!(element = %edit.element, property = %edit.property, "override property unknown"),
                Err(e) => warn!(element = %edit.element, error = %e, "override failed"),
            }
        }
    }

    /// Pull latest externally-published values onto local elements.
    /// Per-subscription failures are non-fatal.
    fn apply_subscriptions(&mut self, step: usize) -> SimResult<()> {
        let Some(cosim) = self.scenario.cosim.clone() else {
            return Ok(());
        };
        let (Some(advancer), Some(federate)) = (&mut self.advancer, &mut self.federate) else {
            return Ok(());
        };

        let mut report = self.report.take().ok_or_else(|| SimError::Setup {
            what: "warning report already closed".to_string(),
        })?;
        for sub in &cosim.subscriptions {
            let raw = match federate.read(&sub.key) {
                Ok(Some(v)) => v.as_f64(),
                Ok(None) => None,
                Err(e) => {
                    warn!(key = %sub.key, error = %e, "subscription read failed");
                    None
                }
            };
            let Some(raw) = raw else {
                debug!(key = %sub.key, "no published value yet");
                continue;
            };

            let (value, substituted) = advancer.record_input(&sub.key, raw, step, &mut report);
            // A substituted fallback is already in physical units; the
            // configured multiplier applies only to genuine inputs.
            let applied = if substituted { value } else { value * sub.multiplier };

            let Some(handle) = self.handles.get(&sub.element) else {
                warn!(key = %sub.key, element = %sub.element, "subscription target not found");
                report.warn(RunWarning {
                    kind: WarningKind::UnknownElement,
                    step: Some(step),
                    controller: None,
                    element: Some(sub.element.clone()),
                    family: None,
                    value: Some(applied),
                    message: format!("subscription {} target not in circuit", sub.key),
                });
                continue;
            };
            let mut ctx = SolverContext::new(&mut self.backend);
            if let Err(e) = handle.set_parameter(&mut ctx, &sub.property, &format!("{applied}")) {
                warn!(key = %sub.key, error = %e, "subscription apply failed");
            }
        }
        self.report = Some(report);
        Ok(())
    }

    /// Push current local values to the broker.
    fn publish_values(&mut self) -> SimResult<()> {
        let Some(cosim) = self.scenario.cosim.clone() else {
            return Ok(());
        };
        let Some(federate) = &mut self.federate else {
            return Ok(());
        };

        for publication in &cosim.publications {
            let Some(handle) = self.handles.get(&publication.element) else {
                debug!(element = %publication.element, "publication source not found");
                continue;
            };
            let mut ctx = SolverContext::new(&mut self.backend);
            let value = match handle.get_variable(&mut ctx, &publication.property) {
                Some(v) => {
                    let row = v.to_row();
                    if row.len() == 1 {
                        FedValue::Double(row[0])
                    } else {
                        FedValue::Vector(row)
                    }
                }
                None => match handle
                    .get_parameter(&mut ctx, &publication.property)
                    .and_then(|s| s.parse::<f64>().ok())
                {
                    Some(v) => FedValue::Double(v),
                    None => continue,
                },
            };
            federate.publish(&publication.key, value)?;
        }
        Ok(())
    }

    /// Harmonic-style sweep: re-solve and re-collect at each configured
    /// frequency, then restore the base mode and frequency.
    fn frequency_sweep(&mut self, step: usize) -> SimResult<()> {
        let Some(sweep) = self.scenario.simulation.frequency_sweep.clone() else {
            return Ok(());
        };
        if self.backend.mode() == SolverMode::Snapshot {
            return Ok(());
        }

        let base_hz = self.backend.frequency_hz();
        let base_mode = self.backend.mode();
        self.backend.set_mode(SolverMode::Harmonic);

        for hz in sweep.frequencies() {
            self.backend.set_frequency_hz(hz);
            let status = self.backend.resolve_without_controls()?;
            if !status.converged {
                warn!(step, frequency_hz = hz, "sweep point did not converge");
            }
            let row = IndexRow {
                timestamp: self.settings.timestamp_for_step(step),
                frequency_hz: hz,
                mode: SolverMode::Harmonic.to_string(),
            };
            let mut ctx = SolverContext::new(&mut self.backend);
            self.store.collect(&mut ctx, row)?;
        }

        self.backend.set_frequency_hz(base_hz);
        self.backend.set_mode(base_mode);
        self.backend.resolve_without_controls()?;
        Ok(())
    }

    fn collect(&mut self, step: usize) -> SimResult<()> {
        let row = IndexRow {
            timestamp: self.settings.timestamp_for_step(step),
            frequency_hz: self.backend.frequency_hz(),
            mode: self.backend.mode().to_string(),
        };
        let mut ctx = SolverContext::new(&mut self.backend);
        self.store.collect(&mut ctx, row)?;
        Ok(())
    }

    /// CSV materialization of everything buffered; failures are aggregated
    /// in the returned report, never short-circuited.
    pub fn export_csv(&self, prefix: &str) -> ExportReport {
        self.store.export_all(prefix)
    }

    fn warn_sink(&mut self, warning: RunWarning) {
        if let Some(report) = &mut self.report {
            report.warn(warning);
        }
    }
}
