//! Time-advance negotiation with the external broker.
//!
//! Two modes. Non-iterative: block until the broker grants the target time.
//! Iterative: hold the solver at the current step while externally-supplied
//! inputs settle, judged by a two-delta stability metric over a short
//! per-input history, with a hard iteration cap that force-accepts rather
//! than blocking indefinitely.

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, info, warn};

use gf_core::{RunWarning, WarningKind, WarningSink};

use crate::federate::{Federate, IterationResult};
use crate::{CosimError, CosimResult};

/// Samples kept per subscribed input for the stability metric.
const HISTORY_LEN: usize = 5;

/// Near-zero cutoff below which a voltage-like input is treated as
/// uninitialized rather than physical.
const NEAR_ZERO: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct CosimOptions {
    /// Iterate at each step until subscribed inputs settle.
    pub iterative: bool,
    /// Aggregate two-delta error below which the current state is accepted.
    pub error_tolerance: f64,
    /// Iteration cap per step; reaching it force-accepts.
    pub max_iterations: usize,
    /// Substituted for non-finite or out-of-range inputs.
    pub nominal_fallback: f64,
    /// Inputs with magnitude above this are treated as uninitialized broker
    /// sentinels, not physical values.
    pub max_valid_magnitude: f64,
}

impl Default for CosimOptions {
    fn default() -> Self {
        Self {
            iterative: false,
            error_tolerance: 1e-3,
            max_iterations: 10,
            nominal_fallback: 120.0,
            max_valid_magnitude: 1e6,
        }
    }
}

impl CosimOptions {
    pub fn validate(&self) -> CosimResult<()> {
        if !self.error_tolerance.is_finite() || self.error_tolerance < 0.0 {
            return Err(CosimError::InvalidOption {
                what: "error_tolerance",
                message: format!("must be finite and non-negative, got {}", self.error_tolerance),
            });
        }
        if self.max_iterations == 0 {
            return Err(CosimError::InvalidOption {
                what: "max_iterations",
                message: "must be at least 1".to_string(),
            });
        }
        if !self.nominal_fallback.is_finite() {
            return Err(CosimError::InvalidOption {
                what: "nominal_fallback",
                message: "must be finite".to_string(),
            });
        }
        Ok(())
    }
}

/// Gates how far the local solver clock may advance.
#[derive(Debug)]
pub struct TimeAdvancer {
    options: CosimOptions,
    granted: f64,
    last_requested: f64,
    iteration: usize,
    /// Most recent value first.
    history: BTreeMap<String, VecDeque<f64>>,
}

impl TimeAdvancer {
    pub fn new(options: CosimOptions) -> CosimResult<Self> {
        options.validate()?;
        Ok(Self {
            options,
            granted: 0.0,
            last_requested: 0.0,
            iteration: 0,
            history: BTreeMap::new(),
        })
    }

    pub fn granted(&self) -> f64 {
        self.granted
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Sanitize a subscribed input and record it in the stability history.
    ///
    /// Non-finite or out-of-physical-range values are replaced by the
    /// nominal fallback for this iteration only; the substitution is
    /// surfaced as a warning and flagged in the return so the caller can
    /// skip any scaling it would normally apply.
    pub fn record_input(
        &mut self,
        key: &str,
        raw: f64,
        step: usize,
        sink: &mut dyn WarningSink,
    ) -> (f64, bool) {
        let out_of_range =
            !raw.is_finite() || raw.abs() > self.options.max_valid_magnitude || raw.abs() < NEAR_ZERO;
        let (value, substituted) = if out_of_range {
            warn!(key, raw, fallback = self.options.nominal_fallback, "input substituted");
            sink.warn(RunWarning {
                kind: WarningKind::InputSubstituted,
                step: Some(step),
                controller: None,
                element: Some(key.to_string()),
                family: None,
                value: raw.is_finite().then_some(raw),
                message: format!(
                    "subscribed input out of range, substituted {}",
                    self.options.nominal_fallback
                ),
            });
            (self.options.nominal_fallback, true)
        } else {
            (raw, false)
        };

        let ring = self.history.entry(key.to_string()).or_default();
        ring.push_front(value);
        ring.truncate(HISTORY_LEN);
        (value, substituted)
    }

    /// Aggregate two-delta stability error across all subscribed inputs.
    ///
    /// An input with fewer than three observations cannot demonstrate two
    /// consecutive small deltas, so it reports infinity.
    pub fn error(&self) -> f64 {
        self.history
            .values()
            .map(|ring| {
                if ring.len() < 3 {
                    f64::INFINITY
                } else {
                    (ring[0] - ring[1]).abs() + (ring[1] - ring[2]).abs()
                }
            })
            .sum()
    }

    /// Negotiate advancement to `target_seconds`.
    ///
    /// Returns `(accepted, granted)`. When `accepted` is false the caller
    /// must hold the solver at the current step, re-apply subscriptions,
    /// re-resolve controls, and call again.
    pub fn advance(
        &mut self,
        federate: &mut dyn Federate,
        target_seconds: f64,
    ) -> CosimResult<(bool, f64)> {
        if self.granted > self.last_requested {
            // Broker already moved past our previous request; new step.
            self.iteration = 0;
        }
        self.last_requested = target_seconds;

        if !self.options.iterative {
            self.drain_to(federate, target_seconds)?;
            return Ok((true, self.granted));
        }

        let (granted, flag) = federate.request_time_iterative(target_seconds)?;
        self.granted = self.granted.max(granted);
        if self.granted >= target_seconds || flag == IterationResult::NextStep {
            debug!(granted = self.granted, "broker completed iteration on its own");
            return Ok(self.accept(federate, target_seconds)?);
        }

        let error = self.error();
        if error <= self.options.error_tolerance {
            debug!(error, iteration = self.iteration, "inputs settled, accepting");
            return Ok(self.accept(federate, target_seconds)?);
        }

        self.iteration += 1;
        if self.iteration >= self.options.max_iterations {
            info!(
                error,
                iterations = self.iteration,
                "iteration budget exhausted, force-accepting"
            );
            return Ok(self.accept(federate, target_seconds)?);
        }

        debug!(error, iteration = self.iteration, granted = self.granted, "iterating");
        Ok((false, self.granted))
    }

    fn accept(
        &mut self,
        federate: &mut dyn Federate,
        target_seconds: f64,
    ) -> CosimResult<(bool, f64)> {
        self.drain_to(federate, target_seconds)?;
        self.iteration = 0;
        Ok((true, self.granted))
    }

    /// Non-iterative completion: block until the broker grants the target.
    fn drain_to(&mut self, federate: &mut dyn Federate, target_seconds: f64) -> CosimResult<()> {
        while self.granted < target_seconds {
            let granted = federate.request_time(target_seconds)?;
            self.granted = self.granted.max(granted);
        }
        Ok(())
    }
}
