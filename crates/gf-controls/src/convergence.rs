//! Priority-tiered fixed-point iteration for one simulation timestep.
//!
//! Tiers run strictly in ascending order. Within a tier, every dispatching
//! controller is updated in registration order (stable across runs), the
//! maximum reported error is compared against the tolerance, and the circuit
//! is re-solved without control actions between iterations. A tier that
//! exhausts its budget is reported per offending controller and the loop
//! proceeds to the next tier; a non-convergent re-solve is fatal.

use tracing::warn;

use gf_core::{RunWarning, WarningKind, WarningSink};
use gf_solver::{SolverBackend, SolverContext};

use crate::algorithm::Priority;
use crate::element::ControlElement;
use crate::error::{ControlError, ControlResult};

/// Budgets and tolerances for the per-timestep loop.
#[derive(Debug, Clone)]
pub struct ConvergenceOptions {
    /// Per-tier convergence tolerance on the maximum controller error.
    pub error_tolerance: f64,
    /// Iteration budget per tier.
    pub max_iterations: usize,
    /// Optional hard ceiling: any controller error above this aborts the
    /// timestep. Distinct from the per-tier tolerance.
    pub max_error_threshold: Option<f64>,
}

impl Default for ConvergenceOptions {
    fn default() -> Self {
        Self {
            error_tolerance: 1e-3,
            max_iterations: 10,
            max_error_threshold: None,
        }
    }
}

/// Result of one timestep's controller solve.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceOutcome {
    /// True only if every tier converged within its budget.
    pub converged: bool,
    /// Last observed maximum error across controllers.
    pub max_error: f64,
}

/// Drive all controllers to a fixed point for `step`.
///
/// The reported error per iteration is the `max()` across controllers, never
/// a sum or mean: errors from independent controllers are not additive.
pub fn run_step(
    controllers: &mut [ControlElement],
    step: usize,
    backend: &mut dyn SolverBackend,
    opts: &ConvergenceOptions,
    sink: &mut dyn WarningSink,
) -> ControlResult<ConvergenceOutcome> {
    if opts.max_iterations == 0 {
        return Err(ControlError::InvalidArg {
            what: "max_iterations must be positive",
        });
    }

    let mut all_converged = true;
    let mut last_max_error = 0.0_f64;

    for priority in Priority::ALL {
        if !controllers.iter().any(|c| c.dispatches(priority)) {
            continue;
        }

        let mut tier_converged = false;
        for iteration in 0..opts.max_iterations {
            let mut errors: Vec<(usize, f64)> = Vec::new();
            let mut max_error = 0.0_f64;
            for (idx, controller) in controllers.iter_mut().enumerate() {
                if !controller.dispatches(priority) {
                    continue;
                }
                let error = {
                    let mut ctx = SolverContext::new(backend);
                    controller.update(priority, step, &mut ctx)?
                };
                max_error = max_error.max(error);
                errors.push((idx, error));
            }
            last_max_error = max_error;

            if let Some(threshold) = opts.max_error_threshold
                && max_error > threshold
            {
                return Err(ControlError::ConvergenceFailed {
                    step,
                    what: format!(
                        "controller error {max_error} exceeded configured maximum {threshold}"
                    ),
                });
            }

            if max_error <= opts.error_tolerance {
                tier_converged = true;
                break;
            }

            if iteration == opts.max_iterations - 1 {
                // Budget exhausted: surface every offending controller and
                // move on. Partial convergence is tolerated, not thrown.
                for (idx, error) in &errors {
                    if *error <= opts.error_tolerance {
                        continue;
                    }
                    let controller = &controllers[*idx];
                    warn!(
                        controller = controller.name(),
                        element = %controller.element_name(),
                        family = controller.family(),
                        error = *error,
                        step,
                        "controller did not converge within iteration budget"
                    );
                    sink.warn(RunWarning {
                        kind: WarningKind::ControllerNotConverged,
                        step: Some(step),
                        controller: Some(controller.name().to_string()),
                        element: Some(controller.element_name()),
                        family: Some(controller.family().to_string()),
                        value: Some(*error),
                        message: "iteration budget exhausted".to_string(),
                    });
                }
                break;
            }

            let status = backend.resolve_without_controls()?;
            if !status.converged {
                return Err(ControlError::ConvergenceFailed {
                    step,
                    what: "solver did not converge on control-free re-solve".to_string(),
                });
            }
        }

        all_converged &= tier_converged;
    }

    Ok(ConvergenceOutcome {
        converged: all_converged,
        max_error: last_max_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::ControlAlgorithm;
    use gf_core::{Id, VecSink};
    use gf_solver::{ElementHandle, ElementKey, SyntheticFeeder};

    /// Returns scripted errors, one per update call, repeating the last.
    struct Scripted {
        priority: &'static [Priority],
        errors: Vec<f64>,
        calls: usize,
    }

    impl Scripted {
        fn at(priority: &'static [Priority], errors: Vec<f64>) -> Box<Self> {
            Box::new(Self {
                priority,
                errors,
                calls: 0,
            })
        }
    }

    impl ControlAlgorithm for Scripted {
        fn family(&self) -> &'static str {
            "Scripted"
        }
        fn priorities(&self) -> &'static [Priority] {
            self.priority
        }
        fn update(
            &mut self,
            _priority: Priority,
            _handle: &ElementHandle,
            _ctx: &mut SolverContext<'_>,
        ) -> ControlResult<f64> {
            let idx = self.calls.min(self.errors.len() - 1);
            self.calls += 1;
            Ok(self.errors[idx])
        }
    }

    fn controller(name: &str, algorithm: Box<dyn ControlAlgorithm>) -> ControlElement {
        let handle = ElementHandle::new(ElementKey::new("Generator", name), Id::from_index(0));
        ControlElement::new(format!("ctrl-{name}"), handle, algorithm)
    }

    fn opts(max_iterations: usize) -> ConvergenceOptions {
        ConvergenceOptions {
            error_tolerance: 1e-3,
            max_iterations,
            max_error_threshold: None,
        }
    }

    #[test]
    fn tiers_run_in_order_with_budgets() {
        // Priority 0 converges immediately, priority 1 at its third
        // iteration, priority 2 never.
        let mut controllers = vec![
            controller("a", Scripted::at(&[Priority::Var], vec![0.0])),
            controller(
                "b",
                Scripted::at(&[Priority::WattLimiting], vec![0.5, 0.1, 0.0]),
            ),
            controller("c", Scripted::at(&[Priority::Trip], vec![0.3])),
        ];
        let mut backend = SyntheticFeeder::new(1.0, 7200.0, 900.0);
        let mut sink = VecSink::default();

        let outcome = run_step(&mut controllers, 0, &mut backend, &opts(5), &mut sink).unwrap();

        assert!(!outcome.converged);
        // Tier 2's last iteration still reports its (non-converged) error.
        assert_eq!(outcome.max_error, 0.3);
        // Tier 0: 1 iteration, no re-solve. Tier 1: converges on the third
        // update, so 2 re-solves. Tier 2: 5 iterations, 4 re-solves.
        assert_eq!(backend.resolve_calls(), 6);
        // One warning for the offending tier-2 controller.
        assert_eq!(sink.warnings.len(), 1);
        assert_eq!(sink.warnings[0].kind, WarningKind::ControllerNotConverged);
        assert_eq!(sink.warnings[0].controller.as_deref(), Some("ctrl-c"));
    }

    #[test]
    fn error_is_max_never_sum() {
        let mut controllers = vec![
            controller("a", Scripted::at(&[Priority::Var], vec![0.01])),
            controller("b", Scripted::at(&[Priority::Var], vec![0.5])),
            controller("c", Scripted::at(&[Priority::Var], vec![0.2])),
        ];
        let mut backend = SyntheticFeeder::new(1.0, 7200.0, 900.0);
        let mut sink = VecSink::default();

        let outcome = run_step(&mut controllers, 0, &mut backend, &opts(1), &mut sink).unwrap();
        assert_eq!(outcome.max_error, 0.5);
    }

    #[test]
    fn zero_error_from_disconnect_converges_tier() {
        let mut controllers = vec![controller("a", Scripted::at(&[Priority::Var], vec![0.0]))];
        let mut backend = SyntheticFeeder::new(1.0, 7200.0, 900.0);
        let mut sink = VecSink::default();

        let outcome = run_step(&mut controllers, 0, &mut backend, &opts(5), &mut sink).unwrap();
        assert!(outcome.converged);
        assert_eq!(backend.resolve_calls(), 0);
    }

    #[test]
    fn failed_resolve_is_fatal() {
        let mut controllers = vec![controller("a", Scripted::at(&[Priority::Var], vec![0.5]))];
        let mut backend = SyntheticFeeder::new(1.0, 7200.0, 900.0);
        backend.fail_resolve_on_call(1);
        let mut sink = VecSink::default();

        let err = run_step(&mut controllers, 3, &mut backend, &opts(5), &mut sink).unwrap_err();
        match err {
            ControlError::ConvergenceFailed { step, .. } => assert_eq!(step, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn hard_error_ceiling_aborts() {
        let mut controllers = vec![controller("a", Scripted::at(&[Priority::Var], vec![50.0]))];
        let mut backend = SyntheticFeeder::new(1.0, 7200.0, 900.0);
        let mut sink = VecSink::default();

        let opts = ConvergenceOptions {
            error_tolerance: 1e-3,
            max_iterations: 5,
            max_error_threshold: Some(10.0),
        };
        let err = run_step(&mut controllers, 0, &mut backend, &opts, &mut sink).unwrap_err();
        assert!(matches!(err, ControlError::ConvergenceFailed { .. }));
    }

    #[test]
    fn empty_tier_is_skipped() {
        let mut controllers: Vec<ControlElement> = Vec::new();
        let mut backend = SyntheticFeeder::new(1.0, 7200.0, 900.0);
        let mut sink = VecSink::default();

        let outcome = run_step(&mut controllers, 0, &mut backend, &opts(5), &mut sink).unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.max_error, 0.0);
    }
}
