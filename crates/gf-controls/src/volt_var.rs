//! Volt-var control: reactive power command as a function of local voltage.

use serde::{Deserialize, Serialize};
use tracing::debug;

use gf_solver::{ElementHandle, SolverContext};

use crate::algorithm::{ControlAlgorithm, Priority, interp};
use crate::error::{ControlError, ControlResult};

/// Volt-var curve and limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoltVarSettings {
    /// `(v_pu, q_fraction)` points sorted by voltage; `q_fraction` is the
    /// commanded reactive power as a fraction of available kvar at that
    /// operating point (positive = injection).
    pub curve: Vec<(f64, f64)>,
    /// Rated apparent power (kVA); errors are normalized to this.
    pub rated_kva: f64,
    /// Blend factor toward the previous command, in `[0, 1)`. Higher values
    /// damp oscillation between iterations.
    pub damping: f64,
    /// Generation below this fraction of rated power disconnects the
    /// inverter's var support for the step.
    pub cut_in_fraction: f64,
}

impl VoltVarSettings {
    pub fn validate(&self) -> ControlResult<()> {
        if self.curve.len() < 2 {
            return Err(ControlError::InvalidArg {
                what: "volt-var curve needs at least two points",
            });
        }
        if self.curve.windows(2).any(|w| w[1].0 < w[0].0) {
            return Err(ControlError::InvalidArg {
                what: "volt-var curve points must be sorted by voltage",
            });
        }
        if self.rated_kva <= 0.0 {
            return Err(ControlError::InvalidArg {
                what: "rated_kva must be positive",
            });
        }
        if !(0.0..1.0).contains(&self.damping) {
            return Err(ControlError::InvalidArg {
                what: "damping must be in [0, 1)",
            });
        }
        Ok(())
    }
}

/// Volt-var algorithm state carried across timesteps.
#[derive(Debug, Clone)]
pub struct VoltVar {
    settings: VoltVarSettings,
    q_prev_kvar: f64,
    disconnected: bool,
    iteration: usize,
}

impl VoltVar {
    pub fn new(settings: VoltVarSettings) -> ControlResult<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            q_prev_kvar: 0.0,
            disconnected: false,
            iteration: 0,
        })
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// Updates run so far for the current `(priority, timestep)` pair.
    pub fn iteration(&self) -> usize {
        self.iteration
    }
}

impl ControlAlgorithm for VoltVar {
    fn family(&self) -> &'static str {
        "VoltVar"
    }

    fn priorities(&self) -> &'static [Priority] {
        &[Priority::Var]
    }

    fn update(
        &mut self,
        _priority: Priority,
        handle: &ElementHandle,
        ctx: &mut SolverContext<'_>,
    ) -> ControlResult<f64> {
        self.iteration += 1;

        let Some(powers) = handle.get_variable(ctx, "Powers") else {
            debug!(element = %handle.key(), "no power telemetry, volt-var skipped");
            return Ok(0.0);
        };
        let kw = powers.to_row().first().copied().unwrap_or(0.0);

        // Below cut-in the inverter provides no var support. A zero error
        // here is a valid fixed point.
        if kw < self.settings.cut_in_fraction * self.settings.rated_kva {
            if !self.disconnected {
                self.disconnected = true;
                self.q_prev_kvar = 0.0;
                handle.set_parameter(ctx, "kvar", "0")?;
            }
            return Ok(0.0);
        }
        self.disconnected = false;

        let Some(v_pu) = handle.get_variable(ctx, "VoltagePu").and_then(|v| v.first()) else {
            debug!(element = %handle.key(), "no voltage telemetry, volt-var skipped");
            return Ok(0.0);
        };

        // Headroom left for reactive power at the current operating point.
        let q_avail = (self.settings.rated_kva.powi(2) - kw.powi(2)).max(0.0).sqrt();
        let q_target = interp(&self.settings.curve, v_pu) * q_avail;
        let q_cmd =
            self.settings.damping * self.q_prev_kvar + (1.0 - self.settings.damping) * q_target;

        handle.set_parameter(ctx, "kvar", &format!("{q_cmd}"))?;

        let error = (q_cmd - self.q_prev_kvar).abs() / self.settings.rated_kva;
        self.q_prev_kvar = q_cmd;
        Ok(error)
    }

    fn reset_iteration(&mut self) {
        self.iteration = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gf_core::Id;
    use gf_solver::{ElementKey, SolverBackend, SyntheticFeeder};

    fn standard_curve() -> Vec<(f64, f64)> {
        vec![(0.95, 1.0), (0.98, 0.0), (1.02, 0.0), (1.05, -1.0)]
    }

    fn setup() -> (SyntheticFeeder, ElementHandle) {
        let mut f = SyntheticFeeder::new(1.0, 7200.0, 900.0);
        f.add_bus("b1", 0.05, 0.08);
        f.add_generator("pv1", "b1", 100.0, 60.0);
        f.add_load("l1", "b1", 400.0, 100.0);
        f.solve().unwrap();
        let handle = ElementHandle::new(ElementKey::new("Generator", "pv1"), Id::from_index(2));
        (f, handle)
    }

    #[test]
    fn injects_vars_under_depressed_voltage() {
        let (mut f, handle) = setup();
        let mut vv = VoltVar::new(VoltVarSettings {
            curve: standard_curve(),
            rated_kva: 100.0,
            damping: 0.0,
            cut_in_fraction: 0.1,
        })
        .unwrap();

        let mut ctx = SolverContext::new(&mut f);
        let err = vv.update(Priority::Var, &handle, &mut ctx).unwrap();
        assert!(err > 0.0);
        let kvar: f64 = handle
            .get_parameter(&mut ctx, "kvar")
            .unwrap()
            .parse()
            .unwrap();
        // Heavy load pulls voltage below the deadband, so vars are injected.
        assert!(kvar > 0.0);
    }

    #[test]
    fn converges_to_fixed_point_with_resolves() {
        let (mut f, handle) = setup();
        let mut vv = VoltVar::new(VoltVarSettings {
            curve: standard_curve(),
            rated_kva: 100.0,
            damping: 0.4,
            cut_in_fraction: 0.1,
        })
        .unwrap();

        let mut last_err = f64::INFINITY;
        for _ in 0..20 {
            let err = {
                let mut ctx = SolverContext::new(&mut f);
                vv.update(Priority::Var, &handle, &mut ctx).unwrap()
            };
            f.resolve_without_controls().unwrap();
            last_err = err;
        }
        assert!(last_err < 1e-3);
    }

    #[test]
    fn below_cut_in_is_a_valid_fixed_point() {
        let (mut f, handle) = setup();
        {
            let mut ctx = SolverContext::new(&mut f);
            handle.set_parameter(&mut ctx, "kw", "2").unwrap();
        }
        f.solve().unwrap();

        let mut vv = VoltVar::new(VoltVarSettings {
            curve: standard_curve(),
            rated_kva: 100.0,
            damping: 0.0,
            cut_in_fraction: 0.1,
        })
        .unwrap();

        let mut ctx = SolverContext::new(&mut f);
        let err = vv.update(Priority::Var, &handle, &mut ctx).unwrap();
        assert_eq!(err, 0.0);
        assert!(vv.is_disconnected());
        assert_eq!(handle.get_parameter(&mut ctx, "kvar").as_deref(), Some("0"));
    }

    #[test]
    fn rejects_bad_settings() {
        let bad = VoltVarSettings {
            curve: vec![(1.0, 0.0)],
            rated_kva: 100.0,
            damping: 0.0,
            cut_in_fraction: 0.1,
        };
        assert!(VoltVar::new(bad).is_err());

        let bad = VoltVarSettings {
            curve: standard_curve(),
            rated_kva: -1.0,
            damping: 0.0,
            cut_in_fraction: 0.1,
        };
        assert!(VoltVar::new(bad).is_err());
    }
}
