//! Power-factor control families.
//!
//! Constant power factor holds `q = p * tan(acos(pf))`; variable power factor
//! relaxes the factor linearly with loading level.

use serde::{Deserialize, Serialize};
use tracing::debug;

use gf_solver::{ElementHandle, SolverContext};

use crate::algorithm::{ControlAlgorithm, Priority};
use crate::error::{ControlError, ControlResult};

fn q_for(kw: f64, pf: f64) -> f64 {
    let pf = pf.clamp(-1.0, 1.0);
    if pf.abs() < f64::EPSILON {
        return 0.0;
    }
    kw * (pf.acos()).tan() * pf.signum()
}

/// Constant power-factor settings and state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantPowerFactor {
    /// Target power factor; sign selects injection vs. absorption.
    pub pf: f64,
    /// Rated apparent power (kVA).
    pub rated_kva: f64,
    #[serde(skip)]
    q_prev_kvar: f64,
}

impl ConstantPowerFactor {
    pub fn new(pf: f64, rated_kva: f64) -> ControlResult<Self> {
        if !(-1.0..=1.0).contains(&pf) || pf == 0.0 {
            return Err(ControlError::InvalidArg {
                what: "pf must be in [-1, 1] and nonzero",
            });
        }
        if rated_kva <= 0.0 {
            return Err(ControlError::InvalidArg {
                what: "rated_kva must be positive",
            });
        }
        Ok(Self {
            pf,
            rated_kva,
            q_prev_kvar: 0.0,
        })
    }
}

impl ControlAlgorithm for ConstantPowerFactor {
    fn family(&self) -> &'static str {
        "ConstantPowerFactor"
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
        let Some(kw) = handle
            .get_variable(ctx, "Powers")
            .map(|p| p.to_row().first().copied().unwrap_or(0.0))
        else {
            debug!(element = %handle.key(), "no power telemetry, pf control skipped");
            return Ok(0.0);
        };

        let q_cmd = q_for(kw, self.pf);
        handle.set_parameter(ctx, "kvar", &format!("{q_cmd}"))?;

        let error = (q_cmd - self.q_prev_kvar).abs() / self.rated_kva;
        self.q_prev_kvar = q_cmd;
        Ok(error)
    }
}

/// Variable power-factor settings and state.
///
/// Power factor moves linearly from unity at `low_fraction` loading to
/// `pf_min` at full rated output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariablePowerFactor {
    pub pf_min: f64,
    pub low_fraction: f64,
    pub rated_kva: f64,
    #[serde(skip)]
    q_prev_kvar: f64,
}

impl VariablePowerFactor {
    pub fn new(pf_min: f64, low_fraction: f64, rated_kva: f64) -> ControlResult<Self> {
        if !(0.0 < pf_min && pf_min <= 1.0) {
            return Err(ControlError::InvalidArg {
                what: "pf_min must be in (0, 1]",
            });
        }
        if !(0.0..1.0).contains(&low_fraction) {
            return Err(ControlError::InvalidArg {
                what: "low_fraction must be in [0, 1)",
            });
        }
        if rated_kva <= 0.0 {
            return Err(ControlError::InvalidArg {
                what: "rated_kva must be positive",
            });
        }
        Ok(Self {
            pf_min,
            low_fraction,
            rated_kva,
            q_prev_kvar: 0.0,
        })
    }

    fn pf_at(&self, loading: f64) -> f64 {
        if loading <= self.low_fraction {
            return 1.0;
        }
        let span = 1.0 - self.low_fraction;
        let t = ((loading - self.low_fraction) / span).clamp(0.0, 1.0);
        1.0 - t * (1.0 - self.pf_min)
    }
}

impl ControlAlgorithm for VariablePowerFactor {
    fn family(&self) -> &'static str {
        "VariablePowerFactor"
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
        let Some(kw) = handle
            .get_variable(ctx, "Powers")
            .map(|p| p.to_row().first().copied().unwrap_or(0.0))
        else {
            debug!(element = %handle.key(), "no power telemetry, pf control skipped");
            return Ok(0.0);
        };

        let loading = (kw / self.rated_kva).abs();
        let q_cmd = q_for(kw, self.pf_at(loading));
        handle.set_parameter(ctx, "kvar", &format!("{q_cmd}"))?;

        let error = (q_cmd - self.q_prev_kvar).abs() / self.rated_kva;
        self.q_prev_kvar = q_cmd;
        Ok(error)
    }
}
