//! Volt-watt control: active power curtailment at high voltage.

use serde::{Deserialize, Serialize};
use tracing::debug;

use gf_solver::{ElementHandle, SolverContext};

use crate::algorithm::{ControlAlgorithm, Priority};
use crate::error::{ControlError, ControlResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoltWattSettings {
    /// Voltage (pu) at which curtailment begins.
    pub v_start_pu: f64,
    /// Voltage (pu) at which output is fully curtailed.
    pub v_full_pu: f64,
    /// Rated active power (kW) the curtailment fraction applies to.
    pub rated_kw: f64,
    /// Rated apparent power (kVA); errors are normalized to this.
    pub rated_kva: f64,
    /// Blend factor toward the previous command, in `[0, 1)`.
    pub damping: f64,
}

impl VoltWattSettings {
    pub fn validate(&self) -> ControlResult<()> {
        if self.v_full_pu <= self.v_start_pu {
            return Err(ControlError::InvalidArg {
                what: "v_full_pu must exceed v_start_pu",
            });
        }
        if self.rated_kw <= 0.0 || self.rated_kva <= 0.0 {
            return Err(ControlError::InvalidArg {
                what: "ratings must be positive",
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

#[derive(Debug, Clone)]
pub struct VoltWatt {
    settings: VoltWattSettings,
    kw_prev: f64,
}

impl VoltWatt {
    pub fn new(settings: VoltWattSettings) -> ControlResult<Self> {
        settings.validate()?;
        let kw_prev = settings.rated_kw;
        Ok(Self { settings, kw_prev })
    }
}

impl ControlAlgorithm for VoltWatt {
    fn family(&self) -> &'static str {
        "VoltWatt"
    }

    fn priorities(&self) -> &'static [Priority] {
        &[Priority::WattLimiting]
    }

    fn update(
        &mut self,
        _priority: Priority,
        handle: &ElementHandle,
        ctx: &mut SolverContext<'_>,
    ) -> ControlResult<f64> {
        let Some(v_pu) = handle.get_variable(ctx, "VoltagePu").and_then(|v| v.first()) else {
            debug!(element = %handle.key(), "no voltage telemetry, volt-watt skipped");
            return Ok(0.0);
        };

        let span = self.settings.v_full_pu - self.settings.v_start_pu;
        let fraction = (1.0 - (v_pu - self.settings.v_start_pu) / span).clamp(0.0, 1.0);
        let kw_target = fraction * self.settings.rated_kw;
        let kw_cmd = self.settings.damping * self.kw_prev
            + (1.0 - self.settings.damping) * kw_target;

        handle.set_parameter(ctx, "kw", &format!("{kw_cmd}"))?;

        let error = (kw_cmd - self.kw_prev).abs() / self.settings.rated_kva;
        self.kw_prev = kw_cmd;
        Ok(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gf_core::Id;
    use gf_solver::{ElementKey, SolverBackend, SyntheticFeeder};

    fn settings() -> VoltWattSettings {
        VoltWattSettings {
            v_start_pu: 1.03,
            v_full_pu: 1.08,
            rated_kw: 100.0,
            rated_kva: 110.0,
            damping: 0.0,
        }
    }

    #[test]
    fn curtails_when_voltage_is_high() {
        let mut f = SyntheticFeeder::new(1.0, 7200.0, 900.0);
        f.add_bus("b1", 0.5, 0.5);
        f.add_generator("pv1", "b1", 110.0, 100.0);
        f.solve().unwrap();
        // 100 kW over r=0.5 pu/MW lifts the bus to 1.05 pu.

        let handle = ElementHandle::new(ElementKey::new("Generator", "pv1"), Id::from_index(2));
        let mut vw = VoltWatt::new(settings()).unwrap();
        let err = {
            let mut ctx = SolverContext::new(&mut f);
            vw.update(Priority::WattLimiting, &handle, &mut ctx).unwrap()
        };
        assert!(err > 0.0);

        let mut ctx = SolverContext::new(&mut f);
        let kw: f64 = handle
            .get_parameter(&mut ctx, "kw")
            .unwrap()
            .parse()
            .unwrap();
        assert!(kw < 100.0);
    }

    #[test]
    fn no_curtailment_below_start_voltage() {
        let mut f = SyntheticFeeder::new(1.0, 7200.0, 900.0);
        f.add_bus("b1", 0.05, 0.05);
        f.add_generator("pv1", "b1", 110.0, 100.0);
        f.solve().unwrap();

        let handle = ElementHandle::new(ElementKey::new("Generator", "pv1"), Id::from_index(2));
        let mut vw = VoltWatt::new(settings()).unwrap();
        let mut ctx = SolverContext::new(&mut f);
        let err = vw.update(Priority::WattLimiting, &handle, &mut ctx).unwrap();
        assert_eq!(err, 0.0);
        let kw: f64 = handle
            .get_parameter(&mut ctx, "kw")
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(kw, 100.0);
    }

    #[test]
    fn rejects_inverted_voltage_band() {
        let bad = VoltWattSettings {
            v_start_pu: 1.08,
            v_full_pu: 1.03,
            ..settings()
        };
        assert!(VoltWatt::new(bad).is_err());
    }
}
