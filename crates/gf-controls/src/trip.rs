//! Voltage trip/reconnect control.
//!
//! Runs in the last priority tier: disconnects the element when its voltage
//! leaves the permitted band and reconnects once it recovers. A state change
//! reports a unit error so the tier re-iterates against the re-solved
//! circuit; a quiescent pass reports zero.

use serde::{Deserialize, Serialize};
use tracing::debug;

use gf_solver::{ElementHandle, SolverContext};

use crate::algorithm::{ControlAlgorithm, Priority};
use crate::error::{ControlError, ControlResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoltageTrip {
    /// Voltage (pu) above which the element trips.
    pub v_trip_pu: f64,
    /// Voltage (pu) below which a tripped element reconnects.
    pub v_reconnect_pu: f64,
    #[serde(skip)]
    tripped: bool,
}

impl VoltageTrip {
    pub fn new(v_trip_pu: f64, v_reconnect_pu: f64) -> ControlResult<Self> {
        if v_reconnect_pu >= v_trip_pu {
            return Err(ControlError::InvalidArg {
                what: "v_reconnect_pu must be below v_trip_pu",
            });
        }
        Ok(Self {
            v_trip_pu,
            v_reconnect_pu,
            tripped: false,
        })
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }
}

impl ControlAlgorithm for VoltageTrip {
    fn family(&self) -> &'static str {
        "VoltageTrip"
    }

    fn priorities(&self) -> &'static [Priority] {
        &[Priority::Trip]
    }

    fn update(
        &mut self,
        _priority: Priority,
        handle: &ElementHandle,
        ctx: &mut SolverContext<'_>,
    ) -> ControlResult<f64> {
        let Some(v_pu) = handle.get_variable(ctx, "VoltagePu").and_then(|v| v.first()) else {
            debug!(element = %handle.key(), "no voltage telemetry, trip control skipped");
            return Ok(0.0);
        };

        if !self.tripped && v_pu > self.v_trip_pu {
            handle.set_parameter(ctx, "enabled", "false")?;
            self.tripped = true;
            return Ok(1.0);
        }
        if self.tripped && v_pu < self.v_reconnect_pu {
            handle.set_parameter(ctx, "enabled", "true")?;
            self.tripped = false;
            return Ok(1.0);
        }
        Ok(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gf_core::Id;
    use gf_solver::{ElementKey, SolverBackend, SyntheticFeeder};

    #[test]
    fn trips_then_reconnects() {
        let mut f = SyntheticFeeder::new(1.0, 7200.0, 900.0);
        f.add_bus("b1", 0.8, 0.8);
        f.add_generator("pv1", "b1", 120.0, 100.0);
        f.solve().unwrap();
        // 100 kW over r=0.8 pu/MW lifts the bus to 1.08 pu.

        let handle = ElementHandle::new(ElementKey::new("Generator", "pv1"), Id::from_index(2));
        let mut trip = VoltageTrip::new(1.05, 1.02).unwrap();

        let err = {
            let mut ctx = SolverContext::new(&mut f);
            trip.update(Priority::Trip, &handle, &mut ctx).unwrap()
        };
        assert_eq!(err, 1.0);
        assert!(trip.is_tripped());

        // With the generator out the voltage sags back to nominal and the
        // element reconnects on the next pass.
        f.resolve_without_controls().unwrap();
        let err = {
            let mut ctx = SolverContext::new(&mut f);
            trip.update(Priority::Trip, &handle, &mut ctx).unwrap()
        };
        assert_eq!(err, 1.0);
        assert!(!trip.is_tripped());
    }

    #[test]
    fn quiescent_inside_band() {
        let mut f = SyntheticFeeder::new(1.0, 7200.0, 900.0);
        f.add_bus("b1", 0.05, 0.05);
        f.add_generator("pv1", "b1", 120.0, 100.0);
        f.solve().unwrap();

        let handle = ElementHandle::new(ElementKey::new("Generator", "pv1"), Id::from_index(2));
        let mut trip = VoltageTrip::new(1.05, 1.02).unwrap();
        let mut ctx = SolverContext::new(&mut f);
        assert_eq!(trip.update(Priority::Trip, &handle, &mut ctx).unwrap(), 0.0);
    }

    #[test]
    fn rejects_inverted_band() {
        assert!(VoltageTrip::new(1.02, 1.05).is_err());
    }
}
