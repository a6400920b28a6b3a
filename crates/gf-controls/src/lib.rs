//! gf-controls: local controller algorithms and the per-timestep
//! convergence loop.
//!
//! Controllers attach to circuit elements and are driven to a fixed point
//! across ordered priority tiers each timestep. Algorithm families:
//! - Constant and variable power factor
//! - Volt-var (reactive power vs. voltage curve)
//! - Volt-watt (active power curtailment at high voltage)
//! - Trip/reconnect (voltage cutoff)

pub mod algorithm;
pub mod convergence;
pub mod element;
pub mod error;
pub mod power_factor;
pub mod trip;
pub mod volt_var;
pub mod volt_watt;

pub use algorithm::{ControlAlgorithm, Priority};
pub use convergence::{ConvergenceOptions, ConvergenceOutcome, run_step};
pub use element::ControlElement;
pub use error::{ControlError, ControlResult};
pub use power_factor::{ConstantPowerFactor, VariablePowerFactor};
pub use trip::VoltageTrip;
pub use volt_var::{VoltVar, VoltVarSettings};
pub use volt_watt::{VoltWatt, VoltWattSettings};
