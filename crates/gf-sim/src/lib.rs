//! gf-sim: per-timestep orchestration of the GridFlow engine.
//!
//! Compiles a scenario into a live circuit plus controller set, then drives
//! the fixed per-timestep sequence: overrides, external subscriptions,
//! controller convergence, optional frequency sweep, result collection,
//! publications, and time advancement.

pub mod compile;
pub mod driver;
pub mod error;

pub use compile::{CompiledScenario, compile_scenario};
pub use driver::{RunSummary, SimulationDriver, SOLVER_VERSION};
pub use error::{SimError, SimResult};
