//! gf-solver: the power-flow solver seam.
//!
//! The solver itself is an external collaborator; this crate defines the
//! capability it must expose ([`SolverBackend`]), the explicit active-element
//! cursor discipline ([`SolverContext`]), the uniform per-element accessor
//! ([`ElementHandle`]), and a deterministic synthetic feeder backend used for
//! tests and broker-less runs.

pub mod backend;
pub mod error;
pub mod handle;
pub mod synthetic;

pub use backend::{
    ElementKey, SolveStatus, SolverBackend, SolverContext, SolverMode, ValueKind, VariableValue,
};
pub use error::{SolverError, SolverResult};
pub use handle::ElementHandle;
pub use synthetic::SyntheticFeeder;
