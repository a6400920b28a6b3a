//! Error types for control operations.

use thiserror::Error;

/// Errors encountered while running controllers.
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Convergence failed at step {step}: {what}")]
    ConvergenceFailed { step: usize, what: String },

    #[error(transparent)]
    Solver(#[from] gf_solver::SolverError),
}

pub type ControlResult<T> = Result<T, ControlError>;
