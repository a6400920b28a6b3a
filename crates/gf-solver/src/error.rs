//! Error types for solver interactions.

use thiserror::Error;

/// Errors surfaced across the solver seam.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Circuit failed to compile: {what}")]
    CompileFailed { what: String },

    #[error("Solver did not converge: {what}")]
    NotConverged { what: String },

    #[error("Unknown element: {name}")]
    UnknownElement { name: String },

    #[error("Unknown property '{property}' on {element}")]
    UnknownProperty { element: String, property: String },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Backend error: {message}")]
    Backend { message: String },
}

pub type SolverResult<T> = Result<T, SolverError>;
