//! gf-cosim: co-simulation time coordination.
//!
//! The external broker is a collaborator behind the [`Federate`] trait; this
//! crate owns the time-advance negotiation ([`TimeAdvancer`]) and the input
//! sanitization applied to externally-published values before they reach the
//! control path.

pub mod advancer;
pub mod federate;
pub mod value;

pub use advancer::{CosimOptions, TimeAdvancer};
pub use federate::{Federate, IterationResult, LoopbackFederate};
pub use value::FedValue;

pub type CosimResult<T> = Result<T, CosimError>;

#[derive(thiserror::Error, Debug)]
pub enum CosimError {
    #[error("Federate error: {message}")]
    Federate { message: String },

    #[error("Unknown signal key: {key}")]
    UnknownKey { key: String },

    #[error("Invalid co-simulation option {what}: {message}")]
    InvalidOption {
        what: &'static str,
        message: String,
    },
}
