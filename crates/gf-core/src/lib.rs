//! gf-core: shared primitives for the GridFlow simulation engine.
//!
//! Provides:
//! - Compact element ids
//! - Phasor sample schema (magnitude/angle column convention)
//! - Static property-to-unit table
//! - Structured run-warning types and the `WarningSink` seam

pub mod ids;
pub mod phasor;
pub mod report;
pub mod units;

pub use ids::{ElementId, Id};
pub use phasor::PhasorSample;
pub use report::{RunWarning, VecSink, WarningKind, WarningSink};
pub use units::{labeled_header, unit_for};
