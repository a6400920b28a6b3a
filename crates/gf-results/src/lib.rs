//! gf-results: chunked time-series buffering and the on-disk run store.
//!
//! One run directory holds a manifest, the run-settings snapshot, a
//! structured warning report, a shared step-index table, and one chunked
//! numeric table per tracked (target, property) pair.

pub mod buffer;
pub mod export;
pub mod hash;
pub mod report;
pub mod store;
pub mod types;

pub use buffer::{ChunkBuffer, chunk_rows};
pub use export::ExportReport;
pub use hash::compute_run_id;
pub use report::JsonlReport;
pub use store::{ResultStore, TrackedProperty};
pub use types::*;

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Column mismatch for {what}: expected {expected}, got {got}")]
    ColumnMismatch {
        what: String,
        expected: usize,
        got: usize,
    },

    #[error("Buffer capacity exceeded: {what} (capacity={capacity} rows)")]
    CapacityExceeded { what: String, capacity: usize },

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Invalid store state: {what}")]
    InvalidState { what: String },
}
