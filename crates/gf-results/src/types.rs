//! Result data types.

use serde::{Deserialize, Serialize};

pub type RunId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: RunId,
    pub scenario_id: String,
    pub timestamp: String,
    pub solver_version: String,
    pub horizon_steps: usize,
    pub step_resolution_s: f64,
}

/// Grouping of tracked series into tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExportGroup {
    /// One table per (element, property).
    #[default]
    ByElement,
    /// One consolidated table per (class, property), columns side by side in
    /// traversal order.
    ByClass,
}

/// One row of the step-index table shared by every property table in a run:
/// row number maps to (timestamp, solver frequency, solver mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRow {
    pub timestamp: String,
    pub frequency_hz: f64,
    pub mode: String,
}

/// Sidecar attributes stored next to each chunked table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSidecar {
    /// Ordered column labels.
    pub columns: Vec<String>,
    /// Physical unit of the property, from the static unit table.
    pub unit: String,
    /// Logical rows actually written (distinct from allocated capacity).
    pub rows_written: usize,
    /// Allocated capacity in rows.
    pub capacity_rows: usize,
}
