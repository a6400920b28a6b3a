//! Structured run warnings.
//!
//! Recoverable conditions never abort a run; they accumulate as warnings in a
//! machine-parseable report (one JSON object per warning) so partial
//! convergence or missing telemetry can be audited afterwards. The sink is a
//! trait so library crates can push warnings without knowing where the report
//! lives.

use serde::{Deserialize, Serialize};

/// Category tag for a run warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// A controller tier exhausted its iteration budget without converging.
    ControllerNotConverged,
    /// An override or subscription referenced an unknown element.
    UnknownElement,
    /// A controller class matched no elements in the loaded circuit.
    EmptyControllerClass,
    /// A single buffer failed to flush or export.
    ExportFailed,
    /// A subscribed co-simulation input was non-finite or out of range and
    /// was replaced by the nominal fallback.
    InputSubstituted,
}

/// One warning record in the per-run report log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunWarning {
    pub kind: WarningKind,
    /// Timestep the condition was observed at, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
    /// Controller name, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    /// Controlled or referenced element name, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    /// Algorithm family tag, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    /// Convergence error or offending value, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    pub message: String,
}

/// Destination for run warnings.
pub trait WarningSink {
    fn warn(&mut self, warning: RunWarning);
}

/// In-memory sink, used by tests and as a default.
#[derive(Debug, Default)]
pub struct VecSink {
    pub warnings: Vec<RunWarning>,
}

impl WarningSink for VecSink {
    fn warn(&mut self, warning: RunWarning) {
        self.warnings.push(warning);
    }
}
