//! Solver capability trait and the explicit active-element cursor.
//!
//! The underlying solver has exactly one globally shared "active element"
//! cursor. Rather than leaving that as ambient global state, every operation
//! that needs it goes through a [`SolverContext`] borrow, so the cursor is a
//! visible parameter and its reentrancy hazards are testable with mocks.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::error::SolverResult;

/// Identity of one circuit element: `(class, instance)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementKey {
    pub class: String,
    pub name: String,
}

impl ElementKey {
    pub fn new(class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
        }
    }

    /// Parse `Class.instance` notation. Returns `None` when the dot is missing.
    pub fn parse(full: &str) -> Option<Self> {
        let (class, name) = full.split_once('.')?;
        if class.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(class, name))
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.name)
    }
}

/// Simulation mode of the solver clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverMode {
    Snapshot,
    Qsts,
    Harmonic,
}

impl fmt::Display for SolverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverMode::Snapshot => write!(f, "snapshot"),
            SolverMode::Qsts => write!(f, "qsts"),
            SolverMode::Harmonic => write!(f, "harmonic"),
        }
    }
}

/// Outcome of one solve call.
#[derive(Debug, Clone, Copy)]
pub struct SolveStatus {
    pub converged: bool,
    pub iterations: usize,
}

/// Shape of one solver-reported value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Scalar,
    Vector,
}

/// A solver-computed, read-only quantity.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl VariableValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            VariableValue::Scalar(_) => ValueKind::Scalar,
            VariableValue::Vector(_) => ValueKind::Vector,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            VariableValue::Scalar(_) => 1,
            VariableValue::Vector(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten to a row of f64 columns.
    pub fn to_row(&self) -> Vec<f64> {
        match self {
            VariableValue::Scalar(v) => vec![*v],
            VariableValue::Vector(v) => v.clone(),
        }
    }

    /// Scalar view; for vectors, the first entry.
    pub fn first(&self) -> Option<f64> {
        match self {
            VariableValue::Scalar(v) => Some(*v),
            VariableValue::Vector(v) => v.first().copied(),
        }
    }
}

/// Capability the external power-flow solver must expose.
///
/// All property and variable operations act on the currently active element;
/// callers go through [`SolverContext`] which pairs activation with access.
pub trait SolverBackend {
    /// Full power-flow solution, including the solver's own control actions.
    fn solve(&mut self) -> SolverResult<SolveStatus>;

    /// Cheaper re-solve that does not re-trigger the solver's control actions.
    /// Used inside the controller fixed-point iteration.
    fn resolve_without_controls(&mut self) -> SolverResult<SolveStatus>;

    /// Advance the solver's internal clock by one step resolution.
    fn advance_time_step(&mut self);

    /// Total elapsed simulated seconds.
    fn seconds(&self) -> f64;

    fn frequency_hz(&self) -> f64;
    fn set_frequency_hz(&mut self, hz: f64);

    fn mode(&self) -> SolverMode;
    fn set_mode(&mut self, mode: SolverMode);

    /// All circuit elements in solver traversal order (buses included, as
    /// class `Bus`).
    fn elements(&self) -> Vec<ElementKey>;

    /// Bus names in traversal order.
    fn buses(&self) -> Vec<String>;

    /// Move the global cursor. Returns false when the element is unknown.
    fn set_active(&mut self, key: &ElementKey) -> bool;

    /// Editable property names of the active element.
    fn parameter_names(&self) -> Vec<String>;

    /// Read-only variable names of the active element.
    fn variable_names(&self) -> Vec<String>;

    /// Read a property of the active element.
    fn get_parameter(&self, name: &str) -> Option<String>;

    /// Edit a property of the active element.
    fn set_parameter(&mut self, name: &str, value: &str) -> SolverResult<()>;

    /// Read a computed variable of the active element.
    fn get_variable(&self, name: &str) -> Option<VariableValue>;
}

/// Borrow of the solver carrying the active-element cursor discipline.
///
/// Holding a `SolverContext` is the only way to touch per-element state, and
/// no code may assume the cursor survives a call into another handle.
pub struct SolverContext<'a> {
    backend: &'a mut dyn SolverBackend,
}

impl<'a> SolverContext<'a> {
    pub fn new(backend: &'a mut dyn SolverBackend) -> Self {
        Self { backend }
    }

    /// Point the cursor at `key`. Returns false when the element is unknown.
    pub fn activate(&mut self, key: &ElementKey) -> bool {
        self.backend.set_active(key)
    }

    pub fn backend(&mut self) -> &mut dyn SolverBackend {
        self.backend
    }

    pub fn get_parameter(&self, name: &str) -> Option<String> {
        self.backend.get_parameter(name)
    }

    pub fn set_parameter(&mut self, name: &str, value: &str) -> SolverResult<()> {
        self.backend.set_parameter(name, value)
    }

    pub fn get_variable(&self, name: &str) -> Option<VariableValue> {
        self.backend.get_variable(name)
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.backend.parameter_names()
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.backend.variable_names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_key_parse() {
        let key = ElementKey::parse("Generator.pv1").unwrap();
        assert_eq!(key.class, "Generator");
        assert_eq!(key.name, "pv1");
        assert_eq!(key.to_string(), "Generator.pv1");

        assert!(ElementKey::parse("no-dot").is_none());
        assert!(ElementKey::parse(".empty").is_none());
    }

    #[test]
    fn variable_value_shapes() {
        let s = VariableValue::Scalar(3.5);
        assert_eq!(s.kind(), ValueKind::Scalar);
        assert_eq!(s.to_row(), vec![3.5]);

        let v = VariableValue::Vector(vec![1.0, 2.0]);
        assert_eq!(v.kind(), ValueKind::Vector);
        assert_eq!(v.len(), 2);
        assert_eq!(v.first(), Some(1.0));
    }
}
