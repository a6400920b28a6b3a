//! One controllable element paired with one control algorithm instance.

use gf_solver::{ElementHandle, SolverContext};

use crate::algorithm::{ControlAlgorithm, Priority};
use crate::error::ControlResult;

/// Wraps one controlled element plus one algorithm instance.
///
/// Controller names are unique within a simulation; exactly one
/// `ControlElement` exists per (element, controller) pair.
pub struct ControlElement {
    name: String,
    handle: ElementHandle,
    algorithm: Box<dyn ControlAlgorithm>,
    last_key: Option<(Priority, usize)>,
}

impl ControlElement {
    pub fn new(
        name: impl Into<String>,
        handle: ElementHandle,
        algorithm: Box<dyn ControlAlgorithm>,
    ) -> Self {
        Self {
            name: name.into(),
            handle,
            algorithm,
            last_key: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn element_name(&self) -> String {
        self.handle.key().to_string()
    }

    pub fn family(&self) -> &'static str {
        self.algorithm.family()
    }

    pub fn handle(&self) -> &ElementHandle {
        &self.handle
    }

    /// True when the algorithm dispatches an update function for `priority`.
    pub fn dispatches(&self, priority: Priority) -> bool {
        self.algorithm.priorities().contains(&priority)
    }

    /// Run one update; resets the algorithm's iteration state whenever the
    /// `(priority, timestep)` pair changes.
    pub fn update(
        &mut self,
        priority: Priority,
        step: usize,
        ctx: &mut SolverContext<'_>,
    ) -> ControlResult<f64> {
        let key = (priority, step);
        if self.last_key != Some(key) {
            self.algorithm.reset_iteration();
            self.last_key = Some(key);
        }
        self.algorithm.update(priority, &self.handle, ctx)
    }
}
