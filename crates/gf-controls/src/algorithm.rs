//! Controller algorithm seam and priority tiers.

use serde::{Deserialize, Serialize};

use gf_solver::{ElementHandle, SolverContext};

use crate::error::ControlResult;

/// Ordered priority tiers a controller's update functions run under.
///
/// Tiers are iterated strictly in this order within a timestep; a tier must
/// converge (or exhaust its iteration budget) before the next begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Reactive power control.
    Var,
    /// Active power curtailment.
    WattLimiting,
    /// Disconnect/reconnect decisions.
    Trip,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Var, Priority::WattLimiting, Priority::Trip];

    pub fn index(self) -> usize {
        match self {
            Priority::Var => 0,
            Priority::WattLimiting => 1,
            Priority::Trip => 2,
        }
    }
}

/// One control algorithm instance, attached to a single element.
///
/// `update` reads the element's live state through the handle, issues property
/// edits, and reports a non-negative convergence error: how far the last
/// commanded output is from a stable value, normalized so errors from
/// different controllers are comparable under `max()`. Returning `0` while a
/// disconnect condition is active is a valid fixed point, not a skipped
/// evaluation.
pub trait ControlAlgorithm {
    /// Algorithm family tag used in warnings and reports.
    fn family(&self) -> &'static str;

    /// Priority tiers this algorithm's update dispatches under.
    fn priorities(&self) -> &'static [Priority];

    /// Run one update for `priority`; returns the convergence error.
    fn update(
        &mut self,
        priority: Priority,
        handle: &ElementHandle,
        ctx: &mut SolverContext<'_>,
    ) -> ControlResult<f64>;

    /// Called whenever `(priority, timestep)` changes, before the first
    /// update of the new pair.
    fn reset_iteration(&mut self) {}
}

/// Piecewise-linear interpolation over `(x, y)` points sorted by `x`,
/// clamped at both ends. Shared by the curve-based families.
pub(crate) fn interp(points: &[(f64, f64)], x: f64) -> f64 {
    debug_assert!(points.len() >= 2);
    if x <= points[0].0 {
        return points[0].1;
    }
    for pair in points.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if x <= x1 {
            if x1 == x0 {
                return y1;
            }
            return y0 + (y1 - y0) * (x - x0) / (x1 - x0);
        }
    }
    points[points.len() - 1].1
}
