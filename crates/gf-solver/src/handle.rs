//! Uniform per-element accessor.
//!
//! One `ElementHandle` exists per circuit element (and per bus). The handle
//! stores identity only; every read or write borrows a [`SolverContext`] and
//! re-activates the element first, because the solver's active-element cursor
//! does not survive calls through other handles.
//!
//! Variable reads fail softly: an element that cannot be made active yields
//! `None` and a debug-level log, never an error. The timestep loop prefers
//! continuity over strict completeness of telemetry.

use std::cell::OnceCell;
use std::collections::BTreeSet;

use gf_core::ElementId;
use tracing::debug;

use crate::backend::{ElementKey, SolverContext, ValueKind, VariableValue};
use crate::error::SolverResult;

#[derive(Debug, Clone)]
pub struct ElementHandle {
    key: ElementKey,
    id: ElementId,
    // Attribute sets are discovered lazily on first introspection so that
    // handle construction never touches the solver cursor.
    parameters: OnceCell<BTreeSet<String>>,
    variables: OnceCell<BTreeSet<String>>,
}

impl ElementHandle {
    /// `id` is the element's position in solver traversal order.
    pub fn new(key: ElementKey, id: ElementId) -> Self {
        Self {
            key,
            id,
            parameters: OnceCell::new(),
            variables: OnceCell::new(),
        }
    }

    pub fn key(&self) -> &ElementKey {
        &self.key
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn class(&self) -> &str {
        &self.key.class
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    fn parameters(&self, ctx: &mut SolverContext<'_>) -> &BTreeSet<String> {
        self.parameters.get_or_init(|| {
            if ctx.activate(&self.key) {
                ctx.parameter_names().into_iter().collect()
            } else {
                BTreeSet::new()
            }
        })
    }

    fn variables(&self, ctx: &mut SolverContext<'_>) -> &BTreeSet<String> {
        self.variables.get_or_init(|| {
            if ctx.activate(&self.key) {
                ctx.variable_names().into_iter().collect()
            } else {
                BTreeSet::new()
            }
        })
    }

    /// Read an editable property. `None` when the element cannot be made
    /// active or the name is unknown; both are non-fatal.
    pub fn get_parameter(&self, ctx: &mut SolverContext<'_>, name: &str) -> Option<String> {
        if !self.parameters(ctx).contains(name) {
            debug!(element = %self.key, property = name, "invalid parameter");
            return None;
        }
        if !ctx.activate(&self.key) {
            debug!(element = %self.key, "element not active, parameter read skipped");
            return None;
        }
        ctx.get_parameter(name)
    }

    /// Edit a property and immediately re-read it (round-trip verification).
    /// Returns the re-read value, or `Ok(None)` when the element or name is
    /// unknown. Backend edit failures propagate.
    pub fn set_parameter(
        &self,
        ctx: &mut SolverContext<'_>,
        name: &str,
        value: &str,
    ) -> SolverResult<Option<String>> {
        if !self.parameters(ctx).contains(name) {
            debug!(element = %self.key, property = name, "invalid parameter, edit skipped");
            return Ok(None);
        }
        if !ctx.activate(&self.key) {
            debug!(element = %self.key, "element not active, edit skipped");
            return Ok(None);
        }
        ctx.set_parameter(name, value)?;
        Ok(ctx.get_parameter(name))
    }

    /// Read a solver-computed variable. Soft-fails to `None`.
    pub fn get_variable(&self, ctx: &mut SolverContext<'_>, name: &str) -> Option<VariableValue> {
        if !self.variables(ctx).contains(name) {
            debug!(element = %self.key, variable = name, "invalid variable");
            return None;
        }
        if !ctx.activate(&self.key) {
            debug!(element = %self.key, "element not active, variable read skipped");
            return None;
        }
        ctx.get_variable(name)
    }

    /// True iff `name` appears in exactly one of the two attribute sets.
    pub fn is_valid_attribute(&self, ctx: &mut SolverContext<'_>, name: &str) -> bool {
        let in_params = self.parameters(ctx).contains(name);
        let in_vars = self.variables(ctx).contains(name);
        in_params ^ in_vars
    }

    /// Column count and value kind for `name`, probed from one sample value.
    /// Used by the export configuration resolver before the run starts.
    pub fn data_length(
        &self,
        ctx: &mut SolverContext<'_>,
        name: &str,
    ) -> Option<(usize, ValueKind)> {
        if self.variables(ctx).contains(name) {
            let sample = self.get_variable(ctx, name)?;
            return Some((sample.len(), sample.kind()));
        }
        if self.parameters(ctx).contains(name) {
            return Some((1, ValueKind::Scalar));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SolverBackend;
    use crate::synthetic::SyntheticFeeder;
    use gf_core::Id;

    fn feeder() -> SyntheticFeeder {
        let mut f = SyntheticFeeder::new(1.0, 7200.0, 1.0);
        f.add_bus("b1", 0.02, 0.01);
        f.add_generator("pv1", "b1", 100.0, 80.0);
        f.add_load("l1", "b1", 120.0, 30.0);
        f
    }

    fn handle_for(backend: &dyn SolverBackend, class: &str, name: &str) -> ElementHandle {
        let keys = backend.elements();
        let (i, key) = keys
            .iter()
            .enumerate()
            .find(|(_, k)| k.class == class && k.name == name)
            .unwrap();
        ElementHandle::new(key.clone(), Id::from_index(i as u32))
    }

    #[test]
    fn parameter_round_trip() {
        let mut f = feeder();
        let h = handle_for(&f, "Generator", "pv1");
        let mut ctx = SolverContext::new(&mut f);

        let echoed = h.set_parameter(&mut ctx, "kvar", "12.5").unwrap();
        assert_eq!(echoed.as_deref(), Some("12.5"));
        assert_eq!(h.get_parameter(&mut ctx, "kvar").as_deref(), Some("12.5"));
    }

    #[test]
    fn unknown_parameter_is_non_fatal() {
        let mut f = feeder();
        let h = handle_for(&f, "Generator", "pv1");
        let mut ctx = SolverContext::new(&mut f);

        assert_eq!(h.get_parameter(&mut ctx, "no_such"), None);
        assert_eq!(h.set_parameter(&mut ctx, "no_such", "1").unwrap(), None);
    }

    #[test]
    fn variable_read_soft_fails_on_unknown_element() {
        let mut f = feeder();
        // Handle for an element the solver does not know about.
        let h = ElementHandle::new(ElementKey::new("Generator", "ghost"), Id::from_index(99));
        let mut ctx = SolverContext::new(&mut f);

        assert_eq!(h.get_variable(&mut ctx, "Voltages"), None);
    }

    #[test]
    fn attribute_validity_is_exclusive() {
        let mut f = feeder();
        f.solve().unwrap();
        let h = handle_for(&f, "Generator", "pv1");
        let mut ctx = SolverContext::new(&mut f);

        assert!(h.is_valid_attribute(&mut ctx, "kvar")); // parameter
        assert!(h.is_valid_attribute(&mut ctx, "Voltages")); // variable
        assert!(!h.is_valid_attribute(&mut ctx, "no_such"));
    }

    #[test]
    fn data_length_probes_shape() {
        let mut f = feeder();
        f.solve().unwrap();
        let h = handle_for(&f, "Generator", "pv1");
        let mut ctx = SolverContext::new(&mut f);

        let (n, kind) = h.data_length(&mut ctx, "Voltages").unwrap();
        assert_eq!(kind, ValueKind::Vector);
        assert_eq!(n, 2); // one magnitude/angle pair

        let (n, kind) = h.data_length(&mut ctx, "kw").unwrap();
        assert_eq!((n, kind), (1, ValueKind::Scalar));
    }
}
