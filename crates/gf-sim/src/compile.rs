//! Scenario compilation: schema definitions to live circuit objects.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use gf_controls::{
    ConstantPowerFactor, ControlElement, VariablePowerFactor, VoltVar, VoltVarSettings, VoltWatt,
    VoltWattSettings, VoltageTrip,
};
use gf_core::{Id, RunWarning, WarningKind, WarningSink};
use gf_project::{CircuitDef, ControllerKind, GeneratorDef, ScenarioDef};
use gf_results::TrackedProperty;
use gf_solver::{ElementHandle, SolverBackend, SyntheticFeeder};

use crate::error::{SimError, SimResult};

/// A scenario resolved against a live backend.
pub struct CompiledScenario {
    pub backend: SyntheticFeeder,
    /// Handle per element, keyed by `Class.name`, in solver traversal order.
    pub handles: BTreeMap<String, ElementHandle>,
    /// Registration order is class-grouped then traversal order, which fixes
    /// the in-tier iteration order for the convergence loop.
    pub controllers: Vec<ControlElement>,
    pub tracked: Vec<TrackedProperty>,
}

pub fn compile_scenario(
    scenario: &ScenarioDef,
    sink: &mut dyn WarningSink,
) -> SimResult<CompiledScenario> {
    let backend = build_backend(&scenario.circuit);
    let handles = element_handles(&backend);
    let controllers = build_controllers(scenario, &handles, sink)?;
    let tracked = tracked_properties(scenario, &handles, sink);
    debug!(
        elements = handles.len(),
        controllers = controllers.len(),
        tracked = tracked.len(),
        "scenario compiled"
    );
    Ok(CompiledScenario {
        backend,
        handles,
        controllers,
        tracked,
    })
}

fn build_backend(circuit: &CircuitDef) -> SyntheticFeeder {
    let mut backend = SyntheticFeeder::new(circuit.source_pu, circuit.base_volts, 1.0);
    for bus in &circuit.buses {
        backend.add_bus(&bus.id, bus.r_sens_pu_per_mw, bus.x_sens_pu_per_mvar);
    }
    for generator in &circuit.generators {
        backend.add_generator(&generator.id, &generator.bus, generator.kva_rated, generator.kw);
        if let Some(profile) = &generator.profile {
            backend.set_profile(&generator.id, profile.clone());
        }
    }
    for load in &circuit.loads {
        backend.add_load(&load.id, &load.bus, load.kw, load.kvar);
    }
    backend
}

/// One handle per element (buses included), ids assigned by traversal order.
fn element_handles(backend: &SyntheticFeeder) -> BTreeMap<String, ElementHandle> {
    backend
        .elements()
        .into_iter()
        .enumerate()
        .map(|(i, key)| {
            let name = key.to_string();
            (name, ElementHandle::new(key, Id::from_index(i as u32)))
        })
        .collect()
}

/// Elements of `class` in solver traversal order.
fn class_members(backend_order: &BTreeMap<String, ElementHandle>, class: &str) -> Vec<String> {
    let mut members: Vec<&ElementHandle> = backend_order
        .values()
        .filter(|h| h.class() == class)
        .collect();
    members.sort_by_key(|h| h.id().index());
    members.iter().map(|h| h.key().to_string()).collect()
}

fn build_controllers(
    scenario: &ScenarioDef,
    handles: &BTreeMap<String, ElementHandle>,
    sink: &mut dyn WarningSink,
) -> SimResult<Vec<ControlElement>> {
    let mut controllers = Vec::new();

    for attachment in &scenario.controllers {
        let targets: Vec<String> = if attachment.elements.is_empty() {
            class_members(handles, &attachment.element_class)
        } else {
            attachment
                .elements
                .iter()
                .map(|e| format!("{}.{}", attachment.element_class, e))
                .collect()
        };

        if targets.is_empty() {
            warn!(
                controller = attachment.name,
                class = attachment.element_class,
                "controller class matched no elements"
            );
            sink.warn(RunWarning {
                kind: WarningKind::EmptyControllerClass,
                step: None,
                controller: Some(attachment.name.clone()),
                element: None,
                family: None,
                value: None,
                message: format!("no {} elements in circuit", attachment.element_class),
            });
            continue;
        }

        for target in targets {
            let Some(handle) = handles.get(&target) else {
                warn!(controller = attachment.name, element = %target, "controller target not found");
                sink.warn(RunWarning {
                    kind: WarningKind::UnknownElement,
                    step: None,
                    controller: Some(attachment.name.clone()),
                    element: Some(target.clone()),
                    family: None,
                    value: None,
                    message: "controller target not in circuit".to_string(),
                });
                continue;
            };
            let rating = generator_rating(&scenario.circuit, handle.name());
            let algorithm = instantiate(&attachment.kind, rating).map_err(|e| SimError::Setup {
                what: format!("controller {} on {target}: {e}", attachment.name),
            })?;
            let name = format!("{}.{}", attachment.name, handle.name());
            controllers.push(ControlElement::new(name, handle.clone(), algorithm));
        }
    }
    Ok(controllers)
}

fn generator_rating<'a>(circuit: &'a CircuitDef, name: &str) -> Option<&'a GeneratorDef> {
    circuit.generators.iter().find(|g| g.id == name)
}

fn instantiate(
    kind: &ControllerKind,
    rating: Option<&GeneratorDef>,
) -> Result<Box<dyn gf_controls::ControlAlgorithm>, gf_controls::ControlError> {
    // Trip control needs no rating; everything else normalizes against the
    // element's rated apparent power.
    let rated_kva = rating.map(|g| g.kva_rated).unwrap_or(1.0);
    let rated_kw = rating.map(|g| g.kw).unwrap_or(1.0);

    Ok(match kind {
        ControllerKind::VoltVar {
            curve,
            damping,
            cut_in_fraction,
        } => Box::new(VoltVar::new(VoltVarSettings {
            curve: curve.clone(),
            rated_kva,
            damping: *damping,
            cut_in_fraction: *cut_in_fraction,
        })?),
        ControllerKind::VoltWatt {
            v_start_pu,
            v_full_pu,
            damping,
        } => Box::new(VoltWatt::new(VoltWattSettings {
            v_start_pu: *v_start_pu,
            v_full_pu: *v_full_pu,
            rated_kw,
            rated_kva,
            damping: *damping,
        })?),
        ControllerKind::ConstantPowerFactor { pf } => {
            Box::new(ConstantPowerFactor::new(*pf, rated_kva)?)
        }
        ControllerKind::VariablePowerFactor {
            pf_min,
            low_fraction,
        } => Box::new(VariablePowerFactor::new(*pf_min, *low_fraction, rated_kva)?),
        ControllerKind::VoltageTrip {
            v_trip_pu,
            v_reconnect_pu,
        } => Box::new(VoltageTrip::new(*v_trip_pu, *v_reconnect_pu)?),
    })
}

fn tracked_properties(
    scenario: &ScenarioDef,
    handles: &BTreeMap<String, ElementHandle>,
    sink: &mut dyn WarningSink,
) -> Vec<TrackedProperty> {
    let mut tracked = Vec::new();
    for target in &scenario.exports.targets {
        let members: Vec<String> = if target.elements.is_empty() {
            class_members(handles, &target.element_class)
        } else {
            target
                .elements
                .iter()
                .map(|e| format!("{}.{}", target.element_class, e))
                .collect()
        };
        for member in members {
            let Some(handle) = handles.get(&member) else {
                warn!(element = %member, "export target not in circuit");
                sink.warn(RunWarning {
                    kind: WarningKind::UnknownElement,
                    step: None,
                    controller: None,
                    element: Some(member.clone()),
                    family: None,
                    value: None,
                    message: "export target not in circuit".to_string(),
                });
                continue;
            };
            for property in &target.properties {
                tracked.push(TrackedProperty {
                    target: handle.clone(),
                    property: property.clone(),
                });
            }
        }
    }
    tracked
}

#[cfg(test)]
mod tests {
    use super::*;
    use gf_core::VecSink;
    use gf_project::*;

    fn scenario() -> ScenarioDef {
        ScenarioDef {
            id: "base".to_string(),
            name: "Base".to_string(),
            circuit: CircuitDef {
                source_pu: 1.0,
                base_volts: 7200.0,
                buses: vec![BusDef {
                    id: "b1".to_string(),
                    r_sens_pu_per_mw: 0.05,
                    x_sens_pu_per_mvar: 0.08,
                }],
                generators: vec![
                    GeneratorDef {
                        id: "pv1".to_string(),
                        bus: "b1".to_string(),
                        kva_rated: 100.0,
                        kw: 80.0,
                        profile: None,
                    },
                    GeneratorDef {
                        id: "pv2".to_string(),
                        bus: "b1".to_string(),
                        kva_rated: 50.0,
                        kw: 40.0,
                        profile: None,
                    },
                ],
                loads: vec![LoadDef {
                    id: "l1".to_string(),
                    bus: "b1".to_string(),
                    kw: 150.0,
                    kvar: 40.0,
                }],
            },
            simulation: SimulationDef {
                mode: SimulationModeDef::Qsts,
                horizon_steps: 4,
                step_resolution_s: 900.0,
                start_time: "2020-01-01T00:00:00".to_string(),
                error_tolerance: 1e-3,
                max_control_iterations: 10,
                max_error_threshold: None,
                frequency_sweep: None,
            },
            controllers: vec![ControllerAttachment {
                name: "vv".to_string(),
                element_class: "Generator".to_string(),
                elements: vec![],
                kind: ControllerKind::VoltVar {
                    curve: vec![(0.95, 0.44), (0.98, 0.0), (1.02, 0.0), (1.05, -0.44)],
                    damping: 0.0,
                    cut_in_fraction: 0.1,
                },
            }],
            exports: ExportDef {
                group: ExportGroupDef::ByElement,
                max_chunk_bytes: 1024,
                targets: vec![ExportTargetDef {
                    element_class: "Generator".to_string(),
                    elements: vec![],
                    properties: vec!["Powers".to_string(), "VoltagePu".to_string()],
                }],
            },
            cosim: None,
            overrides: vec![],
        }
    }

    #[test]
    fn class_attachment_expands_in_traversal_order() {
        let mut sink = VecSink::default();
        let compiled = compile_scenario(&scenario(), &mut sink).unwrap();

        let names: Vec<&str> = compiled.controllers.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["vv.pv1", "vv.pv2"]);
        assert!(sink.warnings.is_empty());
    }

    #[test]
    fn empty_class_warns_and_continues() {
        let mut s = scenario();
        s.controllers[0].element_class = "Storage".to_string();
        let mut sink = VecSink::default();
        let compiled = compile_scenario(&s, &mut sink).unwrap();

        assert!(compiled.controllers.is_empty());
        assert_eq!(sink.warnings.len(), 1);
        assert_eq!(sink.warnings[0].kind, WarningKind::EmptyControllerClass);
    }

    #[test]
    fn unknown_export_element_warns_and_skips() {
        let mut s = scenario();
        s.exports.targets[0].elements = vec!["pv1".to_string(), "ghost".to_string()];
        let mut sink = VecSink::default();
        let compiled = compile_scenario(&s, &mut sink).unwrap();

        // pv1 keeps both properties, ghost contributes none.
        assert_eq!(compiled.tracked.len(), 2);
        assert_eq!(sink.warnings.len(), 1);
        assert_eq!(sink.warnings[0].kind, WarningKind::UnknownElement);
    }

    #[test]
    fn circuit_matches_definition() {
        let mut sink = VecSink::default();
        let mut compiled = compile_scenario(&scenario(), &mut sink).unwrap();
        compiled.backend.solve().unwrap();

        assert!(compiled.handles.contains_key("Bus.b1"));
        assert!(compiled.handles.contains_key("Generator.pv2"));
        assert!(compiled.handles.contains_key("Load.l1"));
        assert!(compiled.handles.contains_key("Vsource.source"));
    }
}
