//! Scenario validation logic.

use std::collections::HashSet;

use crate::schema::{
    CircuitDef, ControllerKind, Project, ScenarioDef, SimulationDef,
};

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

pub fn validate_project(project: &Project) -> Result<(), ValidationError> {
    if project.version > crate::schema::LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: project.version,
        });
    }

    let mut scenario_ids = HashSet::new();
    for scenario in &project.scenarios {
        if !scenario_ids.insert(&scenario.id) {
            return Err(ValidationError::DuplicateId {
                id: scenario.id.clone(),
                context: "scenarios".to_string(),
            });
        }
        validate_scenario(scenario)?;
    }
    Ok(())
}

fn validate_scenario(scenario: &ScenarioDef) -> Result<(), ValidationError> {
    validate_circuit(&scenario.circuit)?;
    validate_simulation(&scenario.simulation)?;

    let mut controller_names = HashSet::new();
    for controller in &scenario.controllers {
        if !controller_names.insert(&controller.name) {
            return Err(ValidationError::DuplicateId {
                id: controller.name.clone(),
                context: format!("controllers of {}", scenario.id),
            });
        }
        validate_controller_kind(&controller.name, &controller.kind)?;
    }

    for target in &scenario.exports.targets {
        if target.properties.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: format!("exports.{}.properties", target.element_class),
                value: "[]".to_string(),
                reason: "at least one property required".to_string(),
            });
        }
    }

    if let Some(cosim) = &scenario.cosim {
        if cosim.max_iterations == 0 {
            return Err(ValidationError::InvalidValue {
                field: "cosim.max_iterations".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let mut keys = HashSet::new();
        for sub in &cosim.subscriptions {
            if !keys.insert(&sub.key) {
                return Err(ValidationError::DuplicateId {
                    id: sub.key.clone(),
                    context: "cosim subscriptions".to_string(),
                });
            }
        }
    }

    Ok(())
}

fn validate_circuit(circuit: &CircuitDef) -> Result<(), ValidationError> {
    if circuit.base_volts <= 0.0 {
        return Err(ValidationError::InvalidValue {
            field: "circuit.base_volts".to_string(),
            value: circuit.base_volts.to_string(),
            reason: "must be positive".to_string(),
        });
    }

    let mut bus_ids = HashSet::new();
    for bus in &circuit.buses {
        if !bus_ids.insert(&bus.id) {
            return Err(ValidationError::DuplicateId {
                id: bus.id.clone(),
                context: "buses".to_string(),
            });
        }
    }

    let mut element_ids = HashSet::new();
    for generator in &circuit.generators {
        if !element_ids.insert(&generator.id) {
            return Err(ValidationError::DuplicateId {
                id: generator.id.clone(),
                context: "generators".to_string(),
            });
        }
        if !bus_ids.contains(&generator.bus) {
            return Err(ValidationError::MissingReference {
                id: generator.bus.clone(),
                context: format!("generator {} bus", generator.id),
            });
        }
        if generator.kva_rated <= 0.0 {
            return Err(ValidationError::InvalidValue {
                field: format!("generator {} kva_rated", generator.id),
                value: generator.kva_rated.to_string(),
                reason: "must be positive".to_string(),
            });
        }
    }
    for load in &circuit.loads {
        if !element_ids.insert(&load.id) {
            return Err(ValidationError::DuplicateId {
                id: load.id.clone(),
                context: "loads".to_string(),
            });
        }
        if !bus_ids.contains(&load.bus) {
            return Err(ValidationError::MissingReference {
                id: load.bus.clone(),
                context: format!("load {} bus", load.id),
            });
        }
    }
    Ok(())
}

fn validate_simulation(simulation: &SimulationDef) -> Result<(), ValidationError> {
    if simulation.horizon_steps == 0 {
        return Err(ValidationError::InvalidValue {
            field: "simulation.horizon_steps".to_string(),
            value: "0".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    if simulation.step_resolution_s <= 0.0 {
        return Err(ValidationError::InvalidValue {
            field: "simulation.step_resolution_s".to_string(),
            value: simulation.step_resolution_s.to_string(),
            reason: "must be positive".to_string(),
        });
    }
    if simulation.error_tolerance <= 0.0 {
        return Err(ValidationError::InvalidValue {
            field: "simulation.error_tolerance".to_string(),
            value: simulation.error_tolerance.to_string(),
            reason: "must be positive".to_string(),
        });
    }
    if simulation.max_control_iterations == 0 {
        return Err(ValidationError::InvalidValue {
            field: "simulation.max_control_iterations".to_string(),
            value: "0".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    if let Some(sweep) = &simulation.frequency_sweep {
        if sweep.points == 0 || sweep.stop_hz < sweep.start_hz {
            return Err(ValidationError::InvalidValue {
                field: "simulation.frequency_sweep".to_string(),
                value: format!("{}..{} x{}", sweep.start_hz, sweep.stop_hz, sweep.points),
                reason: "need at least one point and stop >= start".to_string(),
            });
        }
    }
    Ok(())
}

fn validate_controller_kind(name: &str, kind: &ControllerKind) -> Result<(), ValidationError> {
    match kind {
        ControllerKind::VoltVar {
            curve,
            damping,
            cut_in_fraction,
        } => {
            if curve.len() < 2 {
                return Err(ValidationError::InvalidValue {
                    field: format!("controller {name} curve"),
                    value: format!("{} points", curve.len()),
                    reason: "need at least two breakpoints".to_string(),
                });
            }
            if !curve.windows(2).all(|w| w[0].0 < w[1].0) {
                return Err(ValidationError::InvalidValue {
                    field: format!("controller {name} curve"),
                    value: format!("{curve:?}"),
                    reason: "voltage breakpoints must strictly increase".to_string(),
                });
            }
            if !(0.0..1.0).contains(damping) {
                return Err(ValidationError::InvalidValue {
                    field: format!("controller {name} damping"),
                    value: damping.to_string(),
                    reason: "must be in [0, 1)".to_string(),
                });
            }
            if !(0.0..1.0).contains(cut_in_fraction) {
                return Err(ValidationError::InvalidValue {
                    field: format!("controller {name} cut_in_fraction"),
                    value: cut_in_fraction.to_string(),
                    reason: "must be in [0, 1)".to_string(),
                });
            }
        }
        ControllerKind::VoltWatt {
            v_start_pu,
            v_full_pu,
            damping,
        } => {
            if v_full_pu <= v_start_pu {
                return Err(ValidationError::InvalidValue {
                    field: format!("controller {name} v_full_pu"),
                    value: v_full_pu.to_string(),
                    reason: "must exceed v_start_pu".to_string(),
                });
            }
            if !(0.0..1.0).contains(damping) {
                return Err(ValidationError::InvalidValue {
                    field: format!("controller {name} damping"),
                    value: damping.to_string(),
                    reason: "must be in [0, 1)".to_string(),
                });
            }
        }
        ControllerKind::ConstantPowerFactor { pf } => {
            if !(*pf > 0.0 && *pf <= 1.0) {
                return Err(ValidationError::InvalidValue {
                    field: format!("controller {name} pf"),
                    value: pf.to_string(),
                    reason: "must be in (0, 1]".to_string(),
                });
            }
        }
        ControllerKind::VariablePowerFactor {
            pf_min,
            low_fraction,
        } => {
            if !(*pf_min > 0.0 && *pf_min <= 1.0) {
                return Err(ValidationError::InvalidValue {
                    field: format!("controller {name} pf_min"),
                    value: pf_min.to_string(),
                    reason: "must be in (0, 1]".to_string(),
                });
            }
            if !(0.0..1.0).contains(low_fraction) {
                return Err(ValidationError::InvalidValue {
                    field: format!("controller {name} low_fraction"),
                    value: low_fraction.to_string(),
                    reason: "must be in [0, 1)".to_string(),
                });
            }
        }
        ControllerKind::VoltageTrip {
            v_trip_pu,
            v_reconnect_pu,
        } => {
            if v_reconnect_pu <= v_trip_pu {
                return Err(ValidationError::InvalidValue {
                    field: format!("controller {name} v_reconnect_pu"),
                    value: v_reconnect_pu.to_string(),
                    reason: "must exceed v_trip_pu".to_string(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::*;

    fn scenario() -> ScenarioDef {
        ScenarioDef {
            id: "base".to_string(),
            name: "Base case".to_string(),
            circuit: CircuitDef {
                source_pu: 1.0,
                base_volts: 7200.0,
                buses: vec![BusDef {
                    id: "b1".to_string(),
                    r_sens_pu_per_mw: 0.05,
                    x_sens_pu_per_mvar: 0.08,
                }],
                generators: vec![GeneratorDef {
                    id: "pv1".to_string(),
                    bus: "b1".to_string(),
                    kva_rated: 100.0,
                    kw: 80.0,
                    profile: None,
                }],
                loads: vec![],
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
            controllers: vec![],
            exports: ExportDef::default(),
            cosim: None,
            overrides: vec![],
        }
    }

    fn project(scenarios: Vec<ScenarioDef>) -> Project {
        Project {
            version: 1,
            name: "test".to_string(),
            scenarios,
        }
    }

    #[test]
    fn valid_scenario_passes() {
        validate_project(&project(vec![scenario()])).unwrap();
    }

    #[test]
    fn duplicate_scenario_id_rejected() {
        let result = validate_project(&project(vec![scenario(), scenario()]));
        assert!(matches!(result, Err(ValidationError::DuplicateId { .. })));
    }

    #[test]
    fn generator_on_unknown_bus_rejected() {
        let mut s = scenario();
        s.circuit.generators[0].bus = "nope".to_string();
        let result = validate_project(&project(vec![s]));
        assert!(matches!(
            result,
            Err(ValidationError::MissingReference { .. })
        ));
    }

    #[test]
    fn non_monotonic_curve_rejected() {
        let mut s = scenario();
        s.controllers.push(ControllerAttachment {
            name: "vv".to_string(),
            element_class: "Generator".to_string(),
            elements: vec![],
            kind: ControllerKind::VoltVar {
                curve: vec![(1.05, -0.44), (0.95, 0.44)],
                damping: 0.0,
                cut_in_fraction: 0.1,
            },
        });
        let result = validate_project(&project(vec![s]));
        assert!(matches!(result, Err(ValidationError::InvalidValue { .. })));
    }

    #[test]
    fn zero_horizon_rejected() {
        let mut s = scenario();
        s.simulation.horizon_steps = 0;
        let result = validate_project(&project(vec![s]));
        assert!(matches!(result, Err(ValidationError::InvalidValue { .. })));
    }

    #[test]
    fn newer_version_rejected() {
        let mut p = project(vec![]);
        p.version = LATEST_VERSION + 1;
        assert!(matches!(
            validate_project(&p),
            Err(ValidationError::UnsupportedVersion { .. })
        ));
    }
}
