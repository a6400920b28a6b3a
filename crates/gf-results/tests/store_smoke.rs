use std::path::PathBuf;

use gf_core::{Id, VecSink};
use gf_results::{ExportGroup, IndexRow, ResultStore, RunManifest, TrackedProperty};
use gf_solver::{ElementHandle, ElementKey, SolverBackend, SolverContext, SyntheticFeeder};

fn temp_root(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("gf_results_store_test").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn feeder() -> SyntheticFeeder {
    let mut f = SyntheticFeeder::new(1.0, 7200.0, 900.0);
    f.add_bus("b1", 0.05, 0.08);
    f.add_generator("pv1", "b1", 100.0, 80.0);
    f.solve().unwrap();
    f
}

fn pv1_handle() -> ElementHandle {
    ElementHandle::new(ElementKey::new("Generator", "pv1"), Id::from_index(2))
}

fn index_row(step: usize) -> IndexRow {
    IndexRow {
        timestamp: format!("2020-01-01T00:{:02}:00", step * 15),
        frequency_hz: 60.0,
        mode: "qsts".to_string(),
    }
}

#[test]
fn four_step_run_with_chunk_size_two() {
    let root = temp_root("four_step");
    let mut f = feeder();
    let handle = pv1_handle();

    let mut store = ResultStore::create(&root, "run1", ExportGroup::ByElement, 16).unwrap();
    let mut sink = VecSink::default();
    {
        let mut ctx = SolverContext::new(&mut f);
        store
            .initialize_for_run(
                &mut ctx,
                &[TrackedProperty {
                    target: handle.clone(),
                    property: "kw".to_string(),
                }],
                4,
                &mut sink,
            )
            .unwrap();
    }
    assert!(sink.warnings.is_empty());
    // One scalar column, 4 rows of 8 bytes each.
    assert_eq!(store.estimated_bytes(), 32);

    for step in 0..4usize {
        let value = (step + 1) as f64;
        {
            let mut ctx = SolverContext::new(&mut f);
            handle
                .set_parameter(&mut ctx, "kw", &format!("{value}"))
                .unwrap();
        }
        f.solve().unwrap();
        let mut ctx = SolverContext::new(&mut f);
        store.collect(&mut ctx, index_row(step)).unwrap();
        assert_eq!(
            store.current_value("Generator.pv1", "kw"),
            Some(&[value][..])
        );
    }

    let failures = store.flush_all();
    assert!(failures.is_empty(), "{failures:?}");

    let report = store.export_all("");
    assert!(report.all_succeeded(), "{:?}", report.failures);
    assert_eq!(report.exported.len(), 1);

    let csv = std::fs::read_to_string(&report.exported[0]).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "pv1_kw [kW]");
    assert_eq!(&lines[1..], ["1", "2", "3", "4"]);

    let index = std::fs::read_to_string(store.run_dir().join("index.csv")).unwrap();
    assert_eq!(index.lines().count(), 5); // header + 4 rows
    assert!(index.lines().nth(1).unwrap().starts_with("0,2020-01-01T00:00:00,60,qsts"));
}

#[test]
fn phasor_property_splits_into_mag_ang_columns() {
    let root = temp_root("phasor");
    let mut f = feeder();
    let handle = pv1_handle();

    let mut store = ResultStore::create(&root, "run1", ExportGroup::ByElement, 1024).unwrap();
    let mut sink = VecSink::default();
    {
        let mut ctx = SolverContext::new(&mut f);
        store
            .initialize_for_run(
                &mut ctx,
                &[TrackedProperty {
                    target: handle.clone(),
                    property: "Voltages".to_string(),
                }],
                2,
                &mut sink,
            )
            .unwrap();
    }

    let mut ctx = SolverContext::new(&mut f);
    store.collect(&mut ctx, index_row(0)).unwrap();
    drop(ctx);
    let failures = store.flush_all();
    assert!(failures.is_empty());

    let report = store.export_all("");
    let csv = std::fs::read_to_string(&report.exported[0]).unwrap();
    let header = csv.lines().next().unwrap();
    assert_eq!(
        header,
        "pv1_Voltages_1_mag [volts],pv1_Voltages_1_ang [volts]"
    );
}

#[test]
fn untrackable_property_warns_and_continues() {
    let root = temp_root("untrackable");
    let mut f = feeder();
    let handle = pv1_handle();

    let mut store = ResultStore::create(&root, "run1", ExportGroup::ByElement, 1024).unwrap();
    let mut sink = VecSink::default();
    let mut ctx = SolverContext::new(&mut f);
    store
        .initialize_for_run(
            &mut ctx,
            &[
                TrackedProperty {
                    target: handle.clone(),
                    property: "NoSuchProperty".to_string(),
                },
                TrackedProperty {
                    target: handle.clone(),
                    property: "kw".to_string(),
                },
            ],
            2,
            &mut sink,
        )
        .unwrap();

    assert_eq!(sink.warnings.len(), 1);
    // The valid property still tracks.
    assert_eq!(store.estimated_bytes(), 16);
}

#[test]
fn manifest_round_trip() {
    let root = temp_root("manifest");
    let store = ResultStore::create(&root, "runx", ExportGroup::ByElement, 1024).unwrap();
    let manifest = RunManifest {
        run_id: "runx".to_string(),
        scenario_id: "scenario-a".to_string(),
        timestamp: "2026-01-05T08:00:00Z".to_string(),
        solver_version: "synthetic-0.1".to_string(),
        horizon_steps: 96,
        step_resolution_s: 900.0,
    };
    store.write_manifest(&manifest).unwrap();

    assert!(ResultStore::has_run(&root, "runx"));
    let loaded = ResultStore::load_manifest(&root, "runx").unwrap();
    assert_eq!(loaded.scenario_id, "scenario-a");
    assert_eq!(loaded.horizon_steps, 96);

    assert!(matches!(
        ResultStore::load_manifest(&root, "missing"),
        Err(gf_results::ResultsError::RunNotFound { .. })
    ));
}
