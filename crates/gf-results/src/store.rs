//! Per-run result store: value collection, buffering, and finalization.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use gf_core::{PhasorSample, RunWarning, WarningKind, WarningSink};
use gf_solver::{ElementHandle, SolverContext};

use crate::buffer::ChunkBuffer;
use crate::types::{ColumnSidecar, ExportGroup, IndexRow, RunManifest};
use crate::{ResultsError, ResultsResult};

/// One (target, property) pair selected for export.
#[derive(Debug, Clone)]
pub struct TrackedProperty {
    pub target: ElementHandle,
    pub property: String,
}

/// Collection plan entry resolved at initialization.
#[derive(Debug)]
struct SeriesSlot {
    handle: ElementHandle,
    property: String,
    /// Buffer this series writes into: (group key, property).
    key: (String, String),
    width: usize,
}

/// Collects one value-set per tracked property per timestep, routes rows to
/// chunked buffers, and keeps a latest-values snapshot for external
/// publication.
pub struct ResultStore {
    run_dir: PathBuf,
    group: ExportGroup,
    max_chunk_bytes: usize,
    series: Vec<SeriesSlot>,
    buffers: BTreeMap<(String, String), ChunkBuffer>,
    current: BTreeMap<(String, String), Vec<f64>>,
    index_rows: Vec<IndexRow>,
}

impl ResultStore {
    pub fn create(
        root: &Path,
        run_id: &str,
        group: ExportGroup,
        max_chunk_bytes: usize,
    ) -> ResultsResult<Self> {
        let run_dir = root.join(run_id);
        fs::create_dir_all(&run_dir)?;
        Ok(Self {
            run_dir,
            group,
            max_chunk_bytes,
            series: Vec::new(),
            buffers: BTreeMap::new(),
            current: BTreeMap::new(),
            index_rows: Vec::new(),
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Resolve the export configuration against the live circuit: probe each
    /// tracked property's shape, build column labels, and allocate one
    /// buffer per (group key, property) sized to `total_steps` rows.
    ///
    /// Untrackable properties are warned about and skipped, never fatal.
    pub fn initialize_for_run(
        &mut self,
        ctx: &mut SolverContext<'_>,
        tracked: &[TrackedProperty],
        total_steps: usize,
        sink: &mut dyn WarningSink,
    ) -> ResultsResult<()> {
        let mut columns: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();

        for item in tracked {
            let Some((width, _kind)) = item.target.data_length(ctx, &item.property) else {
                warn!(
                    element = %item.target.key(),
                    property = %item.property,
                    "property not trackable, skipped"
                );
                sink.warn(RunWarning {
                    kind: WarningKind::ExportFailed,
                    step: None,
                    controller: None,
                    element: Some(item.target.key().to_string()),
                    family: None,
                    value: None,
                    message: format!("property {} not trackable", item.property),
                });
                continue;
            };

            let key = match self.group {
                ExportGroup::ByElement => {
                    (item.target.key().to_string(), item.property.clone())
                }
                ExportGroup::ByClass => {
                    (item.target.class().to_string(), item.property.clone())
                }
            };

            let base = format!("{}_{}", item.target.name(), item.property);
            let labels = if width == 1 {
                vec![base]
            } else if width % 2 == 0 {
                // Even-length vectors follow the magnitude/angle pair schema.
                PhasorSample::column_labels(&base, width / 2)
            } else {
                (1..=width).map(|i| format!("{base}_{i}")).collect()
            };
            columns.entry(key.clone()).or_default().extend(labels);

            self.series.push(SeriesSlot {
                handle: item.target.clone(),
                property: item.property.clone(),
                key,
                width,
            });
        }

        for (key, labels) in columns {
            let path = self
                .run_dir
                .join(&key.0)
                .join(&key.1)
                .join("data.f64");
            let buffer = ChunkBuffer::create(&path, labels, total_steps, self.max_chunk_bytes)?;
            self.buffers.insert(key, buffer);
        }

        Ok(())
    }

    /// Total on-disk bytes at full capacity, for pre-run estimation.
    pub fn estimated_bytes(&self) -> usize {
        self.buffers.values().map(ChunkBuffer::max_num_bytes).sum()
    }

    /// Pull one value-set per tracked series, append to the matching buffers,
    /// record the shared index row, and refresh the latest-values snapshot.
    pub fn collect(
        &mut self,
        ctx: &mut SolverContext<'_>,
        index_row: IndexRow,
    ) -> ResultsResult<()> {
        let mut rows: BTreeMap<&(String, String), Vec<f64>> = BTreeMap::new();

        for slot in &self.series {
            let mut values = match slot.handle.get_variable(ctx, &slot.property) {
                // Phasor-valued series are normalized through the pair
                // schema, so a truncated reading pads a zero angle rather
                // than shifting later columns.
                Some(v) if slot.width > 1 && slot.width % 2 == 0 => {
                    PhasorSample::to_flat(&PhasorSample::from_flat(&v.to_row()))
                }
                Some(v) => v.to_row(),
                None => slot
                    .handle
                    .get_parameter(ctx, &slot.property)
                    .and_then(|s| s.parse::<f64>().ok())
                    .map(|v| vec![v])
                    .unwrap_or_default(),
            };
            if values.len() != slot.width {
                debug!(
                    element = %slot.handle.key(),
                    property = %slot.property,
                    "missing or reshaped telemetry, padding with NaN"
                );
                values.resize(slot.width, f64::NAN);
            }
            self.current.insert(
                (slot.handle.key().to_string(), slot.property.clone()),
                values.clone(),
            );
            rows.entry(&slot.key).or_default().extend(values);
        }

        for (key, row) in rows {
            let buffer = self.buffers.get_mut(key).ok_or_else(|| {
                ResultsError::InvalidState {
                    what: format!("no buffer for {}/{}", key.0, key.1),
                }
            })?;
            buffer.write_row(&row)?;
        }

        self.index_rows.push(index_row);
        Ok(())
    }

    /// Most recently collected values for one (element, property), available
    /// for external publication without waiting for a flush.
    pub fn current_value(&self, element: &str, property: &str) -> Option<&[f64]> {
        self.current
            .get(&(element.to_string(), property.to_string()))
            .map(Vec::as_slice)
    }

    /// Flush every buffer and write sidecar attributes plus the shared index
    /// table. Guaranteed to attempt every buffer; failures are returned, not
    /// short-circuited. Invoked exactly once at the end of a run, success or
    /// failure.
    pub fn flush_all(&mut self) -> Vec<(String, ResultsError)> {
        let mut failures = Vec::new();

        for (key, buffer) in &mut self.buffers {
            let label = format!("{}/{}", key.0, key.1);
            if let Err(e) = buffer.flush() {
                failures.push((label.clone(), e));
                continue;
            }
            let sidecar = ColumnSidecar {
                columns: buffer.columns().to_vec(),
                unit: gf_core::unit_for(&key.1).to_string(),
                rows_written: buffer.disk_rows(),
                capacity_rows: buffer.capacity_rows(),
            };
            let path = self.run_dir.join(&key.0).join(&key.1).join("columns.json");
            if let Err(e) = write_json(&path, &sidecar) {
                failures.push((label, e));
            }
        }

        if let Err(e) = self.write_index() {
            failures.push(("index".to_string(), e));
        }
        failures
    }

    fn write_index(&self) -> ResultsResult<()> {
        let mut content = String::from("row,timestamp,frequency_hz,mode\n");
        for (i, row) in self.index_rows.iter().enumerate() {
            content.push_str(&format!(
                "{},{},{},{}\n",
                i, row.timestamp, row.frequency_hz, row.mode
            ));
        }
        fs::write(self.run_dir.join("index.csv"), content)?;
        Ok(())
    }

    pub fn write_manifest(&self, manifest: &RunManifest) -> ResultsResult<()> {
        write_json(&self.run_dir.join("manifest.json"), manifest)
    }

    /// Dump the run-settings snapshot read back by downstream tooling.
    pub fn write_settings<T: serde::Serialize>(&self, settings: &T) -> ResultsResult<()> {
        write_json(&self.run_dir.join("settings.json"), settings)
    }

    pub(crate) fn table_iter(
        &self,
    ) -> impl Iterator<Item = (&(String, String), &ChunkBuffer)> {
        self.buffers.iter()
    }

    pub fn load_manifest(root: &Path, run_id: &str) -> ResultsResult<RunManifest> {
        let path = root.join(run_id).join("manifest.json");
        if !path.exists() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn has_run(root: &Path, run_id: &str) -> bool {
        root.join(run_id).join("manifest.json").exists()
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> ResultsResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}
