//! CSV materialization of buffered tables.
//!
//! Export attempts are independent: a failure on one table is recorded and
//! the remaining tables still export. Column headers embed physical units
//! from the static unit table.

use std::fs;
use std::path::PathBuf;

use tracing::warn;

use gf_core::labeled_header;

use crate::store::ResultStore;

/// Aggregated outcome of `export_all`; failures never short-circuit.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub exported: Vec<PathBuf>,
    /// (table label, error message) per failed table.
    pub failures: Vec<(String, String)>,
}

impl ExportReport {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

impl ResultStore {
    /// Materialize every buffered table as `<group key>__<property>.csv`
    /// under the run directory, prefixed with `prefix` when non-empty.
    ///
    /// Buffers must have been flushed; staged rows are not exported.
    pub fn export_all(&self, prefix: &str) -> ExportReport {
        let mut report = ExportReport::default();

        for (key, buffer) in self.table_iter() {
            let label = format!("{}/{}", key.0, key.1);
            let stem = if prefix.is_empty() {
                format!("{}__{}.csv", key.0, key.1)
            } else {
                format!("{}__{}__{}.csv", prefix, key.0, key.1)
            };
            let path = self.run_dir().join(stem);

            let result = buffer.read_rows().and_then(|rows| {
                let headers: Vec<String> = buffer
                    .columns()
                    .iter()
                    .map(|c| labeled_header(c, &key.1))
                    .collect();
                let mut content = headers.join(",");
                content.push('\n');
                for row in &rows {
                    let cells: Vec<String> = row.iter().map(|v| format!("{v}")).collect();
                    content.push_str(&cells.join(","));
                    content.push('\n');
                }
                fs::write(&path, content)?;
                Ok(())
            });

            match result {
                Ok(()) => report.exported.push(path),
                Err(e) => {
                    warn!(table = %label, error = %e, "table export failed");
                    report.failures.push((label, e.to_string()));
                }
            }
        }

        report
    }
}
