//! JSONL warning report: one JSON object per line, machine-parseable.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use gf_core::{RunWarning, WarningSink};

use crate::ResultsResult;

/// Writes run warnings to `report.jsonl` in the run directory as they occur.
pub struct JsonlReport {
    writer: BufWriter<File>,
}

impl JsonlReport {
    pub fn create(run_dir: &Path) -> ResultsResult<Self> {
        let file = File::create(run_dir.join("report.jsonl"))?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub fn finish(mut self) -> ResultsResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl WarningSink for JsonlReport {
    fn warn(&mut self, warning: RunWarning) {
        // A report-write failure must never take down the run.
        if let Ok(line) = serde_json::to_string(&warning) {
            let _ = writeln!(self.writer, "{line}");
            let _ = self.writer.flush();
        }
    }
}
