//! Fixed-capacity chunked write buffer for one time-series table.
//!
//! Rows accumulate in memory up to the chunk size, then flush to the backing
//! file as raw little-endian f64. The backing file is exclusively owned by
//! one buffer instance. Destructing a buffer with pending in-memory rows is a
//! programming error (the run loop guarantees a final flush), checked in
//! debug builds.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{ResultsError, ResultsResult};

const F64_BYTES: usize = std::mem::size_of::<f64>();

/// Chunk sizing: `min(floor(max_bytes / row_bytes), capacity)`, floored at
/// one row so a row wider than the budget still buffers.
pub fn chunk_rows(max_bytes: usize, row_bytes: usize, capacity_rows: usize) -> usize {
    if row_bytes == 0 {
        return capacity_rows.max(1);
    }
    (max_bytes / row_bytes).clamp(1, capacity_rows.max(1))
}

#[derive(Debug)]
pub struct ChunkBuffer {
    path: PathBuf,
    file: File,
    columns: Vec<String>,
    capacity_rows: usize,
    chunk_size: usize,
    /// Row-major staging area, `mem_rows * columns.len()` values long.
    mem: Vec<f64>,
    mem_rows: usize,
    disk_rows: usize,
}

impl ChunkBuffer {
    /// Create the backing file (truncating any previous content) and size the
    /// in-memory chunk against `max_chunk_bytes`.
    pub fn create(
        path: &Path,
        columns: Vec<String>,
        capacity_rows: usize,
        max_chunk_bytes: usize,
    ) -> ResultsResult<Self> {
        if columns.is_empty() {
            return Err(ResultsError::InvalidState {
                what: format!("buffer {} has no columns", path.display()),
            });
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let row_bytes = columns.len() * F64_BYTES;
        let chunk_size = chunk_rows(max_chunk_bytes, row_bytes, capacity_rows);
        Ok(Self {
            path: path.to_path_buf(),
            file,
            mem: Vec::with_capacity(chunk_size * columns.len()),
            columns,
            capacity_rows,
            chunk_size,
            mem_rows: 0,
            disk_rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn capacity_rows(&self) -> usize {
        self.capacity_rows
    }

    /// Rows currently staged in memory; always in `[0, chunk_size)` outside
    /// an active flush.
    pub fn mem_rows(&self) -> usize {
        self.mem_rows
    }

    /// Rows already written to the backing file.
    pub fn disk_rows(&self) -> usize {
        self.disk_rows
    }

    /// Logical rows written so far, staged or flushed.
    pub fn rows_written(&self) -> usize {
        self.disk_rows + self.mem_rows
    }

    /// Total byte size of the table at full capacity; computable before any
    /// data is written, used for pre-run disk estimation.
    pub fn max_num_bytes(&self) -> usize {
        self.columns.len() * F64_BYTES * self.capacity_rows
    }

    /// Append one row; flushes automatically when the chunk fills.
    pub fn write_row(&mut self, row: &[f64]) -> ResultsResult<()> {
        if row.len() != self.columns.len() {
            return Err(ResultsError::ColumnMismatch {
                what: self.path.display().to_string(),
                expected: self.columns.len(),
                got: row.len(),
            });
        }
        if self.rows_written() >= self.capacity_rows {
            return Err(ResultsError::CapacityExceeded {
                what: self.path.display().to_string(),
                capacity: self.capacity_rows,
            });
        }
        self.mem.extend_from_slice(row);
        self.mem_rows += 1;
        if self.mem_rows == self.chunk_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Write the staged chunk to disk and reset the in-memory offset. A
    /// flush of zero rows is a no-op.
    pub fn flush(&mut self) -> ResultsResult<()> {
        if self.mem_rows == 0 {
            return Ok(());
        }
        let mut bytes = Vec::with_capacity(self.mem.len() * F64_BYTES);
        for v in &self.mem {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        self.file.write_all(&bytes)?;
        self.disk_rows += self.mem_rows;
        self.mem_rows = 0;
        self.mem.clear();
        Ok(())
    }

    /// Read back all flushed rows from the backing file.
    pub fn read_rows(&self) -> ResultsResult<Vec<Vec<f64>>> {
        let bytes = fs::read(&self.path)?;
        let ncols = self.columns.len();
        let mut rows = Vec::with_capacity(self.disk_rows);
        for row_bytes in bytes.chunks_exact(ncols * F64_BYTES) {
            let row = row_bytes
                .chunks_exact(F64_BYTES)
                .map(|b| f64::from_le_bytes(b.try_into().expect("chunk is 8 bytes")))
                .collect();
            rows.push(row);
        }
        Ok(rows)
    }
}

impl Drop for ChunkBuffer {
    fn drop(&mut self) {
        if self.mem_rows > 0 && !std::thread::panicking() {
            tracing::error!(
                path = %self.path.display(),
                pending_rows = self.mem_rows,
                "buffer dropped with unflushed rows"
            );
            debug_assert!(false, "ChunkBuffer dropped with unflushed rows");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("gf_results_buffer_test");
        let _ = fs::create_dir_all(&dir);
        dir.join(name)
    }

    #[test]
    fn chunk_sizing_floors_at_one_row() {
        // Row wider than the budget still buffers one row.
        assert_eq!(chunk_rows(8, 800, 100), 1);
        assert_eq!(chunk_rows(800, 8, 100), 100); // capped at capacity
        assert_eq!(chunk_rows(80, 8, 100), 10);
    }

    #[test]
    fn auto_flush_at_chunk_boundaries() {
        let path = temp_path("auto_flush.f64");
        let mut buf =
            ChunkBuffer::create(&path, vec!["v".to_string()], 4, 2 * F64_BYTES).unwrap();
        assert_eq!(buf.chunk_size(), 2);

        for (i, v) in [1.0, 2.0, 3.0, 4.0].iter().enumerate() {
            buf.write_row(&[*v]).unwrap();
            // In-memory offset stays inside [0, chunk_size).
            assert!(buf.mem_rows() < buf.chunk_size());
            assert_eq!(buf.rows_written(), i + 1);
        }
        assert_eq!(buf.disk_rows(), 4);

        let rows = buf.read_rows().unwrap();
        assert_eq!(rows, vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]]);
    }

    #[test]
    fn flush_is_idempotent() {
        let path = temp_path("idempotent.f64");
        let mut buf =
            ChunkBuffer::create(&path, vec!["v".to_string()], 10, 4 * F64_BYTES).unwrap();
        buf.write_row(&[1.0]).unwrap();
        buf.flush().unwrap();
        let disk = buf.disk_rows();
        buf.flush().unwrap();
        assert_eq!(buf.disk_rows(), disk);
    }

    #[test]
    fn rejects_wrong_width_and_overflow() {
        let path = temp_path("reject.f64");
        let mut buf = ChunkBuffer::create(
            &path,
            vec!["a".to_string(), "b".to_string()],
            1,
            1024,
        )
        .unwrap();
        assert!(matches!(
            buf.write_row(&[1.0]),
            Err(ResultsError::ColumnMismatch { .. })
        ));
        buf.write_row(&[1.0, 2.0]).unwrap();
        assert!(matches!(
            buf.write_row(&[3.0, 4.0]),
            Err(ResultsError::CapacityExceeded { .. })
        ));
        buf.flush().unwrap();
    }

    #[test]
    fn max_num_bytes_before_any_write() {
        let path = temp_path("estimate.f64");
        let mut buf = ChunkBuffer::create(
            &path,
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            100,
            1024,
        )
        .unwrap();
        assert_eq!(buf.max_num_bytes(), 3 * F64_BYTES * 100);
        buf.flush().unwrap();
    }

    proptest! {
        #[test]
        fn offsets_stay_invariant(
            writes in 1usize..200,
            chunk_bytes in 8usize..256,
        ) {
            let path = temp_path(&format!("prop_{writes}_{chunk_bytes}.f64"));
            let mut buf = ChunkBuffer::create(
                &path,
                vec!["v".to_string()],
                writes,
                chunk_bytes,
            ).unwrap();

            let mut last_disk = 0;
            for i in 0..writes {
                buf.write_row(&[i as f64]).unwrap();
                // Disk offset never decreases; in-memory offset stays within
                // the chunk.
                prop_assert!(buf.disk_rows() >= last_disk);
                prop_assert!(buf.mem_rows() < buf.chunk_size());
                prop_assert!(buf.rows_written() <= writes);
                last_disk = buf.disk_rows();
            }
            buf.flush().unwrap();
            prop_assert_eq!(buf.disk_rows(), writes);
            prop_assert_eq!(buf.mem_rows(), 0);
        }
    }
}
