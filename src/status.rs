//! Durable per-file status table.
//!
//! The store is the only state shared across runs: a flat CSV mapping each
//! filename to its last-known [`ProcessingResult`]. CSV was chosen over a
//! database on purpose — an operator can open the table in any editor and see
//! exactly which files are done without tooling.
//!
//! ## Durability model
//!
//! The table is loaded once at orchestrator start and rewritten wholesale
//! after **every** file completes, not batched at end-of-run, so partial
//! progress survives a crash. Each rewrite goes through a temp file and an
//! atomic rename; a crash mid-save leaves the previous table intact.
//!
//! Rows are never deleted automatically: stale entries for removed PDFs
//! persist harmlessly, and the next run's validity checks simply never
//! consult them.

use crate::error::BatchError;
use crate::output::ProcessingResult;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Thread-safe handle to the status table.
///
/// Cheap to clone (`Arc` inside); all workers share one instance. A single
/// mutex guards the in-memory map and the file rewrite together, so
/// concurrent worker completions serialize their read-modify-write saves
/// rather than interleave.
#[derive(Clone)]
pub struct StatusStore {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    path: PathBuf,
    rows: BTreeMap<String, ProcessingResult>,
}

impl StatusStore {
    /// Load the table from `path`.
    ///
    /// A missing file yields an empty store — a fresh run is not an error.
    /// Rows that fail to deserialize are skipped with a warning instead of
    /// failing the caller; the batch then treats those files as never
    /// processed, which at worst repeats work.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut rows = BTreeMap::new();

        if path.exists() {
            match csv::Reader::from_path(&path) {
                Ok(mut reader) => {
                    for record in reader.deserialize::<ProcessingResult>() {
                        match record {
                            Ok(row) => {
                                rows.insert(row.filename.clone(), row);
                            }
                            Err(e) => {
                                warn!("Skipping malformed status row in {}: {e}", path.display())
                            }
                        }
                    }
                    debug!("Loaded {} status rows from {}", rows.len(), path.display());
                }
                Err(e) => warn!(
                    "Could not read status table {}: {e} — starting empty",
                    path.display()
                ),
            }
        }

        Self {
            inner: Arc::new(Mutex::new(Inner { path, rows })),
        }
    }

    /// Last-known result for `filename`, if any run has recorded one.
    pub fn get(&self, filename: &str) -> Option<ProcessingResult> {
        self.inner.lock().unwrap().rows.get(filename).cloned()
    }

    /// Insert or replace the row for `result.filename` and rewrite the table.
    ///
    /// Held under the store mutex for the whole read-modify-write so two
    /// workers finishing at once cannot clobber each other's rows.
    pub fn record(&self, result: &ProcessingResult) -> Result<(), BatchError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .rows
            .insert(result.filename.clone(), result.clone());
        inner.flush()
    }

    /// A point-in-time copy of the whole table.
    pub fn snapshot(&self) -> BTreeMap<String, ProcessingResult> {
        self.inner.lock().unwrap().rows.clone()
    }

    /// Path of the durable table (for reporting).
    pub fn path(&self) -> PathBuf {
        self.inner.lock().unwrap().path.clone()
    }
}

impl Inner {
    /// Rewrite the full persisted table: temp file + rename.
    fn flush(&self) -> Result<(), BatchError> {
        let store_err = |reason: String| BatchError::StatusStore {
            path: self.path.clone(),
            reason,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| store_err(e.to_string()))?;
            }
        }

        let tmp_path = self.path.with_extension("csv.tmp");
        {
            let mut writer =
                csv::Writer::from_path(&tmp_path).map_err(|e| store_err(e.to_string()))?;
            for row in self.rows.values() {
                writer
                    .serialize(row)
                    .map_err(|e| store_err(e.to_string()))?;
            }
            writer.flush().map_err(|e| store_err(e.to_string()))?;
        }
        std::fs::rename(&tmp_path, &self.path).map_err(|e| store_err(e.to_string()))
    }
}

impl std::fmt::Debug for StatusStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("StatusStore")
            .field("path", &inner.path)
            .field("rows", &inner.rows.len())
            .finish()
    }
}
