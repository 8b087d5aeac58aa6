//! Discovery checkpoints
//!
//! A checkpoint is two files sharing a run name:
//! - `<run>_checkpoint.csv`: header plus one state row
//!   (`current_index,total_urls_collected,total_parents,parents_digest,saved_at`)
//! - `<run>_partial.csv`: the URLs collected so far, one per row
//!
//! The collected list only ever grows, so a partial file that is longer than
//! the recorded count (a crash between the two renames) is cut back to the
//! count. Any other inconsistency is reported as [`CheckpointError::Malformed`].

use crate::storage::{self, StorageError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors loading or saving a checkpoint
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Malformed checkpoint {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Progress of one multi-page discovery run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryCheckpoint {
    /// Number of parent items already processed
    pub cursor: usize,
    /// Links discovered so far, in discovery order
    pub collected: Vec<String>,
    /// Length of the parent list the cursor indexes into
    pub parents_total: Option<usize>,
    /// Digest of that parent list
    pub parents_digest: Option<String>,
}

impl DiscoveryCheckpoint {
    /// Empty checkpoint for a run over `parents`
    pub fn fresh(parents: &[String]) -> Self {
        Self {
            cursor: 0,
            collected: Vec::new(),
            parents_total: Some(parents.len()),
            parents_digest: Some(parents_digest(parents)),
        }
    }

    /// True once every parent has been processed
    pub fn is_complete(&self) -> bool {
        self.parents_total.is_some_and(|total| self.cursor >= total)
    }

    /// True when the checkpoint was taken over this parent list
    ///
    /// Checkpoints without a digest only check that the cursor still fits.
    pub fn belongs_to(&self, parents: &[String]) -> bool {
        match &self.parents_digest {
            Some(digest) => *digest == parents_digest(parents),
            None => self.cursor <= parents.len(),
        }
    }
}

/// Hex SHA-256 over the ordered parent list
pub fn parents_digest(parents: &[String]) -> String {
    let mut hasher = Sha256::new();
    for parent in parents {
        hasher.update(parent.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Serialize, Deserialize)]
struct StateRecord {
    current_index: usize,
    total_urls_collected: usize,
    #[serde(default)]
    total_parents: Option<usize>,
    #[serde(default)]
    parents_digest: Option<String>,
    #[serde(default)]
    saved_at: Option<String>,
}

const STATE_COLUMNS: [&str; 5] = [
    "current_index",
    "total_urls_collected",
    "total_parents",
    "parents_digest",
    "saved_at",
];

/// Reads and writes the checkpoint files of one named run
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    run_name: String,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>, run_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            run_name: run_name.into(),
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(format!("{}_checkpoint.csv", self.run_name))
    }

    pub fn partial_path(&self) -> PathBuf {
        self.dir.join(format!("{}_partial.csv", self.run_name))
    }

    /// Loads the checkpoint; `Ok(None)` when none has been written yet
    pub fn load(&self) -> Result<Option<DiscoveryCheckpoint>, CheckpointError> {
        let state_path = self.state_path();
        if !state_path.exists() {
            return Ok(None);
        }

        let record = read_state(&state_path)?;

        let partial_path = self.partial_path();
        let mut collected = if partial_path.exists() {
            storage::read_url_list(&partial_path)?
        } else {
            Vec::new()
        };

        if collected.len() < record.total_urls_collected {
            return Err(malformed(
                &partial_path,
                format!(
                    "expected {} collected URLs, found {}",
                    record.total_urls_collected,
                    collected.len()
                ),
            ));
        }
        if collected.len() > record.total_urls_collected {
            tracing::warn!(
                "Partial list {} is ahead of its state record ({} > {}), truncating",
                partial_path.display(),
                collected.len(),
                record.total_urls_collected
            );
            collected.truncate(record.total_urls_collected);
        }

        if let Some(total) = record.total_parents {
            if record.current_index > total {
                return Err(malformed(
                    &state_path,
                    format!(
                        "cursor {} is past the parent total {}",
                        record.current_index, total
                    ),
                ));
            }
        }

        Ok(Some(DiscoveryCheckpoint {
            cursor: record.current_index,
            collected,
            parents_total: record.total_parents,
            parents_digest: record.parents_digest,
        }))
    }

    /// Persists the checkpoint
    ///
    /// The partial list is replaced before the state record, so the state
    /// never claims more URLs than the partial list holds.
    pub fn save(&self, checkpoint: &DiscoveryCheckpoint) -> Result<(), CheckpointError> {
        let record = StateRecord {
            current_index: checkpoint.cursor,
            total_urls_collected: checkpoint.collected.len(),
            total_parents: checkpoint.parents_total,
            parents_digest: checkpoint.parents_digest.clone(),
            saved_at: Some(Utc::now().to_rfc3339()),
        };

        let partial = storage::stage_url_list(&self.partial_path(), &checkpoint.collected)?;
        let state = storage::stage_table(&self.state_path(), &STATE_COLUMNS, &[record])?;
        partial.commit()?;
        state.commit()?;

        tracing::info!(
            "Checkpoint saved: {} processed, {} URLs collected",
            checkpoint.cursor,
            checkpoint.collected.len()
        );
        Ok(())
    }
}

fn read_state(path: &Path) -> Result<StateRecord, CheckpointError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| StorageError::Csv {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records = reader.deserialize::<StateRecord>();
    match records.next() {
        Some(Ok(record)) => Ok(record),
        Some(Err(e)) => Err(malformed(path, e.to_string())),
        None => Err(malformed(path, "no state row".to_string())),
    }
}

fn malformed(path: &Path, reason: String) -> CheckpointError {
    CheckpointError::Malformed {
        path: path.to_path_buf(),
        reason,
    }
}
