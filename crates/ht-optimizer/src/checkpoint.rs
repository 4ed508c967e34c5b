//! Durable search checkpoints.
//!
//! A checkpoint is rewritten after every evaluation. Writes go to a sibling
//! temporary file which is synced and then renamed over the previous
//! checkpoint, so a crash mid-write leaves the last durable checkpoint intact.
//!
//! Precondition: one run owns a checkpoint path. Concurrent runs against the
//! same path are not detected and can interleave histories.

use chrono::{DateTime, Utc};
use ht_types::{CheckpointError, HtResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::search::SearchSpace;
use crate::trial::SearchHistory;

/// Version written into every checkpoint; others are refused on load.
pub const CHECKPOINT_FORMAT_VERSION: u64 = 1;

/// Snapshot of a search at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub format_version: u64,
    /// Stable across resumes of the same search.
    pub run_id: Uuid,
    /// Name of the strategy that produced `history.strategy_state`.
    pub strategy: String,
    pub space: SearchSpace,
    pub history: SearchHistory,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(run_id: Uuid, strategy: &str, space: &SearchSpace, history: &SearchHistory) -> Self {
        Self {
            format_version: CHECKPOINT_FORMAT_VERSION,
            run_id,
            strategy: strategy.to_string(),
            space: space.clone(),
            history: history.clone(),
            saved_at: Utc::now(),
        }
    }

    /// Check that this checkpoint can seed a search over `space`.
    pub fn validate_against(&self, space: &SearchSpace, path: &Path) -> Result<(), CheckpointError> {
        if &self.space != space {
            return Err(CheckpointError::SpaceMismatch {
                path: path.display().to_string(),
            });
        }
        for (position, record) in self.history.records.iter().enumerate() {
            if record.index != position {
                return Err(CheckpointError::InvalidRecord {
                    index: position,
                    message: format!("recorded index {} is out of sequence", record.index),
                });
            }
            if !record.score.is_finite() {
                return Err(CheckpointError::InvalidRecord {
                    index: position,
                    message: format!("score {} is not finite", record.score),
                });
            }
            space
                .check_point(&record.point)
                .map_err(|e| CheckpointError::InvalidRecord {
                    index: position,
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }
}

/// Reads and atomically writes a checkpoint file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint.
    ///
    /// Returns `Ok(None)` when no file exists (cold start). A file that exists
    /// but cannot be read or parsed is an error, never an empty history.
    pub fn load(&self) -> HtResult<Option<Checkpoint>> {
        let path = self.path.display().to_string();
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no checkpoint at {}", path);
                return Ok(None);
            }
            Err(e) => {
                return Err(CheckpointError::Unreadable {
                    path,
                    message: e.to_string(),
                }
                .into())
            }
        };

        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| CheckpointError::Corrupt {
                path: path.clone(),
                message: e.to_string(),
            })?;

        let version = value
            .get("format_version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| CheckpointError::Corrupt {
                path: path.clone(),
                message: "missing format_version".to_string(),
            })?;
        if version != CHECKPOINT_FORMAT_VERSION {
            return Err(CheckpointError::VersionMismatch {
                found: version,
                expected: CHECKPOINT_FORMAT_VERSION,
            }
            .into());
        }

        let checkpoint: Checkpoint =
            serde_json::from_value(value).map_err(|e| CheckpointError::Corrupt {
                path: path.clone(),
                message: e.to_string(),
            })?;

        debug!(
            "loaded checkpoint {} with {} evaluations",
            path,
            checkpoint.history.len()
        );
        Ok(Some(checkpoint))
    }

    /// Atomically replace the checkpoint file.
    pub fn save(&self, checkpoint: &Checkpoint) -> HtResult<()> {
        let bytes = serde_json::to_vec_pretty(checkpoint)?;
        write_atomic(&self.path, &bytes).map_err(|e| CheckpointError::WriteFailed {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        debug!(
            "checkpoint {} written with {} evaluations",
            self.path.display(),
            checkpoint.history.len()
        );
        Ok(())
    }
}

/// Write `bytes` to a synced temporary sibling, then rename it over `path`.
/// The temporary file is removed if any step fails.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    if let Err(e) = fs::File::open(parent).and_then(|dir| dir.sync_all()) {
        warn!("could not sync directory {}: {}", parent.display(), e);
    }
    Ok(())
}
