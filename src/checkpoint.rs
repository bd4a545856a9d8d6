//! Durable progress snapshots for resumable runs
//!
//! A checkpoint holds every result record produced so far together with the
//! batches that produced them. It is keyed by input file and domain, written
//! atomically, loaded once at start and removed when the run completes.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Domain, Record};
use crate::error::{ClassifyError, Result};

/// Snapshot of a run in progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub timestamp: DateTime<Utc>,
    pub input_file: String,
    pub domain: Domain,
    /// Every batch below this index is complete
    pub processed_batch_idx: usize,
    pub total_batches: usize,
    /// Exact set of completed batch indices
    #[serde(default)]
    pub completed_batches: Vec<usize>,
    pub results: Vec<Record>,
}

impl Checkpoint {
    /// Batch indices to skip on resume.
    ///
    /// Snapshots written without `completed_batches` fall back to the
    /// contiguous prefix `0..processed_batch_idx`.
    pub fn completed_set(&self) -> BTreeSet<usize> {
        if self.completed_batches.is_empty() {
            (0..self.processed_batch_idx.min(self.total_batches)).collect()
        } else {
            self.completed_batches
                .iter()
                .copied()
                .filter(|idx| *idx < self.total_batches)
                .collect()
        }
    }
}

/// Reads and writes the checkpoint file for one input/domain pair
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    input_file: String,
    domain: Domain,
}

impl CheckpointStore {
    /// Store at `<dir>/<input-basename>_<domain>.checkpoint.json`
    pub fn new(dir: &Path, input: &Path, domain: Domain) -> Self {
        let basename = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let path = dir.join(format!("{}_{}.checkpoint.json", basename, domain.name()));

        Self {
            path,
            input_file: input.display().to_string(),
            domain,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint if one exists.
    ///
    /// A missing, unreadable or unparsable file is a cold start, never an
    /// error.
    pub fn load(&self) -> Option<Checkpoint> {
        if !self.path.exists() {
            return None;
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Failed to read checkpoint {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<Checkpoint>(&content) {
            Ok(checkpoint) if checkpoint.domain != self.domain => {
                log::warn!(
                    "Ignoring checkpoint {} written for domain {}",
                    self.path.display(),
                    checkpoint.domain
                );
                None
            }
            Ok(checkpoint) => {
                log::info!(
                    "Loaded checkpoint from {}: {}/{} batches, {} results",
                    self.path.display(),
                    checkpoint.completed_set().len(),
                    checkpoint.total_batches,
                    checkpoint.results.len()
                );
                Some(checkpoint)
            }
            Err(e) => {
                log::warn!("Failed to parse checkpoint {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Build a snapshot from the completed batch set and results so far
    pub fn snapshot(&self, completed: &BTreeSet<usize>, total_batches: usize, results: &[Record]) -> Checkpoint {
        let processed_batch_idx = (0..total_batches).take_while(|idx| completed.contains(idx)).count();

        Checkpoint {
            timestamp: Utc::now(),
            input_file: self.input_file.clone(),
            domain: self.domain,
            processed_batch_idx,
            total_batches,
            completed_batches: completed.iter().copied().collect(),
            results: results.to_vec(),
        }
    }

    /// Write the checkpoint through a temp file and rename
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_string(checkpoint)?;
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            ClassifyError::Checkpoint(format!("Failed to move checkpoint into {}: {}", self.path.display(), e))
        })?;

        log::debug!(
            "Checkpoint saved: {} ({} batches, {} results)",
            self.path.display(),
            checkpoint.completed_batches.len(),
            checkpoint.results.len()
        );
        Ok(())
    }

    /// Remove the checkpoint file; returns whether one existed
    pub fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                log::info!("Removed checkpoint {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
