use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::WorkerError;
use crate::model::Severity;

#[derive(Debug, Clone)]
pub struct FileJob {
    pub id: String,
    pub path: PathBuf,
}

impl FileJob {
    pub fn new(path: PathBuf) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            path,
        }
    }

    /// SHA-256 of the file contents, lowercase hex. The hash keys the
    /// processed-file ledger, so it covers bytes, not the path.
    pub fn compute_hash(&self) -> Result<String, WorkerError> {
        hash_file(&self.path)
    }
}

pub fn hash_file(path: &Path) -> Result<String, WorkerError> {
    let mut file = std::fs::File::open(path).map_err(|e| WorkerError::HashFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| WorkerError::HashFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// What happened to one file.
#[derive(Debug, Clone)]
pub enum FileOutcome {
    /// Every page went through the pipeline.
    Processed {
        ticket_ids: Vec<i64>,
        committed: u32,
        queued: u32,
        worst_severity: Option<Severity>,
    },
    /// Ledger hash hit; the file's tickets are already in from an
    /// earlier run.
    AlreadyProcessed { ticket_ids: Vec<i64> },
    /// Batch was cancelled before or during this file. Any tickets
    /// committed from it were rolled back.
    Skipped,
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct FileResult {
    pub job_id: String,
    pub path: PathBuf,
    pub pages: u32,
    pub outcome: FileOutcome,
}

impl FileResult {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, FileOutcome::Failed { .. })
    }
}
