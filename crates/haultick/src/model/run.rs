//! The processing-run ledger: one record per batch invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    InProgress,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Audit ledger for one batch. Counts are appended to during the run and
/// sealed (status + completed_at) at the end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRun {
    pub request_guid: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub files_count: u32,
    pub pages_count: u32,
    pub ok_count: u32,
    pub error_count: u32,
    pub review_count: u32,
    pub skipped_count: u32,
    pub status: RunStatus,
}

impl ProcessingRun {
    pub fn start(files_count: u32) -> Self {
        Self {
            request_guid: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            completed_at: None,
            files_count,
            pages_count: 0,
            ok_count: 0,
            error_count: 0,
            review_count: 0,
            skipped_count: 0,
            status: RunStatus::InProgress,
        }
    }

    pub fn seal(&mut self, status: RunStatus) {
        self.completed_at = Some(Utc::now());
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_and_seal() {
        let mut run = ProcessingRun::start(5);
        assert_eq!(run.status, RunStatus::InProgress);
        assert_eq!(run.files_count, 5);
        assert!(run.completed_at.is_none());
        assert!(!run.request_guid.is_empty());

        run.seal(RunStatus::Completed);
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.completed_at.is_some());
    }
}
