use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobError;

/// Progress an unfinished job can reach. Only `complete` sets 100.
const MAX_ACTIVE_PROGRESS: u8 = 99;

/// Lifecycle status of a translation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A translation job as seen by status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    /// Human readable phase, for display only.
    pub step: String,
    /// 0 to 100, never decreases. 100 only once completed.
    pub progress: u8,
    pub total_files: usize,
    pub current: usize,
    pub original_name: String,
    pub target_language: String,
    /// Number of attempts started so far.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        original_name: impl Into<String>,
        target_language: impl Into<String>,
        source_path: PathBuf,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: JobStatus::Queued,
            step: "Queued".to_string(),
            progress: 0,
            total_files: 1,
            current: 0,
            original_name: original_name.into(),
            target_language: target_language.into(),
            attempts: 0,
            source_path: Some(source_path),
            result_path: None,
            error: None,
            created_at: now,
            last_updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `queued → processing` for the given attempt. A redelivered job that is
    /// still `processing` (its previous worker died) is claimed again.
    pub fn start_attempt(&mut self, attempt: u32) -> Result<(), JobError> {
        self.ensure_active(JobStatus::Processing)?;
        self.status = JobStatus::Processing;
        self.attempts = self.attempts.max(attempt);
        self.step = "Starting".to_string();
        Ok(())
    }

    /// `processing → queued` after a failed attempt that will be retried.
    /// Progress is kept; the error stays unset because the job has not failed.
    pub fn requeue(&mut self) -> Result<(), JobError> {
        self.ensure_active(JobStatus::Queued)?;
        self.status = JobStatus::Queued;
        self.step = "Waiting for retry".to_string();
        Ok(())
    }

    /// Records a step. Progress below the current value is ignored.
    pub fn record_step(&mut self, step: &str, progress: u8) -> Result<(), JobError> {
        self.ensure_active(self.status)?;
        self.step = step.to_string();
        self.progress = self.progress.max(progress.min(MAX_ACTIVE_PROGRESS));
        Ok(())
    }

    /// Records archive entry counters along with the derived progress.
    pub fn record_entries(
        &mut self,
        current: usize,
        total: usize,
        progress: u8,
    ) -> Result<(), JobError> {
        self.ensure_active(self.status)?;
        self.current = current;
        self.total_files = total;
        self.progress = self.progress.max(progress.min(MAX_ACTIVE_PROGRESS));
        Ok(())
    }

    pub fn complete(&mut self, result_path: PathBuf) -> Result<(), JobError> {
        self.ensure_active(JobStatus::Completed)?;
        self.status = JobStatus::Completed;
        self.step = "Completed".to_string();
        self.progress = 100;
        self.current = self.current.max(self.total_files);
        self.result_path = Some(result_path);
        self.error = None;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, error: &str) -> Result<(), JobError> {
        self.ensure_active(JobStatus::Failed)?;
        let message = error.trim();
        self.status = JobStatus::Failed;
        self.step = "Failed".to_string();
        self.error = Some(if message.is_empty() {
            "unknown error".to_string()
        } else {
            message.to_string()
        });
        self.result_path = None;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Marks the source upload as gone.
    pub fn clear_source(&mut self) {
        self.source_path = None;
    }

    fn ensure_active(&self, to: JobStatus) -> Result<(), JobError> {
        if self.is_terminal() {
            return Err(JobError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        Ok(())
    }
}
