use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What intake hands to the queue for one job. Replayed unchanged on every
/// attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    pub job_id: String,
    pub file_path: PathBuf,
    pub target_language: String,
    pub original_name: String,
}

/// One hand-off of a job to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub payload: JobPayload,
    /// 1-based number of this attempt.
    pub attempt: u32,
    pub max_attempts: u32,
}

impl Delivery {
    pub fn first(payload: JobPayload, max_attempts: u32) -> Self {
        Self {
            payload,
            attempt: 1,
            max_attempts,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.payload.job_id
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Whether a failure of this attempt leads to another one.
    pub fn will_retry(&self, retryable: bool) -> bool {
        retryable && !self.is_last_attempt()
    }

    pub fn next_attempt(&self) -> Self {
        Self {
            payload: self.payload.clone(),
            attempt: self.attempt + 1,
            max_attempts: self.max_attempts,
        }
    }

    /// Delay before the attempt after this one: `base * 2^(attempt-1)`.
    pub fn backoff(&self, base: Duration) -> Duration {
        let exponent = self.attempt.saturating_sub(1).min(16);
        base.saturating_mul(1u32 << exponent)
    }
}
