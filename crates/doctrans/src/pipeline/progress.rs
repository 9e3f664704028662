use std::path::PathBuf;
use std::sync::Arc;

use log::warn;

use crate::job::JobStore;

/// Phases a job goes through, with the progress they stand for in a
/// single-document job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    Extracting,
    Translating,
    Saving,
    Unpacking,
    TranslatingEntries,
    Packing,
}

impl PipelineStep {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Extracting => "Extracting",
            Self::Translating => "Translating",
            Self::Saving => "Saving",
            Self::Unpacking => "Unpacking archive",
            Self::TranslatingEntries => "Translating archive entries",
            Self::Packing => "Packing archive",
        }
    }
}

/// Events emitted by the pipeline during one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Step { step: PipelineStep, progress: u8 },
    Entries {
        current: usize,
        total: usize,
        progress: u8,
    },
    Completed { result_path: PathBuf },
    Failed { error: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Writes pipeline events into the job store.
pub struct StoreProgress {
    store: Arc<dyn JobStore>,
    job_id: String,
}

impl StoreProgress {
    pub fn new(store: Arc<dyn JobStore>, job_id: impl Into<String>) -> Self {
        Self {
            store,
            job_id: job_id.into(),
        }
    }
}

impl ProgressReporter for StoreProgress {
    fn report(&self, event: ProgressEvent) {
        let result = match event {
            ProgressEvent::Step { step, progress } => {
                self.store.record_step(&self.job_id, step.label(), progress)
            }
            ProgressEvent::Entries {
                current,
                total,
                progress,
            } => self
                .store
                .record_entries(&self.job_id, current, total, progress),
            ProgressEvent::Completed { result_path } => {
                self.store.mark_completed(&self.job_id, result_path)
            }
            ProgressEvent::Failed { error } => self.store.mark_failed(&self.job_id, &error),
        };

        if let Err(e) = result {
            warn!("Failed to record progress for job {}: {}", self.job_id, e);
        }
    }
}
