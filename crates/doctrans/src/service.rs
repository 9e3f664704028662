//! Intake, status and download facade over the store, queue and sweeper.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{DownloadError, ServiceError};
use crate::job::{Job, JobError, JobStatus, JobStore, MemoryJobStore};
use crate::pipeline::{Pipeline, PipelineConfig, PipelineError, ProgressReporter, StoreProgress};
use crate::retention::{RetentionSweeper, SweepReport};
use crate::storage::FileStorage;
use crate::translation::Translator;
use crate::worker::{Delivery, JobOutcome, JobPayload, JobQueue, QueueObserver, QueueSettings, Spool};

/// Keeps job records in step with what the queue does.
pub struct StoreObserver {
    store: Arc<dyn JobStore>,
    storage: FileStorage,
}

impl StoreObserver {
    pub fn new(store: Arc<dyn JobStore>, storage: FileStorage) -> Self {
        Self { store, storage }
    }

    fn release_source(&self, delivery: &Delivery) {
        if let Err(e) = self.storage.remove_upload(&delivery.payload.file_path) {
            warn!("Failed to remove upload for job {}: {}", delivery.job_id(), e);
        }
        if let Err(e) = self.store.clear_source(delivery.job_id()) {
            debug!("Could not clear source of job {}: {}", delivery.job_id(), e);
        }
    }
}

impl QueueObserver for StoreObserver {
    fn reporter(&self, delivery: &Delivery) -> Box<dyn ProgressReporter> {
        Box::new(StoreProgress::new(
            Arc::clone(&self.store),
            delivery.job_id(),
        ))
    }

    fn on_recovered(&self, delivery: &Delivery) {
        self.storage.remove_job_tmp(delivery.job_id());

        if self.store.get(delivery.job_id()).is_some() {
            return;
        }

        let payload = &delivery.payload;
        let mut job = Job::new(
            payload.job_id.clone(),
            payload.original_name.clone(),
            payload.target_language.clone(),
            payload.file_path.clone(),
        );
        job.attempts = delivery.attempt.saturating_sub(1);
        if let Err(e) = self.store.insert(job) {
            warn!("Failed to restore job {}: {}", delivery.job_id(), e);
        }
    }

    fn on_claimed(&self, delivery: &Delivery) {
        if let Err(e) = self.store.mark_processing(delivery.job_id(), delivery.attempt) {
            warn!("Failed to mark job {} processing: {}", delivery.job_id(), e);
        }
    }

    fn on_retry(&self, delivery: &Delivery, error: &PipelineError, delay: Duration) {
        info!(
            "Job {} attempt {}/{} failed ({}), retrying in {:?}",
            delivery.job_id(),
            delivery.attempt,
            delivery.max_attempts,
            error,
            delay
        );
        if let Err(e) = self.store.mark_queued(delivery.job_id()) {
            warn!("Failed to requeue job {}: {}", delivery.job_id(), e);
        }
    }

    fn on_completed(&self, delivery: &Delivery, result_path: &Path) {
        match self
            .store
            .mark_completed(delivery.job_id(), result_path.to_path_buf())
        {
            Ok(_) | Err(JobError::InvalidTransition { .. }) => {}
            Err(e) => warn!("Failed to complete job {}: {}", delivery.job_id(), e),
        }
        self.release_source(delivery);
    }

    fn on_exhausted(&self, delivery: &Delivery, error: &str) {
        match self.store.mark_failed(delivery.job_id(), error) {
            Ok(_) | Err(JobError::InvalidTransition { .. }) => {}
            Err(e) => warn!("Failed to fail job {}: {}", delivery.job_id(), e),
        }
        self.release_source(delivery);
    }
}

pub struct TranslationService {
    storage: FileStorage,
    store: Arc<dyn JobStore>,
    queue: JobQueue,
    sweeper: RetentionSweeper,
    sweeper_handle: Mutex<Option<JoinHandle<()>>>,
    max_attempts: u32,
}

impl TranslationService {
    /// Starts the workers with an in-memory job store.
    pub fn start(config: &Config, translator: Arc<dyn Translator>) -> Result<Self, ServiceError> {
        Self::with_store(config, translator, Arc::new(MemoryJobStore::new()))
    }

    pub fn with_store(
        config: &Config,
        translator: Arc<dyn Translator>,
        store: Arc<dyn JobStore>,
    ) -> Result<Self, ServiceError> {
        let storage = FileStorage::new(config.data_path());
        storage.initialize()?;

        let pipeline = Arc::new(Pipeline::from_config(
            &PipelineConfig::from_config(config),
            translator,
        ));
        let observer = Arc::new(StoreObserver::new(Arc::clone(&store), storage.clone()));
        let queue = JobQueue::new(
            pipeline,
            observer,
            Spool::open(storage.queue_dir())?,
            QueueSettings {
                worker_count: config.worker_count,
                retry_backoff: config.queue.retry_backoff(),
            },
        )?;

        info!(
            "Translation service started with data directory {}",
            storage.root().display()
        );

        Ok(Self {
            storage,
            store,
            queue,
            sweeper: RetentionSweeper::from_config(config),
            sweeper_handle: Mutex::new(None),
            max_attempts: config.queue.max_attempts,
        })
    }

    /// Stores the upload, records a `queued` job and enqueues it. The upload
    /// is on disk before the job becomes visible to workers.
    pub fn submit(
        &self,
        content: &[u8],
        original_name: &str,
        target_language: &str,
    ) -> Result<String, ServiceError> {
        let target_language = target_language.trim();
        if target_language.is_empty() {
            return Err(ServiceError::InvalidSubmission(
                "target language must not be empty".to_string(),
            ));
        }
        if original_name.trim().is_empty() {
            return Err(ServiceError::InvalidSubmission(
                "file name must not be empty".to_string(),
            ));
        }

        let job_id = Uuid::new_v4().to_string();
        let file_path = self.storage.store_upload(&job_id, original_name, content)?;
        let stored_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(original_name)
            .to_string();

        self.store.insert(Job::new(
            job_id.clone(),
            stored_name.clone(),
            target_language,
            file_path.clone(),
        ))?;

        let payload = JobPayload {
            job_id: job_id.clone(),
            file_path: file_path.clone(),
            target_language: target_language.to_string(),
            original_name: stored_name,
        };

        if let Err(e) = self.queue.enqueue(payload, self.max_attempts) {
            let _ = self.store.mark_failed(&job_id, &e.to_string());
            if let Err(remove_err) = self.storage.remove_upload(&file_path) {
                warn!("Failed to remove upload for job {}: {}", job_id, remove_err);
            }
            let _ = self.store.clear_source(&job_id);
            return Err(e.into());
        }

        info!("Accepted job {} ({} bytes)", job_id, content.len());
        Ok(job_id)
    }

    pub fn status(&self, job_id: &str) -> Result<Job, ServiceError> {
        self.store
            .get(job_id)
            .ok_or_else(|| ServiceError::NotFound(job_id.to_string()))
    }

    /// Path of the translated artifact, once the job has completed and as
    /// long as the artifact has not been swept.
    pub fn result_path(&self, job_id: &str) -> Result<PathBuf, DownloadError> {
        let job = self
            .store
            .get(job_id)
            .ok_or_else(|| DownloadError::NotFound(job_id.to_string()))?;

        if job.status != JobStatus::Completed {
            return Err(DownloadError::NotReady(job_id.to_string()));
        }

        match job.result_path {
            Some(path) if path.is_file() => Ok(path),
            _ => Err(DownloadError::NotFound(job_id.to_string())),
        }
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.store.list()
    }

    /// Replays deliveries interrupted by a previous shutdown or crash.
    pub fn recover(&self) -> Result<usize, ServiceError> {
        let recovered = self.queue.recover()?;
        if recovered > 0 {
            info!("Recovered {} interrupted job(s)", recovered);
        }
        Ok(recovered)
    }

    pub fn next_outcome(&self, timeout: Duration) -> Option<JobOutcome> {
        self.queue.recv_outcome_timeout(timeout)
    }

    pub fn sweep_now(&self) -> SweepReport {
        self.sweeper.sweep_once()
    }

    /// Starts the periodic retention sweep. Calling it twice has no effect.
    pub fn start_retention(&self) {
        let mut handle = match self.sweeper_handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if handle.is_none() {
            *handle = Some(self.sweeper.start());
        }
    }

    pub fn shutdown_flag(&self) -> Arc<std::sync::atomic::AtomicBool> {
        self.queue.shutdown_flag()
    }

    /// Stops the sweeper and waits for the workers to finish their current
    /// attempt.
    pub fn shutdown(self) {
        self.sweeper.stop();
        let handle = match self.sweeper_handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Retention sweeper panicked");
            }
        }

        self.queue.wait();
        info!("Translation service stopped");
    }
}
