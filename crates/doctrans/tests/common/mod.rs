//! Shared test utilities for doctrans integration tests.
//!
//! This module provides:
//! - `TestHarness` for running the full service against temp directories
//! - Stub translators and an in-process HTTP translation server
//! - `RecordingStore` for observing every job record change

#![allow(dead_code)]

pub mod server;
pub mod translators;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use doctrans::config::Config;
use doctrans::job::{Job, JobError, JobStatus, JobStore, MemoryJobStore};
use doctrans::storage::FileStorage;
use doctrans::translation::Translator;
use doctrans::TranslationService;

/// How long tests wait for a job to reach a terminal state.
pub const JOB_TIMEOUT: Duration = Duration::from_secs(20);

/// Job store that remembers every version of every record it held.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryJobStore,
    history: Mutex<Vec<Job>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded versions of one job, oldest first.
    pub fn history(&self, id: &str) -> Vec<Job> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|job| job.id == id)
            .cloned()
            .collect()
    }

    pub fn progress_values(&self, id: &str) -> Vec<u8> {
        self.history(id).iter().map(|job| job.progress).collect()
    }

    fn record(&self, job: &Job) {
        self.history.lock().unwrap().push(job.clone());
    }
}

impl JobStore for RecordingStore {
    fn insert(&self, job: Job) -> Result<(), JobError> {
        let snapshot = job.clone();
        self.inner.insert(job)?;
        self.record(&snapshot);
        Ok(())
    }

    fn get(&self, id: &str) -> Option<Job> {
        self.inner.get(id)
    }

    fn update(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut Job) -> Result<(), JobError>,
    ) -> Result<Job, JobError> {
        let updated = self.inner.update(id, apply)?;
        self.record(&updated);
        Ok(updated)
    }

    fn list(&self) -> Vec<Job> {
        self.inner.list()
    }
}

/// Isolated service environment backed by a temp data directory.
pub struct TestHarness {
    temp_dir: TempDir,
    pub config: Config,
    pub store: Arc<RecordingStore>,
}

impl TestHarness {
    /// One worker, three attempts, no backoff between them.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut config = Config::new(
            "http://127.0.0.1:9",
            temp_dir.path().join("data").to_string_lossy().to_string(),
        );
        config.worker_count = 1;
        config.queue.max_attempts = 3;
        config.queue.retry_backoff_ms = 0;

        Self {
            temp_dir,
            config,
            store: Arc::new(RecordingStore::new()),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn storage(&self) -> FileStorage {
        FileStorage::new(self.config.data_path())
    }

    /// Starts the service with this harness' store and the given translator.
    pub fn start(&self, translator: Arc<dyn Translator>) -> TranslationService {
        let store: Arc<dyn JobStore> = self.store.clone();
        TranslationService::with_store(&self.config, translator, store)
            .expect("Failed to start service")
    }
}

/// Polls until the job is completed or failed.
pub fn wait_for_terminal(service: &TranslationService, job_id: &str) -> Job {
    let deadline = Instant::now() + JOB_TIMEOUT;
    loop {
        let job = service.status(job_id).expect("job should exist");
        if job.is_terminal() {
            return job;
        }
        assert!(
            Instant::now() < deadline,
            "job {} did not finish, last state: {:?}",
            job_id,
            job
        );
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Waits for the queue to report the job's final outcome, after which its
/// upload and spool record are gone, and returns the job record.
pub fn wait_for_outcome(service: &TranslationService, job_id: &str) -> Job {
    let deadline = Instant::now() + JOB_TIMEOUT;
    while Instant::now() < deadline {
        if let Some(outcome) = service.next_outcome(Duration::from_millis(100)) {
            if outcome.job_id == job_id {
                return service.status(job_id).expect("job should exist");
            }
        }
    }
    panic!(
        "no outcome for job {}, last state: {:?}",
        job_id,
        service.status(job_id)
    );
}

/// Asserts that a job's progress never went down before it ended.
pub fn assert_monotonic(history: &[Job]) {
    let mut last = 0;
    for job in history {
        assert!(
            job.progress >= last,
            "progress went from {} to {} ({})",
            last,
            job.progress,
            job.step
        );
        last = job.progress;
        if job.status == JobStatus::Failed {
            break;
        }
    }
}

/// Builds an in-memory ZIP archive with stored (uncompressed) entries.
pub fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }
    buffer.into_inner()
}

/// Names and contents of the files in a ZIP archive on disk.
pub fn read_zip(path: &Path) -> Vec<(String, Vec<u8>)> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        if entry.is_dir() {
            continue;
        }
        let mut content = Vec::new();
        std::io::Read::read_to_end(&mut entry, &mut content).unwrap();
        entries.push((entry.name().to_string(), content));
    }
    entries
}

pub fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().to_string()
}

pub fn result_of(service: &TranslationService, job_id: &str) -> PathBuf {
    service.result_path(job_id).expect("result should be available")
}
