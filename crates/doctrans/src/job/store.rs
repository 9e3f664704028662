//! Job record storage.
//!
//! Every mutation goes through [`JobStore::update`], which applies a closure
//! to one record atomically. The in-memory implementation shards records
//! across a [`DashMap`], so updates to different jobs never contend.

use std::path::PathBuf;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::job::{Job, JobError};

pub trait JobStore: Send + Sync {
    fn insert(&self, job: Job) -> Result<(), JobError>;

    fn get(&self, id: &str) -> Option<Job>;

    /// Applies `apply` to the record. The change is kept only when `apply`
    /// returns `Ok`. Returns the updated record.
    fn update(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut Job) -> Result<(), JobError>,
    ) -> Result<Job, JobError>;

    fn list(&self) -> Vec<Job>;

    fn mark_processing(&self, id: &str, attempt: u32) -> Result<Job, JobError> {
        self.update(id, &mut |job| job.start_attempt(attempt))
    }

    fn mark_queued(&self, id: &str) -> Result<Job, JobError> {
        self.update(id, &mut |job| job.requeue())
    }

    fn record_step(&self, id: &str, step: &str, progress: u8) -> Result<Job, JobError> {
        self.update(id, &mut |job| job.record_step(step, progress))
    }

    fn record_entries(
        &self,
        id: &str,
        current: usize,
        total: usize,
        progress: u8,
    ) -> Result<Job, JobError> {
        self.update(id, &mut |job| job.record_entries(current, total, progress))
    }

    fn mark_completed(&self, id: &str, result_path: PathBuf) -> Result<Job, JobError> {
        self.update(id, &mut |job| job.complete(result_path.clone()))
    }

    fn mark_failed(&self, id: &str, error: &str) -> Result<Job, JobError> {
        self.update(id, &mut |job| job.fail(error))
    }

    fn clear_source(&self, id: &str) -> Result<Job, JobError> {
        self.update(id, &mut |job| {
            job.clear_source();
            Ok(())
        })
    }
}

/// Sharded in-memory job store.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: DashMap<String, Job>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, job: Job) -> Result<(), JobError> {
        match self.jobs.entry(job.id.clone()) {
            Entry::Occupied(_) => Err(JobError::AlreadyExists(job.id)),
            Entry::Vacant(slot) => {
                slot.insert(job);
                Ok(())
            }
        }
    }

    fn get(&self, id: &str) -> Option<Job> {
        self.jobs.get(id).map(|job| job.clone())
    }

    fn update(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut Job) -> Result<(), JobError>,
    ) -> Result<Job, JobError> {
        let mut entry = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;

        let mut draft = entry.clone();
        apply(&mut draft)?;
        draft.last_updated_at = Utc::now();
        *entry = draft;
        Ok(entry.clone())
    }

    fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.iter().map(|e| e.value().clone()).collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use std::sync::Arc;

    fn job(id: &str) -> Job {
        Job::new(id, "hello.txt", "es", PathBuf::from("/tmp/hello.txt"))
    }

    #[test]
    fn test_insert_and_get() {
        let store = MemoryJobStore::new();
        store.insert(job("a")).unwrap();

        let found = store.get("a").unwrap();
        assert_eq!(found.status, JobStatus::Queued);
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let store = MemoryJobStore::new();
        store.insert(job("a")).unwrap();
        assert_eq!(
            store.insert(job("a")),
            Err(JobError::AlreadyExists("a".to_string()))
        );
    }

    #[test]
    fn test_update_missing_job() {
        let store = MemoryJobStore::new();
        let result = store.record_step("missing", "Translating", 50);
        assert_eq!(result, Err(JobError::NotFound("missing".to_string())));
    }

    #[test]
    fn test_failed_update_leaves_record_untouched() {
        let store = MemoryJobStore::new();
        store.insert(job("a")).unwrap();
        store.mark_failed("a", "ExtractionError: empty").unwrap();
        let before = store.get("a").unwrap();

        assert!(store.mark_completed("a", PathBuf::from("/x")).is_err());
        assert_eq!(store.get("a").unwrap(), before);
    }

    #[test]
    fn test_lifecycle_through_store() {
        let store = MemoryJobStore::new();
        store.insert(job("a")).unwrap();

        store.mark_processing("a", 1).unwrap();
        store.record_step("a", "Translating", 50).unwrap();
        store.mark_queued("a").unwrap();
        let requeued = store.get("a").unwrap();
        assert_eq!(requeued.status, JobStatus::Queued);
        assert_eq!(requeued.progress, 50);

        store.mark_processing("a", 2).unwrap();
        let done = store
            .mark_completed("a", PathBuf::from("/data/results/a/out.txt"))
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.attempts, 2);
        assert!(done.last_updated_at >= done.created_at);
    }

    #[test]
    fn test_concurrent_updates_are_atomic() {
        let store = Arc::new(MemoryJobStore::new());
        store.insert(job("a")).unwrap();
        store.mark_processing("a", 1).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for n in 0..50u8 {
                        let _ = store.record_step("a", "Translating", n + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get("a").unwrap().progress, 49 + 7);
    }

    #[test]
    fn test_list_sorted_by_creation() {
        let store = MemoryJobStore::new();
        store.insert(job("first")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.insert(job("second")).unwrap();

        let ids: Vec<String> = store.list().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec!["first", "second"]);
        assert_eq!(store.len(), 2);
    }
}
