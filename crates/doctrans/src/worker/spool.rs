//! On-disk record of pending deliveries.
//!
//! One JSON file per job, `{dir}/{job_id}.json`. A record is written when a
//! job is enqueued, rewritten when a worker claims it and when a retry is
//! scheduled, and removed once the job reaches its terminal outcome. Whatever
//! is left at start-up was interrupted by a crash.

use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::storage::remove_file_if_exists;
use crate::worker::Delivery;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoolRecord {
    pub delivery: Delivery,
    /// Set once a worker has started this attempt.
    pub claimed: bool,
}

impl SpoolRecord {
    /// The delivery to replay after a crash. A claimed attempt counts as
    /// used; `None` when no attempt is left.
    pub fn redelivery(&self) -> Option<Delivery> {
        if !self.claimed {
            return Some(self.delivery.clone());
        }
        if self.delivery.is_last_attempt() {
            None
        } else {
            Some(self.delivery.next_attempt())
        }
    }
}

#[derive(Debug, Clone)]
pub struct Spool {
    dir: PathBuf,
}

impl Spool {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, QueueError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| QueueError::Spool {
            path: dir.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self { dir })
    }

    fn record_path(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", job_id))
    }

    pub fn save(&self, delivery: &Delivery, claimed: bool) -> Result<(), QueueError> {
        let path = self.record_path(delivery.job_id());
        let record = SpoolRecord {
            delivery: delivery.clone(),
            claimed,
        };
        let json = serde_json::to_vec_pretty(&record).map_err(|e| QueueError::Spool {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        crate::storage::write_atomic(&path, &json).map_err(|e| QueueError::Spool {
            path,
            reason: e.to_string(),
        })
    }

    pub fn remove(&self, job_id: &str) -> Result<(), QueueError> {
        let path = self.record_path(job_id);
        remove_file_if_exists(&path)
            .map(|_| ())
            .map_err(|e| QueueError::Spool {
                path,
                reason: e.to_string(),
            })
    }

    /// Loads every readable record, oldest job id first. Unreadable files
    /// are logged and skipped.
    pub fn load_all(&self) -> Result<Vec<SpoolRecord>, QueueError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| QueueError::Spool {
            path: self.dir.clone(),
            reason: e.to_string(),
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            let parsed = std::fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    serde_json::from_slice::<SpoolRecord>(&bytes).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable spool record {}: {}", path.display(), e),
            }
        }

        Ok(records)
    }
}
