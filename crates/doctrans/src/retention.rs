//! Periodic deletion of expired result artifacts.
//!
//! The sweeper only looks at the filesystem. Job records are left alone, so a
//! swept job still reads `completed` while its download is gone.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::storage::FileStorage;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub files_deleted: usize,
    pub directories_removed: usize,
    pub bytes_freed: u64,
    pub errors: Vec<String>,
}

pub struct RetentionSweeper {
    sweep: Arc<Sweep>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    trigger: broadcast::Sender<()>,
}

/// The part of the sweeper the background loop needs.
struct Sweep {
    storage: FileStorage,
    max_age: Duration,
}

impl RetentionSweeper {
    pub fn new(storage: FileStorage, max_age: Duration, interval: Duration) -> Self {
        let (trigger, _) = broadcast::channel(4);
        Self {
            sweep: Arc::new(Sweep { storage, max_age }),
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            trigger,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            FileStorage::new(config.data_path()),
            config.retention.max_age(),
            config.retention.sweep_interval(),
        )
    }

    pub fn sweep_once(&self) -> SweepReport {
        self.sweep.run(SystemTime::now())
    }

    /// Sweeps as if the current time were `now`.
    pub fn sweep_at(&self, now: SystemTime) -> SweepReport {
        self.sweep.run(now)
    }

    /// Runs the sweep loop on a background thread: one sweep per interval
    /// and one per [`trigger`](Self::trigger).
    pub fn start(&self) -> JoinHandle<()> {
        let sweep = Arc::clone(&self.sweep);
        let interval = self.interval;
        let shutdown = Arc::clone(&self.shutdown);
        let mut trigger_rx = self.trigger.subscribe();

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Retention sweeper failed to start its runtime: {}", e);
                    return;
                }
            };

            rt.block_on(async {
                let mut interval_timer = tokio::time::interval(interval);
                interval_timer.tick().await; // skip immediate first tick

                loop {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    tokio::select! {
                        _ = interval_timer.tick() => {},
                        Ok(()) = trigger_rx.recv() => {
                            log::info!("Manual retention sweep triggered");
                        },
                    }

                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    sweep.run(SystemTime::now());
                }
            });
        })
    }

    /// Requests an immediate sweep from the running loop.
    pub fn trigger(&self) {
        let _ = self.trigger.send(());
    }

    /// Signals the loop to stop and wakes it up.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.trigger.send(());
    }
}

impl Sweep {
    fn run(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();

        self.sweep_results(now, &mut report);

        info!(
            files_deleted = report.files_deleted,
            directories_removed = report.directories_removed,
            bytes_freed = report.bytes_freed,
            errors = report.errors.len(),
            "Retention sweep completed"
        );
        report
    }

    fn is_expired(&self, modified: SystemTime, now: SystemTime) -> bool {
        // A modification time in the future is never expired.
        now.duration_since(modified)
            .map(|age| age > self.max_age)
            .unwrap_or(false)
    }

    fn sweep_results(&self, now: SystemTime, report: &mut SweepReport) {
        let root = self.storage.results_root();
        if !root.exists() {
            return;
        }

        let files: Vec<(PathBuf, std::fs::Metadata)> = WalkDir::new(&root)
            .min_depth(1)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    report.errors.push(e.to_string());
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let metadata = entry.metadata().ok()?;
                Some((entry.into_path(), metadata))
            })
            .collect();

        let mut emptied: BTreeSet<PathBuf> = BTreeSet::new();
        for (path, metadata) in files {
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            if !self.is_expired(modified, now) {
                continue;
            }

            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Deleted expired artifact {}", path.display());
                    report.files_deleted += 1;
                    report.bytes_freed += metadata.len();
                    if let Some(parent) = path.parent() {
                        emptied.insert(parent.to_path_buf());
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to delete {}: {}", path.display(), e);
                    report
                        .errors
                        .push(format!("Failed to delete {}: {}", path.display(), e));
                }
            }
        }

        // Deepest first, so nested directories go before their parents.
        for dir in emptied.iter().rev() {
            remove_emptied_directory(dir, &root, report);
        }
    }
}

/// Removes `dir` and then its parents up to, but not including, `root`, for
/// as long as they are empty.
fn remove_emptied_directory(dir: &Path, root: &Path, report: &mut SweepReport) {
    let mut current = Some(dir);
    while let Some(path) = current {
        if path == root || !path.starts_with(root) {
            break;
        }
        // Fails for directories that still hold files.
        if std::fs::remove_dir(path).is_err() {
            break;
        }
        report.directories_removed += 1;
        current = path.parent();
    }
}
