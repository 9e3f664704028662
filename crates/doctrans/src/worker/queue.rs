use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use futures_util::FutureExt;
use log::{debug, error, info, warn};

use crate::error::QueueError;
use crate::pipeline::{NoopProgress, Pipeline, PipelineError, ProgressReporter};
use crate::worker::spool::Spool;
use crate::worker::{Delivery, JobPayload};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFER_DELAY: Duration = Duration::from_millis(20);

/// Hooks the queue calls as deliveries move through it.
pub trait QueueObserver: Send + Sync {
    /// Reporter handed to the pipeline for one attempt.
    fn reporter(&self, _delivery: &Delivery) -> Box<dyn ProgressReporter> {
        Box::new(NoopProgress)
    }

    /// A spooled delivery was found at start-up and is about to be replayed.
    fn on_recovered(&self, _delivery: &Delivery) {}

    /// A worker took ownership of the delivery.
    fn on_claimed(&self, _delivery: &Delivery) {}

    /// The attempt failed and another one is scheduled after `delay`.
    fn on_retry(&self, _delivery: &Delivery, _error: &PipelineError, _delay: Duration) {}

    /// The job produced its result.
    fn on_completed(&self, _delivery: &Delivery, _result_path: &Path) {}

    /// The job ended without a result. May be called for a job whose failure
    /// was already recorded.
    fn on_exhausted(&self, _delivery: &Delivery, _error: &str) {}
}

pub struct NoopObserver;

impl QueueObserver for NoopObserver {}

/// Terminal result of a job, as seen by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub job_id: String,
    pub attempts: u32,
    pub result: Result<PathBuf, String>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    pub worker_count: usize,
    pub retry_backoff: Duration,
}

/// State shared by all workers.
struct Shared {
    pipeline: Arc<Pipeline>,
    observer: Arc<dyn QueueObserver>,
    spool: Spool,
    in_flight: Mutex<HashSet<String>>,
    sender: Sender<Delivery>,
    outcomes: Sender<JobOutcome>,
    shutdown: Arc<AtomicBool>,
    retry_backoff: Duration,
}

/// Pool of worker threads consuming deliveries at least once.
pub struct JobQueue {
    shared: Arc<Shared>,
    outcome_receiver: Receiver<JobOutcome>,
    workers: Vec<JoinHandle<()>>,
}

impl JobQueue {
    pub fn new(
        pipeline: Arc<Pipeline>,
        observer: Arc<dyn QueueObserver>,
        spool: Spool,
        settings: QueueSettings,
    ) -> Result<Self, QueueError> {
        if settings.worker_count == 0 {
            return Err(QueueError::SpawnFailed(
                "worker_count must be at least 1".to_string(),
            ));
        }

        let (sender, receiver) = unbounded::<Delivery>();
        let (outcome_sender, outcome_receiver) = unbounded::<JobOutcome>();

        let shared = Arc::new(Shared {
            pipeline,
            observer,
            spool,
            in_flight: Mutex::new(HashSet::new()),
            sender,
            outcomes: outcome_sender,
            shutdown: Arc::new(AtomicBool::new(false)),
            retry_backoff: settings.retry_backoff,
        });

        let mut workers = Vec::with_capacity(settings.worker_count);
        for worker_id in 0..settings.worker_count {
            let worker_shared = Arc::clone(&shared);
            let worker_rx = receiver.clone();

            let spawned = thread::Builder::new()
                .name(format!("doctrans-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, worker_rx, worker_shared));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    shared.shutdown.store(true, Ordering::Release);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(QueueError::SpawnFailed(e.to_string()));
                }
            }
        }

        info!("Started {} workers", settings.worker_count);

        Ok(Self {
            shared,
            outcome_receiver,
            workers,
        })
    }

    /// Persists the delivery to the spool and hands it to the pool.
    pub fn enqueue(&self, payload: JobPayload, max_attempts: u32) -> Result<(), QueueError> {
        if max_attempts == 0 {
            return Err(QueueError::InvalidAttempts(max_attempts));
        }
        if self.is_shutdown() {
            return Err(QueueError::ChannelClosed);
        }

        let delivery = Delivery::first(payload, max_attempts);
        self.shared.spool.save(&delivery, false)?;
        debug!("Enqueued job {}", delivery.job_id());

        self.shared
            .sender
            .send(delivery)
            .map_err(|_| QueueError::ChannelClosed)
    }

    /// Replays deliveries left in the spool by a previous process. Jobs whose
    /// attempts are used up are reported as exhausted instead. Returns the
    /// number of redelivered jobs.
    pub fn recover(&self) -> Result<usize, QueueError> {
        let mut redelivered = 0;

        for record in self.shared.spool.load_all()? {
            self.shared.observer.on_recovered(&record.delivery);

            match record.redelivery() {
                Some(delivery) => {
                    info!(
                        "Recovering job {} at attempt {}/{}",
                        delivery.job_id(),
                        delivery.attempt,
                        delivery.max_attempts
                    );
                    self.shared.spool.save(&delivery, false)?;
                    self.shared
                        .sender
                        .send(delivery)
                        .map_err(|_| QueueError::ChannelClosed)?;
                    redelivered += 1;
                }
                None => {
                    let delivery = record.delivery;
                    let message = format!(
                        "Job interrupted during its last attempt ({}/{})",
                        delivery.attempt, delivery.max_attempts
                    );
                    warn!("{}: {}", delivery.job_id(), message);
                    self.shared.finish(&delivery, Err(message));
                }
            }
        }

        Ok(redelivered)
    }

    pub fn recv_outcome_timeout(&self, timeout: Duration) -> Option<JobOutcome> {
        self.outcome_receiver.recv_timeout(timeout).ok()
    }

    /// Stops taking deliveries. Workers finish their current attempt; what is
    /// still queued stays in the spool for the next start.
    pub fn shutdown(&self) {
        info!("Shutting down job queue...");
        self.shared.shutdown.store(true, Ordering::Release);
    }

    pub fn wait(self) {
        self.shutdown();

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Flag shared with the workers, for signal handlers.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shared.shutdown)
    }
}

impl Shared {
    /// Claims the job id for the calling worker. `false` when another worker
    /// already owns it.
    fn claim(&self, job_id: &str) -> bool {
        match self.in_flight.lock() {
            Ok(mut in_flight) => in_flight.insert(job_id.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(job_id.to_string()),
        }
    }

    fn release(&self, job_id: &str) {
        match self.in_flight.lock() {
            Ok(mut in_flight) => in_flight.remove(job_id),
            Err(poisoned) => poisoned.into_inner().remove(job_id),
        };
    }

    fn redeliver(&self, delivery: Delivery, delay: Duration) {
        if delay.is_zero() {
            if self.sender.send(delivery).is_err() {
                warn!("Queue closed, delivery stays in the spool");
            }
            return;
        }

        let sender = self.sender.clone();
        let spawned = thread::Builder::new()
            .name("doctrans-retry".to_string())
            .spawn(move || {
                thread::sleep(delay);
                if sender.send(delivery).is_err() {
                    warn!("Queue closed, delivery stays in the spool");
                }
            });
        if let Err(e) = spawned {
            error!("Failed to schedule retry: {}", e);
        }
    }

    fn finish(&self, delivery: &Delivery, result: Result<PathBuf, String>) {
        if let Err(e) = self.spool.remove(delivery.job_id()) {
            warn!("{}", e);
        }
        match &result {
            Ok(result_path) => self.observer.on_completed(delivery, result_path),
            Err(message) => self.observer.on_exhausted(delivery, message),
        }

        let outcome = JobOutcome {
            job_id: delivery.job_id().to_string(),
            attempts: delivery.attempt,
            result,
        };
        // Nobody listening is fine.
        let _ = self.outcomes.send(outcome);
    }
}

fn run_worker(worker_id: usize, receiver: Receiver<Delivery>, shared: Arc<Shared>) {
    debug!("Worker {} started", worker_id);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Worker {} failed to start its runtime: {}", worker_id, e);
            return;
        }
    };

    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(delivery) => handle_delivery(worker_id, &runtime, &shared, delivery),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} delivery channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

fn handle_delivery(
    worker_id: usize,
    runtime: &tokio::runtime::Runtime,
    shared: &Shared,
    delivery: Delivery,
) {
    let job_id = delivery.job_id().to_string();

    if !shared.claim(&job_id) {
        debug!("Job {} is owned by another worker, deferring", job_id);
        shared.redeliver(delivery, DEFER_DELAY);
        return;
    }

    if let Err(e) = shared.spool.save(&delivery, true) {
        warn!("{}", e);
    }
    shared.observer.on_claimed(&delivery);
    debug!(
        "Worker {} processing job {} (attempt {}/{})",
        worker_id, job_id, delivery.attempt, delivery.max_attempts
    );

    let reporter = shared.observer.reporter(&delivery);
    let result = runtime
        .block_on(AssertUnwindSafe(shared.pipeline.run(&delivery, reporter.as_ref())).catch_unwind())
        .unwrap_or_else(|panic| {
            shared
                .pipeline
                .storage()
                .cleanup_attempt_dir(&job_id, delivery.attempt);
            Err(PipelineError::Panicked(panic_message(panic.as_ref())))
        });

    shared.release(&job_id);

    match result {
        Ok(result_path) => shared.finish(&delivery, Ok(result_path)),
        Err(e) if delivery.will_retry(e.is_retryable()) => {
            let delay = delivery.backoff(shared.retry_backoff);
            let next = delivery.next_attempt();
            if let Err(spool_err) = shared.spool.save(&next, false) {
                warn!("{}", spool_err);
            }
            shared.observer.on_retry(&delivery, &e, delay);
            shared.redeliver(next, delay);
        }
        Err(e) => {
            error!(
                "Job {} failed after {} attempt(s): {}",
                job_id, delivery.attempt, e
            );
            shared.finish(&delivery, Err(e.to_string()));
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
