//! Bounded job queue drained by a fixed worker pool.

use super::job::Job;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

type JobQueue = Arc<Mutex<mpsc::Receiver<Box<dyn Job>>>>;

/// Dispatcher sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Capacity of the bounded job queue
    pub queue_size: usize,
    /// Number of worker tasks
    pub workers: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_size: 100,
            workers: 10,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.queue_size == 0 {
            return Err(DispatchError::InvalidConfig("queue_size must be positive"));
        }
        if self.workers == 0 {
            return Err(DispatchError::InvalidConfig("workers must be positive"));
        }
        Ok(())
    }
}

/// Dispatcher errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("invalid dispatcher config: {0}")]
    InvalidConfig(&'static str),
}

#[derive(Debug, Default)]
struct Counters {
    scheduled: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time dispatcher counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub scheduled: u64,
    pub executed: u64,
    pub failed: u64,
    /// Jobs that never reached the queue because the dispatcher shut down
    pub dropped: u64,
}

/// Delayed, fire-and-forget job dispatcher.
///
/// Cloning is cheap; every producer holds its own clone. Workers exit once
/// every clone (and every pending timer) is gone and the queue is drained.
#[derive(Clone)]
pub struct Dispatcher {
    sender: mpsc::Sender<Box<dyn Job>>,
    counters: Arc<Counters>,
}

impl Dispatcher {
    /// Spawn the worker pool and return the dispatcher with the worker handles
    pub fn start(config: DispatcherConfig) -> Result<(Self, Vec<JoinHandle<()>>), DispatchError> {
        config.validate()?;

        let (sender, receiver) = mpsc::channel(config.queue_size);
        let queue: JobQueue = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(Counters::default());

        let workers = (0..config.workers)
            .map(|id| tokio::spawn(worker(id, Arc::clone(&queue), Arc::clone(&counters))))
            .collect();

        log::info!(
            "Dispatcher started with {} workers, queue size {}",
            config.workers,
            config.queue_size
        );

        Ok((Self { sender, counters }, workers))
    }

    /// Schedule `job` to run after `delay`.
    ///
    /// Returns immediately. A timer task waits out the delay and then
    /// enqueues the job, waiting for queue space if needed. Scheduled jobs
    /// cannot be cancelled.
    pub fn dispatch<J: Job>(&self, job: J, delay: Duration) {
        self.dispatch_boxed(Box::new(job), delay);
    }

    pub fn dispatch_boxed(&self, job: Box<dyn Job>, delay: Duration) {
        self.counters.scheduled.fetch_add(1, Ordering::Relaxed);

        let sender = self.sender.clone();
        let counters = Arc::clone(&self.counters);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let name = job.name();
            if sender.send(job).await.is_err() {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("Dispatcher closed, dropping job {name}");
            }
        });
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            scheduled: self.counters.scheduled.load(Ordering::Relaxed),
            executed: self.counters.executed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

async fn worker(id: usize, queue: JobQueue, counters: Arc<Counters>) {
    loop {
        // Lock only for the receive; execution runs unlocked
        let job = queue.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };

        let name = job.name();
        // Run in its own task so a panicking job cannot take the worker down
        match tokio::spawn(job.execute()).await {
            Ok(Ok(())) => {
                counters.executed.fetch_add(1, Ordering::Relaxed);
                log::debug!("Worker {id}: job {name} done");
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("Worker {id}: job {name} failed: {e:#}");
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                log::error!("Worker {id}: job {name} panicked: {e}");
            }
        }
    }

    log::debug!("Worker {id} stopped");
}
