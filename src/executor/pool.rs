//! Bounded worker pool for subprocess jobs.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Runs jobs on the tokio runtime, at most `workers` at a time
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    workers: usize,
    next_job: Arc<AtomicU64>,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            next_job: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Jobs that could start right now without waiting
    pub fn idle(&self) -> usize {
        self.permits.available_permits()
    }

    /// Spawn `job`; it waits for a free worker before running.
    pub fn submit<F, T>(&self, label: impl Into<String>, job: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permits = self.permits.clone();
        let label = label.into();
        let job_id = self.next_job.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(async move {
            let queued = Instant::now();
            // the semaphore is never closed
            let _permit = permits.acquire_owned().await.ok();
            tracing::debug!(
                job_id,
                job = %label,
                waited_ms = queued.elapsed().as_millis() as u64,
                "job started"
            );

            let started = Instant::now();
            let output = job.await;
            tracing::debug!(
                job_id,
                job = %label,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "job finished"
            );
            output
        })
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(4)
    }
}
