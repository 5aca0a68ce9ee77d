//! Bounded worker pool for socket-bound tasks.
//!
//! At most `workers` tasks run at once; up to `queue_capacity` more may wait
//! for a worker. Beyond that, [`WorkerPool::try_submit`] rejects and
//! [`WorkerPool::submit`] waits for a slot.

use crate::{DiscoveryError, DiscoveryResult};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tracing::info;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Tasks running concurrently.
    pub workers: usize,
    /// Tasks allowed to wait for a worker.
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            queue_capacity: 64,
        }
    }
}

/// A pool of handshake workers.
#[derive(Clone)]
pub struct WorkerPool {
    /// Permits for running tasks.
    workers: Arc<Semaphore>,
    /// Permits for running plus queued tasks.
    slots: Arc<Semaphore>,
    /// Running flag.
    running: Arc<AtomicBool>,
    capacity: usize,
}

impl WorkerPool {
    /// Create a new pool.
    pub fn new(config: PoolConfig) -> Self {
        let workers = config.workers.max(1);
        let capacity = workers + config.queue_capacity;
        info!(workers, queue = config.queue_capacity, "Worker pool created");
        Self {
            workers: Arc::new(Semaphore::new(workers)),
            slots: Arc::new(Semaphore::new(capacity)),
            running: Arc::new(AtomicBool::new(true)),
            capacity,
        }
    }

    /// Submit without waiting; fails if every slot is taken.
    ///
    /// The handle yields `None` if the pool shut down before the task started.
    pub fn try_submit<F>(&self, task: F) -> DiscoveryResult<JoinHandle<Option<F::Output>>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if !self.is_running() {
            return Err(DiscoveryError::ShutDown);
        }
        let slot = self.slots.clone().try_acquire_owned().map_err(|e| match e {
            TryAcquireError::NoPermits => DiscoveryError::PoolSaturated {
                capacity: self.capacity,
            },
            TryAcquireError::Closed => DiscoveryError::ShutDown,
        })?;
        Ok(self.spawn(slot, task))
    }

    /// Submit, waiting for a free slot if necessary.
    pub async fn submit<F>(&self, task: F) -> DiscoveryResult<JoinHandle<Option<F::Output>>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if !self.is_running() {
            return Err(DiscoveryError::ShutDown);
        }
        let slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DiscoveryError::ShutDown)?;
        Ok(self.spawn(slot, task))
    }

    fn spawn<F>(&self, slot: OwnedSemaphorePermit, task: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let workers = Arc::clone(&self.workers);
        tokio::spawn(async move {
            let _slot = slot;
            let _worker = workers.acquire_owned().await.ok()?;
            Some(task.await)
        })
    }

    /// Tasks running or queued.
    pub fn pending(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check if the pool accepts work.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Refuse new work and drop queued tasks; running tasks finish on their own.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::Relaxed) {
            self.slots.close();
            self.workers.close();
            info!("Worker pool shutdown complete");
        }
    }
}
