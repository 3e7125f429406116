//! # Worker Pool
//!
//! Bounded pool of tokio tasks executing submitted futures.
//!
//! ## Accounting
//!
//! A `Semaphore` with one permit per worker tracks free capacity. A job
//! takes a permit before it is queued and releases it when it finishes, so
//! queued plus running jobs never exceed the worker count. `try_add` never
//! waits for a permit, which is what lets the syncer shed load instead of
//! queueing unboundedly.
//!
//! Must be created inside a tokio runtime.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
use crate::domain::SyncError;

struct QueuedJob {
    job: BoxFuture<'static, ()>,
    _permit: OwnedSemaphorePermit,
}

/// Bounded concurrent worker pool.
pub struct Pool {
    size: usize,
    permits: Arc<Semaphore>,
    sender: Mutex<Option<mpsc::Sender<QueuedJob>>>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    finished: ShutdownTrigger,
}

impl Pool {
    /// Spawn `size` workers sharing one job queue.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (tx, rx) = mpsc::channel::<QueuedJob>(size);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let (finished, finished_signal) = shutdown_channel();

        let workers = (0..size)
            .map(|id| tokio::spawn(worker(id, rx.clone(), finished_signal.clone())))
            .collect();

        debug!("[qc-18] Worker pool started with {} workers", size);

        Self {
            size,
            permits: Arc::new(Semaphore::new(size)),
            sender: Mutex::new(Some(tx)),
            workers: tokio::sync::Mutex::new(workers),
            finished,
        }
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers not currently holding a job.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Whether `finish` has been called.
    pub fn is_finished(&self) -> bool {
        self.finished.is_fired()
    }

    /// Submit `job`, waiting for a free worker.
    ///
    /// Fails with `SyncError::PoolFinished` once the pool is finishing and
    /// with `SyncError::Cancelled` if `shutdown` fires first.
    pub async fn add<F>(&self, shutdown: &ShutdownSignal, job: F) -> Result<(), SyncError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_finished() {
            return Err(SyncError::PoolFinished);
        }
        let permit = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(SyncError::Cancelled),
            permit = self.permits.clone().acquire_owned() => {
                permit.map_err(|_| SyncError::PoolFinished)?
            }
        };
        self.enqueue(job.boxed(), permit)
    }

    /// Submit `job` only if a worker is free right now.
    pub fn try_add<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_finished() {
            return false;
        }
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => self.enqueue(job.boxed(), permit).is_ok(),
            Err(_) => false,
        }
    }

    fn enqueue(
        &self,
        job: BoxFuture<'static, ()>,
        permit: OwnedSemaphorePermit,
    ) -> Result<(), SyncError> {
        let sender = self.sender.lock().clone();
        let sender = sender.ok_or(SyncError::PoolFinished)?;
        // Capacity equals the permit count, so a permitted job always fits
        sender
            .try_send(QueuedJob {
                job,
                _permit: permit,
            })
            .map_err(|_| SyncError::PoolFinished)
    }

    /// Stop accepting work and wait until every worker has exited.
    ///
    /// Running jobs are awaited, queued ones are dropped. Idempotent; every
    /// caller returns only after the workers are gone.
    pub async fn finish(&self) {
        self.finished.fire();
        self.permits.close();
        self.sender.lock().take();

        let mut workers = self.workers.lock().await;
        let count = workers.len();
        for handle in workers.drain(..) {
            if let Err(e) = handle.await {
                warn!("[qc-18] Pool worker ended abnormally: {}", e);
            }
        }
        if count > 0 {
            debug!("[qc-18] Worker pool finished, {} workers joined", count);
        }
    }
}

async fn worker(
    id: usize,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedJob>>>,
    finished: ShutdownSignal,
) {
    loop {
        let next = {
            let mut rx = queue.lock().await;
            tokio::select! {
                biased;
                _ = finished.cancelled() => None,
                job = rx.recv() => job,
            }
        };
        match next {
            Some(queued) => {
                queued.job.await;
                // permit released here
            }
            None => break,
        }
    }
    debug!("[qc-18] Pool worker {} exited", id);
}
