//! Worker pool with exclusive leases and run lifecycle
//!
//! The free-list plus semaphore give the two lease guarantees: a permit is
//! only issued when a worker is on the free list, and popping under the lock
//! means no two leases ever see the same worker. No fairness ordering among
//! free workers is promised. With bounded demand every waiter eventually
//! acquires a worker once leases are released.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use snapshot_store::SnapshotStore;
use tokio::sync::{Mutex, Semaphore};
use tracing::debug;

use crate::error::{Error, Result};
use crate::worker::{CredentialWorker, RateUsage};

/// Statistics for one finished run.
#[derive(Debug, Clone)]
pub struct RunStats {
    /// Wall-clock time between `begin` and `end`.
    pub elapsed: Duration,
    /// One record per credential, in pool order.
    pub rates_usage: Vec<RateUsage>,
}

struct RunState {
    version: u64,
    started: Instant,
}

/// Bounded pool of credential workers sharing one snapshot store.
pub struct WorkerPool {
    workers: Vec<Arc<CredentialWorker>>,
    free: Mutex<Vec<Arc<CredentialWorker>>>,
    permits: Semaphore,
    run: Mutex<Option<RunState>>,
    store: Arc<dyn SnapshotStore>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.workers.len())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Build a pool with one worker per credential. Fails when the worker
    /// list is empty; a pool of size zero could never grant a lease.
    pub fn new(workers: Vec<CredentialWorker>, store: Arc<dyn SnapshotStore>) -> Result<Self> {
        if workers.is_empty() {
            return Err(Error::NoCredentials);
        }
        let workers: Vec<Arc<CredentialWorker>> = workers.into_iter().map(Arc::new).collect();
        let free = workers.clone();
        let size = workers.len();
        debug!(size, "worker pool built");
        Ok(Self {
            workers,
            free: Mutex::new(free),
            permits: Semaphore::new(size),
            run: Mutex::new(None),
            store,
        })
    }

    /// Number of workers, equal to the credential count.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// The store every worker writes into.
    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    /// Run `task` with an exclusively leased worker.
    ///
    /// Waits until a worker is free, runs the task, returns the worker to
    /// the free list, and passes the task's output through unchanged. The
    /// pool never retries a failed task.
    pub async fn with_lease<T, F, Fut>(&self, task: F) -> T
    where
        F: FnOnce(Arc<CredentialWorker>) -> Fut,
        Fut: Future<Output = T>,
    {
        // The semaphore is never closed, so acquire cannot fail
        let _permit = self
            .permits
            .acquire()
            .await
            .expect("pool semaphore closed");
        let worker = self
            .free
            .lock()
            .await
            .pop()
            .expect("permit issued with empty free list");

        let out = task(Arc::clone(&worker)).await;

        self.free.lock().await.push(worker);
        out
    }

    /// Open a run: start the timer and open the store's write scope for
    /// `version`. Fails when a run is already open.
    pub async fn begin(&self, version: u64) -> Result<()> {
        let mut run = self.run.lock().await;
        if run.is_some() {
            return Err(Error::RunAlreadyStarted);
        }
        self.store.begin(version).await?;
        *run = Some(RunState {
            version,
            started: Instant::now(),
        });
        Ok(())
    }

    /// Close the run: commit the write scope and report stats. Fails when
    /// `begin` was never called.
    pub async fn end(&self) -> Result<RunStats> {
        let mut run = self.run.lock().await;
        let state = run.take().ok_or(Error::RunNotStarted)?;
        self.store.commit().await?;

        let elapsed = state.started.elapsed();
        let rates_usage = self.workers.iter().map(|w| w.rate_usage(elapsed)).collect();
        debug!(version = state.version, ?elapsed, "run finished");
        Ok(RunStats {
            elapsed,
            rates_usage,
        })
    }
}
