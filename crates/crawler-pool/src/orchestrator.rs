//! Fan-out/fan-in job dispatch with first-error cancellation
//!
//! One unit of work per job identifier. Units check a shared cancellation
//! flag before doing anything; once any unit fails, the flag is set and
//! not-yet-started units skip themselves. In-flight units are never
//! interrupted — they drain to completion, and the orchestrator joins every
//! unit before returning. Exactly the first error is returned; errors from
//! other units that were already in flight are logged and discarded.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use github_client::DownloadError;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::pool::WorkerPool;
use crate::worker::CredentialWorker;

/// What a job identifier names, for logging and error context only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Org,
    Repo,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Org => write!(f, "org"),
            Self::Repo => write!(f, "repo"),
        }
    }
}

/// Drive `job` over every identifier in `ids`, concurrently, through the
/// pool's leases. Concurrency is bounded by pool size: excess units simply
/// wait inside lease acquisition.
///
/// Returns `Ok(())` when every job succeeded, otherwise the first failing
/// job's error wrapped with its resource kind and identifier.
pub async fn run_jobs<F, Fut>(
    pool: Arc<WorkerPool>,
    kind: ResourceKind,
    ids: Vec<String>,
    job: F,
) -> Result<()>
where
    F: Fn(Arc<CredentialWorker>, String) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), DownloadError>> + Send + 'static,
{
    let total = ids.len();
    info!(%kind, total, "started downloading all jobs");

    let cancelled = Arc::new(AtomicBool::new(false));
    // Single-slot, set-once: only the unit that wins the swap below writes
    let first_err: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));
    let done = Arc::new(AtomicU64::new(0));

    let mut units = JoinSet::new();
    for id in ids {
        if cancelled.load(Ordering::SeqCst) {
            debug!(%kind, "cancellation set, not dispatching remaining jobs");
            break;
        }

        let pool = Arc::clone(&pool);
        let cancelled = Arc::clone(&cancelled);
        let first_err = Arc::clone(&first_err);
        let done = Arc::clone(&done);
        let job = job.clone();

        units.spawn(async move {
            if cancelled.load(Ordering::SeqCst) {
                warn!(%kind, %id, "skipped, another job already failed");
                return;
            }

            let job_id = id.clone();
            let result = pool
                .with_lease(move |worker| {
                    debug!(%kind, id = %job_id, worker = worker.index(), "start downloading");
                    job(worker, job_id.clone())
                })
                .await;

            match result {
                Ok(()) => {
                    let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                    info!(%kind, %id, progress = %format!("{n}/{total}"), "finished downloading");
                }
                Err(e) => {
                    if cancelled.swap(true, Ordering::SeqCst) {
                        // Another unit already failed first; its error wins
                        warn!(%kind, %id, error = %e, "job failed after cancellation, discarding error");
                    } else {
                        error!(%kind, %id, error = %e, "job failed, cancelling remaining jobs");
                        *first_err.lock().await = Some(Error::Job {
                            kind,
                            id,
                            source: e,
                        });
                    }
                }
            }
        });
    }

    // Drain every dispatched unit; no background work survives this call
    while let Some(joined) = units.join_next().await {
        if let Err(e) = joined {
            warn!(%kind, error = %e, "job task panicked");
        }
    }

    match first_err.lock().await.take() {
        Some(e) => Err(e),
        None => {
            info!(%kind, total, "finished downloading all jobs");
            Ok(())
        }
    }
}
