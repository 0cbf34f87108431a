//! Error types for pool and orchestrator operations

use github_client::DownloadError;
use snapshot_store::StoreError;

use crate::orchestrator::ResourceKind;

/// Errors from pool lifecycle and orchestrated jobs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no credentials configured, the pool needs at least one token")]
    NoCredentials,

    #[error("run already started, call end before begin")]
    RunAlreadyStarted,

    #[error("run not started, call begin first")]
    RunNotStarted,

    #[error("error while downloading {kind} '{id}': {source}")]
    Job {
        kind: ResourceKind,
        id: String,
        #[source]
        source: DownloadError,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
