//! Error types for client and downloader operations

use snapshot_store::StoreError;

/// Errors from the REST client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid credential: {0}")]
    InvalidToken(String),

    #[error("authentication rejected (status {0})")]
    Auth(u16),

    #[error("rate limited by the API")]
    RateLimited,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed repository identifier: {0}")]
    InvalidRepository(String),
}

/// Errors from a download job: the network call or the sink.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
