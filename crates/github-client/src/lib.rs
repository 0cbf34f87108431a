//! GitHub REST client and downloader facade
//!
//! One `GithubClient` per credential: it injects the bearer token, counts
//! every request it sends, and maps non-success statuses to typed errors.
//! The `Downloader` binds a client to the shared snapshot store and walks the
//! entity hierarchy parent-first (organization before members, repository
//! before issues, issue before its comments).
//!
//! Retry and backoff are deliberately not implemented here; they belong to
//! the transport layer in front of the API.

pub mod client;
pub mod downloader;
pub mod error;

pub use client::GithubClient;
pub use downloader::{Downloader, split_repo_id};
pub use error::{ClientError, DownloadError};
