//! Versioned snapshot sink for crawled GitHub metadata
//!
//! Every entity saved during a crawl run is tagged with the run's version.
//! Exactly one version is "current" at any time; publishing a new version is
//! a single indivisible transition, and garbage collection deletes everything
//! that is not current. Three interchangeable variants implement the same
//! `SnapshotStore` contract:
//!
//! - `ConsoleStore` — one human-readable log line per entity, no state
//! - `MemoryStore` — in-memory reference implementation, used by tests
//! - `PostgresStore` — one transaction per run, rows tagged with a version column

mod console;
mod memory;
mod models;
mod postgres;
mod store;

pub use console::ConsoleStore;
pub use memory::MemoryStore;
pub use models::{
    Actor, BranchRef, Issue, IssueComment, Label, Organization, PullRequest, PullRequestReview,
    PullRequestReviewComment, Repository, User,
};
pub use postgres::PostgresStore;
pub use store::{SnapshotStore, StoreError};
