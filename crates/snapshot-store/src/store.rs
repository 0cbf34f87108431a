//! The `SnapshotStore` trait and store-level errors

use async_trait::async_trait;

use crate::models::{
    Issue, IssueComment, Organization, PullRequest, PullRequestReview, PullRequestReviewComment,
    Repository, User,
};

/// Errors from snapshot store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no write scope open, call begin first")]
    NoWriteScope,

    #[error("write scope already open for version {0}")]
    WriteScopeOpen(u64),

    #[error("version {0} has no data, refusing to publish it")]
    VersionConflict(u64),

    #[error("database error: {0}")]
    Database(String),
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistence target for one crawl run.
///
/// A run opens a write scope with `begin(version)`, pushes entities through
/// the `save_*` operations (from several tasks concurrently), then finalizes
/// with `commit`. The data only becomes visible to readers once
/// `set_active_version` publishes the version; `cleanup` garbage-collects
/// every other version.
///
/// Save operations must tolerate interleaved calls from concurrent leases.
/// Within one job the caller guarantees parent-before-child order (an issue
/// comment never arrives before its issue), but nothing is guaranteed across
/// jobs. Exactly-once delivery across process crashes is not part of the
/// contract: a crash mid-run leaves an orphaned non-current version, which is
/// harmless until a later cleanup removes it.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Open the write scope for `version`. All subsequent saves are tagged
    /// with this version until `commit` or `rollback`.
    async fn begin(&self, version: u64) -> Result<()>;

    /// Finalize the write scope, making the run's rows durable (still
    /// unpublished until `set_active_version`).
    async fn commit(&self) -> Result<()>;

    /// Abandon the write scope, discarding the run's rows where the backend
    /// supports it.
    async fn rollback(&self) -> Result<()>;

    /// Save an organization. Resets the pending user collection for it.
    async fn save_organization(&self, org: &Organization) -> Result<()>;

    /// Save one member of a previously saved organization.
    async fn save_user(&self, org_id: i64, org_login: &str, user: &User) -> Result<()>;

    /// Save a repository with its topics. Resets the per-repository
    /// collections (issues, comments, PRs, reviews) so a prior repository's
    /// data cannot leak into this one.
    async fn save_repository(&self, repo: &Repository, topics: &[String]) -> Result<()>;

    async fn save_issue(
        &self,
        owner: &str,
        name: &str,
        issue: &Issue,
        assignees: &[String],
        labels: &[String],
    ) -> Result<()>;

    async fn save_issue_comment(
        &self,
        owner: &str,
        name: &str,
        issue_number: i64,
        comment: &IssueComment,
    ) -> Result<()>;

    async fn save_pull_request(
        &self,
        owner: &str,
        name: &str,
        pr: &PullRequest,
        assignees: &[String],
        labels: &[String],
    ) -> Result<()>;

    async fn save_pull_request_comment(
        &self,
        owner: &str,
        name: &str,
        pr_number: i64,
        comment: &IssueComment,
    ) -> Result<()>;

    async fn save_pull_request_review(
        &self,
        owner: &str,
        name: &str,
        pr_number: i64,
        review: &PullRequestReview,
    ) -> Result<()>;

    async fn save_pull_request_review_comment(
        &self,
        owner: &str,
        name: &str,
        pr_number: i64,
        review_id: i64,
        comment: &PullRequestReviewComment,
    ) -> Result<()>;

    /// Publish `version` as the current one. A single indivisible transition:
    /// concurrent readers see either the old current version or the new one,
    /// never a mix. Fails with `VersionConflict` when `version` has no data.
    async fn set_active_version(&self, version: u64) -> Result<()>;

    /// Delete every row whose version differs from `current`. Never touches
    /// rows of `current`. Best-effort: callers treat a failure as non-fatal.
    async fn cleanup(&self, current: u64) -> Result<()>;
}
