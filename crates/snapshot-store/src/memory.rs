//! In-memory reference implementation of `SnapshotStore`
//!
//! Primarily for tests. Rows carry the version they were written under, the
//! same way the Postgres variant tags its rows, so the version lifecycle
//! (publish, cleanup) can be exercised without a database. Accessors return
//! only rows of the active version.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::{
    Issue, IssueComment, Organization, PullRequest, PullRequestReview, PullRequestReviewComment,
    Repository, User,
};
use crate::store::{Result, SnapshotStore, StoreError};

/// A row tagged with the crawl version that produced it.
#[derive(Debug, Clone)]
struct Versioned<T> {
    version: u64,
    item: T,
}

#[derive(Debug, Default)]
struct State {
    write_version: Option<u64>,
    active_version: Option<u64>,
    organizations: Vec<Versioned<Organization>>,
    users: Vec<Versioned<User>>,
    repositories: Vec<Versioned<Repository>>,
    topics: Vec<Versioned<String>>,
    issues: Vec<Versioned<Issue>>,
    issue_comments: Vec<Versioned<IssueComment>>,
    pull_requests: Vec<Versioned<PullRequest>>,
    pr_comments: Vec<Versioned<IssueComment>>,
    pr_reviews: Vec<Versioned<PullRequestReview>>,
    pr_review_comments: Vec<Versioned<PullRequestReviewComment>>,
}

impl State {
    fn write_version(&self) -> Result<u64> {
        self.write_version.ok_or(StoreError::NoWriteScope)
    }

    fn has_rows(&self, version: u64) -> bool {
        self.organizations.iter().any(|r| r.version == version)
            || self.users.iter().any(|r| r.version == version)
            || self.repositories.iter().any(|r| r.version == version)
            || self.topics.iter().any(|r| r.version == version)
            || self.issues.iter().any(|r| r.version == version)
            || self.issue_comments.iter().any(|r| r.version == version)
            || self.pull_requests.iter().any(|r| r.version == version)
            || self.pr_comments.iter().any(|r| r.version == version)
            || self.pr_reviews.iter().any(|r| r.version == version)
            || self.pr_review_comments.iter().any(|r| r.version == version)
    }

    /// Drop every row whose version fails the predicate.
    fn retain_versions(&mut self, keep: impl Fn(u64) -> bool + Copy) {
        self.organizations.retain(|r| keep(r.version));
        self.users.retain(|r| keep(r.version));
        self.repositories.retain(|r| keep(r.version));
        self.topics.retain(|r| keep(r.version));
        self.issues.retain(|r| keep(r.version));
        self.issue_comments.retain(|r| keep(r.version));
        self.pull_requests.retain(|r| keep(r.version));
        self.pr_comments.retain(|r| keep(r.version));
        self.pr_reviews.retain(|r| keep(r.version));
        self.pr_review_comments.retain(|r| keep(r.version));
    }
}

/// In-memory store. Cheap to construct, safe to share across leases.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // Save operations never panic while holding the lock
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read<T: Clone>(&self, select: impl Fn(&State) -> &Vec<Versioned<T>>) -> Vec<T> {
        let state = self.lock();
        let Some(active) = state.active_version else {
            return Vec::new();
        };
        select(&state)
            .iter()
            .filter(|r| r.version == active)
            .map(|r| r.item.clone())
            .collect()
    }

    /// Currently published version, if any.
    pub fn active_version(&self) -> Option<u64> {
        self.lock().active_version
    }

    /// Organizations of the active version.
    pub fn organizations(&self) -> Vec<Organization> {
        self.read(|s| &s.organizations)
    }

    /// Users of the active version.
    pub fn users(&self) -> Vec<User> {
        self.read(|s| &s.users)
    }

    /// Repositories of the active version.
    pub fn repositories(&self) -> Vec<Repository> {
        self.read(|s| &s.repositories)
    }

    /// Topics of the active version.
    pub fn topics(&self) -> Vec<String> {
        self.read(|s| &s.topics)
    }

    /// Issues of the active version.
    pub fn issues(&self) -> Vec<Issue> {
        self.read(|s| &s.issues)
    }

    /// Issue comments of the active version.
    pub fn issue_comments(&self) -> Vec<IssueComment> {
        self.read(|s| &s.issue_comments)
    }

    /// Pull requests of the active version.
    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.read(|s| &s.pull_requests)
    }

    /// Pull request comments of the active version.
    pub fn pull_request_comments(&self) -> Vec<IssueComment> {
        self.read(|s| &s.pr_comments)
    }

    /// Pull request reviews of the active version.
    pub fn pull_request_reviews(&self) -> Vec<PullRequestReview> {
        self.read(|s| &s.pr_reviews)
    }

    /// Pull request review comments of the active version.
    pub fn pull_request_review_comments(&self) -> Vec<PullRequestReviewComment> {
        self.read(|s| &s.pr_review_comments)
    }

    /// Total row count across all collections and versions.
    pub fn total_rows(&self) -> usize {
        let s = self.lock();
        s.organizations.len()
            + s.users.len()
            + s.repositories.len()
            + s.topics.len()
            + s.issues.len()
            + s.issue_comments.len()
            + s.pull_requests.len()
            + s.pr_comments.len()
            + s.pr_reviews.len()
            + s.pr_review_comments.len()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn begin(&self, version: u64) -> Result<()> {
        let mut state = self.lock();
        if let Some(open) = state.write_version {
            return Err(StoreError::WriteScopeOpen(open));
        }
        state.write_version = Some(version);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut state = self.lock();
        state.write_version.take().ok_or(StoreError::NoWriteScope)?;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut state = self.lock();
        let version = state.write_version.take().ok_or(StoreError::NoWriteScope)?;
        state.retain_versions(|v| v != version);
        Ok(())
    }

    async fn save_organization(&self, org: &Organization) -> Result<()> {
        let mut state = self.lock();
        let version = state.write_version()?;
        // A fresh organization means a fresh member list for this run
        state.users.retain(|r| r.version != version);
        state.organizations.push(Versioned {
            version,
            item: org.clone(),
        });
        Ok(())
    }

    async fn save_user(&self, _org_id: i64, _org_login: &str, user: &User) -> Result<()> {
        let mut state = self.lock();
        let version = state.write_version()?;
        state.users.push(Versioned {
            version,
            item: user.clone(),
        });
        Ok(())
    }

    async fn save_repository(&self, repo: &Repository, topics: &[String]) -> Result<()> {
        let mut state = self.lock();
        let version = state.write_version()?;
        // Reset the per-repository collections for this run's version so the
        // previous repository's rows cannot leak into this one
        state.issues.retain(|r| r.version != version);
        state.issue_comments.retain(|r| r.version != version);
        state.pull_requests.retain(|r| r.version != version);
        state.pr_comments.retain(|r| r.version != version);
        state.pr_reviews.retain(|r| r.version != version);
        state.pr_review_comments.retain(|r| r.version != version);
        state.topics.retain(|r| r.version != version);

        state.repositories.push(Versioned {
            version,
            item: repo.clone(),
        });
        for topic in topics {
            state.topics.push(Versioned {
                version,
                item: topic.clone(),
            });
        }
        Ok(())
    }

    async fn save_issue(
        &self,
        _owner: &str,
        _name: &str,
        issue: &Issue,
        _assignees: &[String],
        _labels: &[String],
    ) -> Result<()> {
        let mut state = self.lock();
        let version = state.write_version()?;
        state.issues.push(Versioned {
            version,
            item: issue.clone(),
        });
        Ok(())
    }

    async fn save_issue_comment(
        &self,
        _owner: &str,
        _name: &str,
        _issue_number: i64,
        comment: &IssueComment,
    ) -> Result<()> {
        let mut state = self.lock();
        let version = state.write_version()?;
        state.issue_comments.push(Versioned {
            version,
            item: comment.clone(),
        });
        Ok(())
    }

    async fn save_pull_request(
        &self,
        _owner: &str,
        _name: &str,
        pr: &PullRequest,
        _assignees: &[String],
        _labels: &[String],
    ) -> Result<()> {
        let mut state = self.lock();
        let version = state.write_version()?;
        state.pull_requests.push(Versioned {
            version,
            item: pr.clone(),
        });
        Ok(())
    }

    async fn save_pull_request_comment(
        &self,
        _owner: &str,
        _name: &str,
        _pr_number: i64,
        comment: &IssueComment,
    ) -> Result<()> {
        let mut state = self.lock();
        let version = state.write_version()?;
        state.pr_comments.push(Versioned {
            version,
            item: comment.clone(),
        });
        Ok(())
    }

    async fn save_pull_request_review(
        &self,
        _owner: &str,
        _name: &str,
        _pr_number: i64,
        review: &PullRequestReview,
    ) -> Result<()> {
        let mut state = self.lock();
        let version = state.write_version()?;
        state.pr_reviews.push(Versioned {
            version,
            item: review.clone(),
        });
        Ok(())
    }

    async fn save_pull_request_review_comment(
        &self,
        _owner: &str,
        _name: &str,
        _pr_number: i64,
        _review_id: i64,
        comment: &PullRequestReviewComment,
    ) -> Result<()> {
        let mut state = self.lock();
        let version = state.write_version()?;
        state.pr_review_comments.push(Versioned {
            version,
            item: comment.clone(),
        });
        Ok(())
    }

    async fn set_active_version(&self, version: u64) -> Result<()> {
        let mut state = self.lock();
        if !state.has_rows(version) {
            return Err(StoreError::VersionConflict(version));
        }
        state.active_version = Some(version);
        Ok(())
    }

    async fn cleanup(&self, current: u64) -> Result<()> {
        let mut state = self.lock();
        state.retain_versions(|v| v == current);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn org(login: &str) -> Organization {
        Organization {
            id: 1,
            login: login.into(),
            name: None,
            description: None,
            email: None,
            created_at: Utc::now(),
        }
    }

    fn repo(owner: &str, name: &str) -> Repository {
        Repository {
            id: 1,
            owner: crate::models::Actor {
                id: 1,
                login: owner.into(),
            },
            name: name.into(),
            description: None,
            fork: false,
            private: false,
            default_branch: Some("main".into()),
            created_at: Utc::now(),
        }
    }

    fn issue(number: i64) -> Issue {
        Issue {
            id: number,
            number,
            title: format!("issue {number}"),
            body: None,
            state: "open".into(),
            author: None,
            assignees: vec![],
            labels: vec![],
            created_at: Utc::now(),
            closed_at: None,
            comments: 0,
            pull_request: None,
        }
    }

    #[tokio::test]
    async fn save_requires_open_write_scope() {
        let store = MemoryStore::new();
        let err = store.save_organization(&org("acme")).await.unwrap_err();
        assert!(matches!(err, StoreError::NoWriteScope));
    }

    #[tokio::test]
    async fn begin_twice_fails() {
        let store = MemoryStore::new();
        store.begin(1).await.unwrap();
        let err = store.begin(2).await.unwrap_err();
        assert!(matches!(err, StoreError::WriteScopeOpen(1)));
    }

    #[tokio::test]
    async fn commit_without_begin_fails() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.commit().await.unwrap_err(),
            StoreError::NoWriteScope
        ));
    }

    #[tokio::test]
    async fn set_active_version_exposes_only_that_version() {
        let store = MemoryStore::new();

        store.begin(1).await.unwrap();
        store.save_organization(&org("v1-org")).await.unwrap();
        store.commit().await.unwrap();

        store.begin(2).await.unwrap();
        store.save_organization(&org("v2-org")).await.unwrap();
        store.commit().await.unwrap();

        store.set_active_version(2).await.unwrap();
        let orgs = store.organizations();
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0].login, "v2-org");

        // Flipping back is equally atomic
        store.set_active_version(1).await.unwrap();
        assert_eq!(store.organizations()[0].login, "v1-org");
    }

    #[tokio::test]
    async fn set_active_version_rejects_empty_version() {
        let store = MemoryStore::new();
        store.begin(1).await.unwrap();
        store.save_organization(&org("acme")).await.unwrap();
        store.commit().await.unwrap();

        let err = store.set_active_version(9).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict(9)));
    }

    #[tokio::test]
    async fn cleanup_keeps_only_current_version() {
        let store = MemoryStore::new();
        for v in [1u64, 2, 3] {
            store.begin(v).await.unwrap();
            store.save_organization(&org(&format!("org-v{v}"))).await.unwrap();
            store.commit().await.unwrap();
        }
        store.set_active_version(3).await.unwrap();
        store.cleanup(3).await.unwrap();

        assert_eq!(store.total_rows(), 1);
        assert_eq!(store.organizations()[0].login, "org-v3");
    }

    #[tokio::test]
    async fn save_repository_resets_per_repo_collections() {
        let store = MemoryStore::new();
        store.begin(1).await.unwrap();

        store
            .save_repository(&repo("acme", "a"), &["cli".into()])
            .await
            .unwrap();
        store
            .save_issue("acme", "a", &issue(1), &[], &[])
            .await
            .unwrap();
        store.commit().await.unwrap();
        store.set_active_version(1).await.unwrap();
        assert_eq!(store.issues().len(), 1);
        assert_eq!(store.topics(), vec!["cli".to_string()]);
    }

    #[tokio::test]
    async fn second_repository_starts_with_empty_issues() {
        let store = MemoryStore::new();
        store.begin(1).await.unwrap();
        store
            .save_repository(&repo("acme", "a"), &[])
            .await
            .unwrap();
        store
            .save_issue("acme", "a", &issue(1), &[], &[])
            .await
            .unwrap();

        store
            .save_repository(&repo("acme", "b"), &[])
            .await
            .unwrap();
        store.commit().await.unwrap();
        store.set_active_version(1).await.unwrap();

        // Repositories accumulate; the in-flight issue rows were reset
        assert!(store.issues().is_empty());
        assert_eq!(store.repositories().len(), 2);
    }

    #[tokio::test]
    async fn save_organization_resets_pending_users() {
        let store = MemoryStore::new();
        store.begin(1).await.unwrap();
        store.save_organization(&org("first")).await.unwrap();
        store
            .save_user(
                1,
                "first",
                &User {
                    id: 7,
                    login: "alice".into(),
                    name: None,
                    email: None,
                    created_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        store.save_organization(&org("second")).await.unwrap();
        store.commit().await.unwrap();
        store.set_active_version(1).await.unwrap();

        assert!(store.users().is_empty());
        assert_eq!(store.organizations().len(), 2);
    }

    #[tokio::test]
    async fn rollback_discards_write_version_rows() {
        let store = MemoryStore::new();
        store.begin(1).await.unwrap();
        store.save_organization(&org("keep")).await.unwrap();
        store.commit().await.unwrap();

        store.begin(2).await.unwrap();
        store.save_organization(&org("discard")).await.unwrap();
        store.rollback().await.unwrap();

        store.set_active_version(1).await.unwrap();
        assert_eq!(store.organizations().len(), 1);
        assert!(matches!(
            store.set_active_version(2).await.unwrap_err(),
            StoreError::VersionConflict(2)
        ));
    }

    #[tokio::test]
    async fn reads_are_empty_before_any_publish() {
        let store = MemoryStore::new();
        store.begin(1).await.unwrap();
        store.save_organization(&org("acme")).await.unwrap();
        store.commit().await.unwrap();

        assert!(store.organizations().is_empty());
        assert_eq!(store.active_version(), None);
    }
}
