//! Console sink: one human-readable log line per saved entity
//!
//! Stateless. Lifecycle and version operations are no-ops, which makes this
//! variant useful for dry runs against real credentials without a database.
//! The output is for humans, not for parsing.

use async_trait::async_trait;
use tracing::info;

use crate::models::{
    Issue, IssueComment, Organization, PullRequest, PullRequestReview, PullRequestReviewComment,
    Repository, User,
};
use crate::store::{Result, SnapshotStore};

/// Discard-to-console store.
#[derive(Debug, Default)]
pub struct ConsoleStore;

impl ConsoleStore {
    pub fn new() -> Self {
        Self
    }
}

/// Shorten comment bodies so log lines stay readable.
fn trim(body: &Option<String>) -> String {
    match body {
        Some(s) if s.chars().count() > 40 => {
            let head: String = s.chars().take(39).collect();
            format!("{head}...")
        }
        Some(s) => s.clone(),
        None => String::new(),
    }
}

fn login(author: &Option<crate::models::Actor>) -> &str {
    author.as_ref().map(|a| a.login.as_str()).unwrap_or("ghost")
}

#[async_trait]
impl SnapshotStore for ConsoleStore {
    async fn begin(&self, _version: u64) -> Result<()> {
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        Ok(())
    }

    async fn save_organization(&self, org: &Organization) -> Result<()> {
        info!(org = %org.login, "organization fetched");
        Ok(())
    }

    async fn save_user(&self, _org_id: i64, org_login: &str, user: &User) -> Result<()> {
        info!(org = org_login, user = %user.login, "user fetched");
        Ok(())
    }

    async fn save_repository(&self, repo: &Repository, topics: &[String]) -> Result<()> {
        info!(
            repo = %format!("{}/{}", repo.owner.login, repo.name),
            topics = topics.len(),
            "repository fetched"
        );
        Ok(())
    }

    async fn save_issue(
        &self,
        owner: &str,
        name: &str,
        issue: &Issue,
        _assignees: &[String],
        _labels: &[String],
    ) -> Result<()> {
        info!(
            repo = %format!("{owner}/{name}"),
            number = issue.number,
            title = %issue.title,
            "issue fetched"
        );
        Ok(())
    }

    async fn save_issue_comment(
        &self,
        owner: &str,
        name: &str,
        issue_number: i64,
        comment: &IssueComment,
    ) -> Result<()> {
        info!(
            repo = %format!("{owner}/{name}"),
            issue = issue_number,
            author = login(&comment.author),
            body = %trim(&comment.body),
            "issue comment fetched"
        );
        Ok(())
    }

    async fn save_pull_request(
        &self,
        owner: &str,
        name: &str,
        pr: &PullRequest,
        _assignees: &[String],
        _labels: &[String],
    ) -> Result<()> {
        info!(
            repo = %format!("{owner}/{name}"),
            number = pr.number,
            title = %pr.title,
            "pull request fetched"
        );
        Ok(())
    }

    async fn save_pull_request_comment(
        &self,
        owner: &str,
        name: &str,
        pr_number: i64,
        comment: &IssueComment,
    ) -> Result<()> {
        info!(
            repo = %format!("{owner}/{name}"),
            pr = pr_number,
            author = login(&comment.author),
            body = %trim(&comment.body),
            "pull request comment fetched"
        );
        Ok(())
    }

    async fn save_pull_request_review(
        &self,
        owner: &str,
        name: &str,
        pr_number: i64,
        review: &PullRequestReview,
    ) -> Result<()> {
        info!(
            repo = %format!("{owner}/{name}"),
            pr = pr_number,
            author = login(&review.author),
            state = %review.state,
            "pull request review fetched"
        );
        Ok(())
    }

    async fn save_pull_request_review_comment(
        &self,
        owner: &str,
        name: &str,
        pr_number: i64,
        review_id: i64,
        comment: &PullRequestReviewComment,
    ) -> Result<()> {
        info!(
            repo = %format!("{owner}/{name}"),
            pr = pr_number,
            review = review_id,
            author = login(&comment.author),
            body = %trim(&comment.body),
            "pull request review comment fetched"
        );
        Ok(())
    }

    async fn set_active_version(&self, version: u64) -> Result<()> {
        info!(version, "active version set (console sink, no-op)");
        Ok(())
    }

    async fn cleanup(&self, current: u64) -> Result<()> {
        info!(current, "cleanup requested (console sink, no-op)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_shortens_long_bodies() {
        let long = Some("x".repeat(80));
        let trimmed = trim(&long);
        assert_eq!(trimmed.chars().count(), 42);
        assert!(trimmed.ends_with("..."));
    }

    #[test]
    fn trim_keeps_short_bodies() {
        assert_eq!(trim(&Some("short".into())), "short");
        assert_eq!(trim(&None), "");
    }
}
