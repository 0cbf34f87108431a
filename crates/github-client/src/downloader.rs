//! Downloader: walks the entity hierarchy and feeds the snapshot store
//!
//! Each method corresponds to one crawl job. Entities are always saved
//! parent-first within a job: the store sees an organization before its
//! members, a repository before its issues, an issue before its comments.
//! Across jobs no ordering is guaranteed; the store has to cope with that.

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use snapshot_store::{
    Actor, Issue, IssueComment, Organization, PullRequest, PullRequestReview,
    PullRequestReviewComment, Repository, SnapshotStore, User,
};

use crate::client::GithubClient;
use crate::error::{ClientError, DownloadError};

/// Repository row from the org listing endpoint; only what the listing needs.
#[derive(Debug, Deserialize)]
struct RepoSummary {
    name: String,
    #[serde(default)]
    fork: bool,
}

/// Topic list wrapper returned by the topics endpoint.
#[derive(Debug, Deserialize)]
struct TopicNames {
    names: Vec<String>,
}

/// One credential's view of the crawl: client plus the shared sink.
pub struct Downloader {
    client: GithubClient,
    store: Arc<dyn SnapshotStore>,
}

impl Downloader {
    pub fn new(client: GithubClient, store: Arc<dyn SnapshotStore>) -> Self {
        Self { client, store }
    }

    /// Requests sent through this downloader's credential so far.
    pub fn requests_used(&self) -> u64 {
        self.client.requests_used()
    }

    /// Names of an organization's repositories, optionally without forks.
    pub async fn list_repositories(
        &self,
        org: &str,
        skip_forks: bool,
    ) -> Result<Vec<String>, ClientError> {
        let repos: Vec<RepoSummary> = self
            .client
            .get_paged(&format!("orgs/{org}/repos"), &[])
            .await?;
        Ok(repos
            .into_iter()
            .filter(|r| !(skip_forks && r.fork))
            .map(|r| r.name)
            .collect())
    }

    /// Crawl one organization: the org record, then every member.
    pub async fn download_organization(&self, login: &str) -> Result<(), DownloadError> {
        let org: Organization = self.client.get_json(&format!("orgs/{login}")).await?;
        self.store.save_organization(&org).await?;

        let members: Vec<Actor> = self
            .client
            .get_paged(&format!("orgs/{login}/members"), &[])
            .await?;
        debug!(org = login, members = members.len(), "members listed");

        for member in members {
            let user: User = self.client.get_json(&format!("users/{}", member.login)).await?;
            self.store.save_user(org.id, &org.login, &user).await?;
        }
        Ok(())
    }

    /// Crawl one repository: repo and topics, then issues with their
    /// comments, then pull requests with comments, reviews and review
    /// comments.
    pub async fn download_repository(&self, owner: &str, name: &str) -> Result<(), DownloadError> {
        let repo: Repository = self.client.get_json(&format!("repos/{owner}/{name}")).await?;
        let topics: TopicNames = self
            .client
            .get_json(&format!("repos/{owner}/{name}/topics"))
            .await?;
        self.store.save_repository(&repo, &topics.names).await?;

        self.download_issues(owner, name).await?;
        self.download_pull_requests(owner, name).await?;
        Ok(())
    }

    async fn download_issues(&self, owner: &str, name: &str) -> Result<(), DownloadError> {
        let issues: Vec<Issue> = self
            .client
            .get_paged(
                &format!("repos/{owner}/{name}/issues"),
                &[("state", "all".to_string())],
            )
            .await?;

        for issue in issues {
            // The issues endpoint also lists pull requests; those are
            // crawled through the pulls endpoint instead
            if issue.pull_request.is_some() {
                continue;
            }
            self.store
                .save_issue(
                    owner,
                    name,
                    &issue,
                    &issue.assignee_logins(),
                    &issue.label_names(),
                )
                .await?;

            // The listing carries the comment count; skip the extra request
            // for issues without any
            if issue.comments > 0 {
                let comments: Vec<IssueComment> = self
                    .client
                    .get_paged(
                        &format!("repos/{owner}/{name}/issues/{}/comments", issue.number),
                        &[],
                    )
                    .await?;
                for comment in comments {
                    self.store
                        .save_issue_comment(owner, name, issue.number, &comment)
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn download_pull_requests(&self, owner: &str, name: &str) -> Result<(), DownloadError> {
        let prs: Vec<PullRequest> = self
            .client
            .get_paged(
                &format!("repos/{owner}/{name}/pulls"),
                &[("state", "all".to_string())],
            )
            .await?;

        for pr in prs {
            self.store
                .save_pull_request(owner, name, &pr, &pr.assignee_logins(), &pr.label_names())
                .await?;

            let comments: Vec<IssueComment> = self
                .client
                .get_paged(
                    &format!("repos/{owner}/{name}/issues/{}/comments", pr.number),
                    &[],
                )
                .await?;
            for comment in comments {
                self.store
                    .save_pull_request_comment(owner, name, pr.number, &comment)
                    .await?;
            }

            let reviews: Vec<PullRequestReview> = self
                .client
                .get_paged(
                    &format!("repos/{owner}/{name}/pulls/{}/reviews", pr.number),
                    &[],
                )
                .await?;
            for review in reviews {
                self.store
                    .save_pull_request_review(owner, name, pr.number, &review)
                    .await?;

                let review_comments: Vec<PullRequestReviewComment> = self
                    .client
                    .get_paged(
                        &format!(
                            "repos/{owner}/{name}/pulls/{}/reviews/{}/comments",
                            pr.number, review.id
                        ),
                        &[],
                    )
                    .await?;
                for comment in review_comments {
                    self.store
                        .save_pull_request_review_comment(
                            owner,
                            name,
                            pr.number,
                            review.id,
                            &comment,
                        )
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Publish `version` as the current snapshot.
    pub async fn set_current(&self, version: u64) -> Result<(), DownloadError> {
        self.store.set_active_version(version).await?;
        Ok(())
    }

    /// Garbage-collect every version except `current`.
    pub async fn cleanup(&self, current: u64) -> Result<(), DownloadError> {
        self.store.cleanup(current).await?;
        Ok(())
    }
}

/// Split an `owner/name` job identifier.
pub fn split_repo_id(id: &str) -> Result<(&str, &str), ClientError> {
    match id.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() => Ok((owner, name)),
        _ => Err(ClientError::InvalidRepository(id.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_repo_id_accepts_owner_name() {
        assert_eq!(split_repo_id("acme/widget").unwrap(), ("acme", "widget"));
    }

    #[test]
    fn split_repo_id_rejects_malformed_ids() {
        assert!(split_repo_id("acme").is_err());
        assert!(split_repo_id("/widget").is_err());
        assert!(split_repo_id("acme/").is_err());
    }

    #[test]
    fn repo_summary_fork_defaults_to_false() {
        let summary: RepoSummary = serde_json::from_str(r#"{"name": "widget"}"#).unwrap();
        assert!(!summary.fork);
    }

    #[test]
    fn topic_names_deserializes_wrapper() {
        let topics: TopicNames = serde_json::from_str(r#"{"names": ["cli", "rust"]}"#).unwrap();
        assert_eq!(topics.names, vec!["cli", "rust"]);
    }
}
