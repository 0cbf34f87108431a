//! Entity models for the crawled metadata hierarchy
//!
//! Shapes follow the GitHub REST payloads closely enough to deserialize them
//! directly; fields the sink does not persist are simply not declared. The
//! hierarchy is Organization → Users, Repository → Topics / Issues →
//! IssueComments, PullRequests → PRComments / PRReviews → PRReviewComments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimal reference to a user account (issue author, assignee, member).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub login: String,
}

/// Issue or pull request label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

/// Branch reference on a pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchRef {
    #[serde(rename = "ref")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Extended user record, fetched per member of an organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub owner: Actor,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub private: bool,
    pub default_branch: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub number: i64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(rename = "user")]
    pub author: Option<Actor>,
    #[serde(default)]
    pub assignees: Vec<Actor>,
    #[serde(default)]
    pub labels: Vec<Label>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Comment count from the listing endpoint.
    #[serde(default)]
    pub comments: i64,
    /// Present when the row from the issues endpoint is actually a pull
    /// request; the downloader skips those.
    #[serde(default, skip_serializing)]
    pub pull_request: Option<serde_json::Value>,
}

/// Comment on an issue or on a pull request's conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueComment {
    pub id: i64,
    #[serde(rename = "user")]
    pub author: Option<Actor>,
    #[serde(default)]
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: i64,
    pub number: i64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(rename = "user")]
    pub author: Option<Actor>,
    #[serde(default)]
    pub assignees: Vec<Actor>,
    #[serde(default)]
    pub labels: Vec<Label>,
    pub base: BranchRef,
    pub head: BranchRef,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestReview {
    pub id: i64,
    #[serde(rename = "user")]
    pub author: Option<Actor>,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Inline code comment attached to a pull request review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestReviewComment {
    pub id: i64,
    #[serde(rename = "user")]
    pub author: Option<Actor>,
    #[serde(default)]
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Issue {
    /// Logins of all assignees, in API order.
    pub fn assignee_logins(&self) -> Vec<String> {
        self.assignees.iter().map(|a| a.login.clone()).collect()
    }

    /// Label names, in API order.
    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.name.clone()).collect()
    }
}

impl PullRequest {
    pub fn assignee_logins(&self) -> Vec<String> {
        self.assignees.iter().map(|a| a.login.clone()).collect()
    }

    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_deserializes_rest_payload() {
        let json = r#"{
            "id": 10,
            "number": 7,
            "title": "crash on empty input",
            "body": "steps to reproduce...",
            "state": "open",
            "user": {"id": 1, "login": "alice"},
            "assignees": [{"id": 2, "login": "bob"}],
            "labels": [{"name": "bug"}],
            "created_at": "2024-03-01T12:00:00Z",
            "closed_at": null
        }"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert_eq!(issue.number, 7);
        assert_eq!(issue.author.as_ref().unwrap().login, "alice");
        assert_eq!(issue.assignee_logins(), vec!["bob"]);
        assert_eq!(issue.label_names(), vec!["bug"]);
        assert!(issue.pull_request.is_none());
    }

    #[test]
    fn issue_endpoint_row_can_be_a_pull_request() {
        let json = r#"{
            "id": 11,
            "number": 8,
            "title": "add feature",
            "state": "open",
            "user": {"id": 1, "login": "alice"},
            "created_at": "2024-03-01T12:00:00Z",
            "closed_at": null,
            "pull_request": {"url": "https://api.github.com/repos/o/r/pulls/8"}
        }"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert!(issue.pull_request.is_some());
    }

    #[test]
    fn pull_request_branch_refs_use_ref_key() {
        let json = r#"{
            "id": 20,
            "number": 3,
            "title": "refactor",
            "state": "closed",
            "user": null,
            "base": {"ref": "main"},
            "head": {"ref": "refactor-branch"},
            "created_at": "2024-03-01T12:00:00Z",
            "merged_at": "2024-03-02T12:00:00Z"
        }"#;
        let pr: PullRequest = serde_json::from_str(json).unwrap();
        assert_eq!(pr.base.name, "main");
        assert_eq!(pr.head.name, "refactor-branch");
        assert!(pr.merged_at.is_some());
    }
}
