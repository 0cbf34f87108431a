//! PostgreSQL implementation of `SnapshotStore`
//!
//! One transaction per crawl run: `begin` opens it, every save executes
//! inside it, `commit` makes the whole run durable at once. The transaction
//! lives behind a `tokio::sync::Mutex`, which serializes interleaved saves
//! from concurrent leases; individual statements interleave but the run
//! commits atomically exactly once.
//!
//! Every row carries an integer `version` column. The `active_version` table
//! holds a single row naming the published version; publishing is one upsert,
//! readable independently of in-progress writes to other versions. Schema
//! migration is external; see `schema.sql` at the crate root for reference.

use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;
use tracing::debug;

use async_trait::async_trait;

use crate::models::{
    Issue, IssueComment, Organization, PullRequest, PullRequestReview, PullRequestReviewComment,
    Repository, User,
};
use crate::store::{Result, SnapshotStore, StoreError};

/// Entity tables, used by cleanup.
const TABLES: &[&str] = &[
    "organizations",
    "users",
    "repositories",
    "topics",
    "issues",
    "issue_comments",
    "pull_requests",
    "pull_request_comments",
    "pull_request_reviews",
    "pull_request_review_comments",
];

struct WriteScope {
    version: i64,
    tx: Transaction<'static, Postgres>,
}

/// Persistent store backed by a PostgreSQL connection pool.
pub struct PostgresStore {
    pool: PgPool,
    scope: Mutex<Option<WriteScope>>,
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

impl PostgresStore {
    /// Create a store on top of an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            scope: Mutex::new(None),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SnapshotStore for PostgresStore {
    async fn begin(&self, version: u64) -> Result<()> {
        let mut guard = self.scope.lock().await;
        if let Some(scope) = guard.as_ref() {
            return Err(StoreError::WriteScopeOpen(scope.version as u64));
        }
        let tx = self.pool.begin().await.map_err(db_err)?;
        *guard = Some(WriteScope {
            version: version as i64,
            tx,
        });
        debug!(version, "write scope opened");
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut guard = self.scope.lock().await;
        let scope = guard.take().ok_or(StoreError::NoWriteScope)?;
        scope.tx.commit().await.map_err(db_err)?;
        debug!(version = scope.version, "write scope committed");
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut guard = self.scope.lock().await;
        let scope = guard.take().ok_or(StoreError::NoWriteScope)?;
        scope.tx.rollback().await.map_err(db_err)?;
        debug!(version = scope.version, "write scope rolled back");
        Ok(())
    }

    async fn save_organization(&self, org: &Organization) -> Result<()> {
        let mut guard = self.scope.lock().await;
        let scope = guard.as_mut().ok_or(StoreError::NoWriteScope)?;
        let version = scope.version;

        // A re-crawled organization replaces its member list for this version
        sqlx::query("DELETE FROM users WHERE version = $1 AND org_id = $2")
            .bind(version)
            .bind(org.id)
            .execute(&mut *scope.tx)
            .await
            .map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO organizations (version, id, login, name, description, email, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(version)
        .bind(org.id)
        .bind(&org.login)
        .bind(&org.name)
        .bind(&org.description)
        .bind(&org.email)
        .bind(org.created_at)
        .execute(&mut *scope.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn save_user(&self, org_id: i64, org_login: &str, user: &User) -> Result<()> {
        let mut guard = self.scope.lock().await;
        let scope = guard.as_mut().ok_or(StoreError::NoWriteScope)?;

        sqlx::query(
            r#"
            INSERT INTO users (version, org_id, org_login, id, login, name, email, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(scope.version)
        .bind(org_id)
        .bind(org_login)
        .bind(user.id)
        .bind(&user.login)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.created_at)
        .execute(&mut *scope.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn save_repository(&self, repo: &Repository, topics: &[String]) -> Result<()> {
        let mut guard = self.scope.lock().await;
        let scope = guard.as_mut().ok_or(StoreError::NoWriteScope)?;
        let version = scope.version;
        let owner = repo.owner.login.as_str();

        // Reset the per-repository collections for this version
        for table in [
            "topics",
            "issues",
            "issue_comments",
            "pull_requests",
            "pull_request_comments",
            "pull_request_reviews",
            "pull_request_review_comments",
        ] {
            let sql =
                format!("DELETE FROM {table} WHERE version = $1 AND owner = $2 AND repo = $3");
            sqlx::query(&sql)
                .bind(version)
                .bind(owner)
                .bind(&repo.name)
                .execute(&mut *scope.tx)
                .await
                .map_err(db_err)?;
        }

        sqlx::query(
            r#"
            INSERT INTO repositories
                (version, id, owner, name, description, fork, private, default_branch, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(version)
        .bind(repo.id)
        .bind(owner)
        .bind(&repo.name)
        .bind(&repo.description)
        .bind(repo.fork)
        .bind(repo.private)
        .bind(&repo.default_branch)
        .bind(repo.created_at)
        .execute(&mut *scope.tx)
        .await
        .map_err(db_err)?;

        for topic in topics {
            sqlx::query("INSERT INTO topics (version, owner, repo, topic) VALUES ($1, $2, $3, $4)")
                .bind(version)
                .bind(owner)
                .bind(&repo.name)
                .bind(topic)
                .execute(&mut *scope.tx)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    async fn save_issue(
        &self,
        owner: &str,
        name: &str,
        issue: &Issue,
        assignees: &[String],
        labels: &[String],
    ) -> Result<()> {
        let mut guard = self.scope.lock().await;
        let scope = guard.as_mut().ok_or(StoreError::NoWriteScope)?;

        sqlx::query(
            r#"
            INSERT INTO issues
                (version, owner, repo, id, number, title, body, state, author,
                 assignees, labels, created_at, closed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(scope.version)
        .bind(owner)
        .bind(name)
        .bind(issue.id)
        .bind(issue.number)
        .bind(&issue.title)
        .bind(&issue.body)
        .bind(&issue.state)
        .bind(issue.author.as_ref().map(|a| a.login.as_str()))
        .bind(assignees)
        .bind(labels)
        .bind(issue.created_at)
        .bind(issue.closed_at)
        .execute(&mut *scope.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn save_issue_comment(
        &self,
        owner: &str,
        name: &str,
        issue_number: i64,
        comment: &IssueComment,
    ) -> Result<()> {
        let mut guard = self.scope.lock().await;
        let scope = guard.as_mut().ok_or(StoreError::NoWriteScope)?;

        sqlx::query(
            r#"
            INSERT INTO issue_comments
                (version, owner, repo, issue_number, id, author, body, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(scope.version)
        .bind(owner)
        .bind(name)
        .bind(issue_number)
        .bind(comment.id)
        .bind(comment.author.as_ref().map(|a| a.login.as_str()))
        .bind(&comment.body)
        .bind(comment.created_at)
        .execute(&mut *scope.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn save_pull_request(
        &self,
        owner: &str,
        name: &str,
        pr: &PullRequest,
        assignees: &[String],
        labels: &[String],
    ) -> Result<()> {
        let mut guard = self.scope.lock().await;
        let scope = guard.as_mut().ok_or(StoreError::NoWriteScope)?;

        sqlx::query(
            r#"
            INSERT INTO pull_requests
                (version, owner, repo, id, number, title, body, state, author,
                 assignees, labels, base_ref, head_ref, created_at, merged_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(scope.version)
        .bind(owner)
        .bind(name)
        .bind(pr.id)
        .bind(pr.number)
        .bind(&pr.title)
        .bind(&pr.body)
        .bind(&pr.state)
        .bind(pr.author.as_ref().map(|a| a.login.as_str()))
        .bind(assignees)
        .bind(labels)
        .bind(&pr.base.name)
        .bind(&pr.head.name)
        .bind(pr.created_at)
        .bind(pr.merged_at)
        .execute(&mut *scope.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn save_pull_request_comment(
        &self,
        owner: &str,
        name: &str,
        pr_number: i64,
        comment: &IssueComment,
    ) -> Result<()> {
        let mut guard = self.scope.lock().await;
        let scope = guard.as_mut().ok_or(StoreError::NoWriteScope)?;

        sqlx::query(
            r#"
            INSERT INTO pull_request_comments
                (version, owner, repo, pr_number, id, author, body, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(scope.version)
        .bind(owner)
        .bind(name)
        .bind(pr_number)
        .bind(comment.id)
        .bind(comment.author.as_ref().map(|a| a.login.as_str()))
        .bind(&comment.body)
        .bind(comment.created_at)
        .execute(&mut *scope.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn save_pull_request_review(
        &self,
        owner: &str,
        name: &str,
        pr_number: i64,
        review: &PullRequestReview,
    ) -> Result<()> {
        let mut guard = self.scope.lock().await;
        let scope = guard.as_mut().ok_or(StoreError::NoWriteScope)?;

        sqlx::query(
            r#"
            INSERT INTO pull_request_reviews
                (version, owner, repo, pr_number, id, author, body, state, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(scope.version)
        .bind(owner)
        .bind(name)
        .bind(pr_number)
        .bind(review.id)
        .bind(review.author.as_ref().map(|a| a.login.as_str()))
        .bind(&review.body)
        .bind(&review.state)
        .bind(review.submitted_at)
        .execute(&mut *scope.tx)
        .await
        .map_err(db_err)?;
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
        let mut guard = self.scope.lock().await;
        let scope = guard.as_mut().ok_or(StoreError::NoWriteScope)?;

        sqlx::query(
            r#"
            INSERT INTO pull_request_review_comments
                (version, owner, repo, pr_number, review_id, id, author, body, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(scope.version)
        .bind(owner)
        .bind(name)
        .bind(pr_number)
        .bind(review_id)
        .bind(comment.id)
        .bind(comment.author.as_ref().map(|a| a.login.as_str()))
        .bind(&comment.body)
        .bind(comment.created_at)
        .execute(&mut *scope.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn set_active_version(&self, version: u64) -> Result<()> {
        let version = version as i64;

        // Publishing a version with no rows would wipe the dataset on the
        // next cleanup, so refuse it
        let has_data: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM organizations WHERE version = $1)
                OR EXISTS(SELECT 1 FROM repositories WHERE version = $1)
            "#,
        )
        .bind(version)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        if !has_data {
            return Err(StoreError::VersionConflict(version as u64));
        }

        sqlx::query(
            r#"
            INSERT INTO active_version (id, version)
            VALUES (TRUE, $1)
            ON CONFLICT (id) DO UPDATE SET version = EXCLUDED.version
            "#,
        )
        .bind(version)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        debug!(version, "active version published");
        Ok(())
    }

    async fn cleanup(&self, current: u64) -> Result<()> {
        let current = current as i64;
        for table in TABLES {
            let sql = format!("DELETE FROM {table} WHERE version <> $1");
            let result = sqlx::query(&sql)
                .bind(current)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            if result.rows_affected() > 0 {
                debug!(table, deleted = result.rows_affected(), "stale rows removed");
            }
        }
        Ok(())
    }
}
