//! Authenticated REST client with per-request usage counting

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use common::Secret;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ClientError, Result};

const USER_AGENT: &str = concat!("gh-crawler/", env!("CARGO_PKG_VERSION"));
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";
const PER_PAGE: usize = 100;

/// REST client bound to one credential.
///
/// Cheap to clone; clones share the usage counter. Every request increments
/// the counter whether it succeeds or not, matching how the API meters its
/// rate limit.
#[derive(Clone, Debug)]
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    requests: Arc<AtomicU64>,
}

impl GithubClient {
    /// Build a client for `token` against `api_url`
    /// (normally `https://api.github.com`).
    pub fn new(token: &Secret<String>, api_url: &str) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
            .map_err(|e| ClientError::InvalidToken(e.to_string()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_owned(),
            requests: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Number of requests sent through this credential so far.
    pub fn requests_used(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    /// GET a single JSON resource.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_json_with(path, &[]).await
    }

    async fn get_json_with<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let url = self.url(path);
        debug!(%url, "GET");

        let response = self.http.get(&url).query(query).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => ClientError::NotFound(path.to_owned()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Auth(status.as_u16()),
            StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimited,
            _ => ClientError::Status {
                status: status.as_u16(),
                body: snippet(&body),
            },
        })
    }

    /// GET a paginated collection, following `page` until a short page.
    pub async fn get_paged<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1usize;
        loop {
            let mut q: Vec<(&str, String)> = query.to_vec();
            q.push(("per_page", PER_PAGE.to_string()));
            q.push(("page", page.to_string()));

            let batch: Vec<T> = self.get_json_with(path, &q).await?;
            let short = batch.len() < PER_PAGE;
            items.extend(batch);
            if short {
                return Ok(items);
            }
            page += 1;
        }
    }
}

/// Keep error bodies short enough for a log line.
fn snippet(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        body.chars().take(MAX).collect()
    } else {
        body.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(api_url: &str) -> GithubClient {
        GithubClient::new(&Secret::new("ghp_test".to_string()), api_url).unwrap()
    }

    #[test]
    fn url_joins_without_double_slash() {
        let c = client("https://api.github.com/");
        assert_eq!(c.url("/orgs/acme"), "https://api.github.com/orgs/acme");
        assert_eq!(c.url("orgs/acme"), "https://api.github.com/orgs/acme");
    }

    #[test]
    fn counter_starts_at_zero_and_is_shared_across_clones() {
        let c = client("https://api.github.com");
        assert_eq!(c.requests_used(), 0);
        let clone = c.clone();
        c.requests.fetch_add(3, Ordering::Relaxed);
        assert_eq!(clone.requests_used(), 3);
    }

    #[test]
    fn token_with_control_chars_is_rejected() {
        let err = GithubClient::new(
            &Secret::new("bad\ntoken".to_string()),
            "https://api.github.com",
        )
        .unwrap_err();
        assert!(matches!(err, ClientError::InvalidToken(_)));
    }

    #[test]
    fn snippet_truncates_long_bodies() {
        let long = "e".repeat(500);
        assert_eq!(snippet(&long).len(), 200);
        assert_eq!(snippet("short"), "short");
    }
}
