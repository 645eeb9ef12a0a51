//! GitHub issue source.
//!
//! [`IssueSource`] is the seam between the sync pipeline and the outside
//! world; [`GithubSource`] is the production implementation, fetching the
//! REST v3 issues endpoint page by page. Pull requests arrive on the same
//! endpoint and are filtered out here.
//!
//! Transient failures (HTTP 429 and 5xx, network errors) retry with
//! exponential backoff; other 4xx fail the fetch, except 422, which GitHub
//! returns when pagination runs past the end of the result window and is
//! treated as end-of-results.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::warn;

use crate::config::GithubConfig;
use crate::models::RawIssue;

/// Where issues come from. Production uses [`GithubSource`]; tests inject
/// a stub returning fixed issue lists.
#[async_trait]
pub trait IssueSource: Send + Sync {
    /// Fetch issues for `owner/repo`, most recently updated first. When
    /// `since` is set, only issues updated at or after that instant are
    /// returned (incremental sync).
    async fn fetch_issues(
        &self,
        owner: &str,
        repo: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawIssue>>;
}

/// GitHub REST API issue source.
pub struct GithubSource {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
    per_page: usize,
    max_pages: usize,
    max_retries: u32,
}

impl GithubSource {
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        // Unauthenticated requests work but hit a much lower rate limit.
        let token = std::env::var(&config.token_env).ok().filter(|t| !t.is_empty());

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token,
            per_page: config.per_page,
            max_pages: config.max_pages,
            max_retries: config.max_retries,
        })
    }

    async fn fetch_page(
        &self,
        owner: &str,
        repo: &str,
        page: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<Vec<serde_json::Value>>> {
        let url = format!("{}/repos/{}/{}/issues", self.api_url, owner, repo);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let mut request = self
                .client
                .get(&url)
                .header("Accept", "application/vnd.github.v3+json")
                .header("User-Agent", concat!("issue-radar/", env!("CARGO_PKG_VERSION")))
                .query(&[
                    ("state", "all".to_string()),
                    ("per_page", self.per_page.to_string()),
                    ("page", page.to_string()),
                    ("sort", "updated".to_string()),
                    ("direction", "desc".to_string()),
                ]);
            if let Some(since) = since {
                request = request.query(&[("since", since.to_rfc3339())]);
            }
            if let Some(token) = &self.token {
                request = request.header("Authorization", format!("Bearer {token}"));
            }

            let resp = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_err = Some(anyhow::Error::from(e));
                    continue;
                }
            };

            let status = resp.status();
            if status.is_success() {
                let page: Vec<serde_json::Value> =
                    resp.json().await.context("failed to parse issues page")?;
                return Ok(Some(page));
            }

            // GitHub answers 422 when pagination runs past its window.
            if status.as_u16() == 422 {
                warn!(%url, page, "pagination window exhausted, stopping");
                return Ok(None);
            }

            if status.as_u16() == 429 || status.is_server_error() {
                last_err = Some(anyhow::anyhow!("GitHub API returned {status}"));
                continue;
            }

            bail!("GitHub API returned {status} for {url}");
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("GitHub fetch failed")))
    }
}

#[async_trait]
impl IssueSource for GithubSource {
    async fn fetch_issues(
        &self,
        owner: &str,
        repo: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawIssue>> {
        let mut issues = Vec::new();

        for page in 1..=self.max_pages {
            let Some(raw_page) = self.fetch_page(owner, repo, page, since).await? else {
                break;
            };

            // Page fill is judged before the pull-request filter: a page
            // full of PRs still means more results may follow.
            let has_more = raw_page.len() >= self.per_page;
            issues.extend(parse_issue_page(&raw_page));

            if !has_more {
                break;
            }
        }

        Ok(issues)
    }
}

/// Parse one page of the issues endpoint. Pull requests are dropped (they
/// carry a `pull_request` key) and malformed entries are skipped with a
/// warning rather than failing the page.
pub fn parse_issue_page(page: &[serde_json::Value]) -> Vec<RawIssue> {
    page.iter()
        .filter(|value| value.get("pull_request").is_none())
        .filter_map(|value| match serde_json::from_value(value.clone()) {
            Ok(issue) => Some(issue),
            Err(e) => {
                let number = value.get("number").and_then(|n| n.as_i64());
                warn!(?number, error = %e, "skipping malformed issue");
                None
            }
        })
        .collect()
}

// Exponential backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped).
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue_json(number: i64) -> serde_json::Value {
        serde_json::json!({
            "number": number,
            "title": format!("issue {number}"),
            "body": "details",
            "state": "open",
            "created_at": "2024-03-01T10:00:00Z",
            "updated_at": "2024-03-02T10:00:00Z",
            "labels": [{"name": "bug"}]
        })
    }

    #[test]
    fn test_parse_page_drops_pull_requests() {
        let mut pr = issue_json(2);
        pr["pull_request"] = serde_json::json!({"url": "https://example.invalid/pr/2"});
        let page = vec![issue_json(1), pr, issue_json(3)];

        let issues = parse_issue_page(&page);
        let numbers: Vec<i64> = issues.iter().map(|i| i.number).collect();
        assert_eq!(numbers, vec![1, 3]);
    }

    #[test]
    fn test_parse_page_skips_malformed_entries() {
        let page = vec![
            issue_json(1),
            serde_json::json!({"number": "not a number"}),
            issue_json(2),
        ];

        let issues = parse_issue_page(&page);
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn test_parse_page_tolerates_null_body_and_missing_labels() {
        let mut issue = issue_json(5);
        issue["body"] = serde_json::Value::Null;
        issue.as_object_mut().unwrap().remove("labels");

        let issues = parse_issue_page(&[issue]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].body, None);
        assert!(issues[0].labels.is_empty());
    }

    #[test]
    fn test_backoff_caps_at_32s() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        assert_eq!(backoff_delay(10), Duration::from_secs(32));
    }
}
