//! GitHub REST client
//!
//! Read-only fetches used to assemble evidence packs: repo search,
//! README, issues, releases, root listing. Auth is a plain
//! `GITHUB_TOKEN` bearer when present; unauthenticated works for small
//! runs within GitHub's anonymous rate limits.

use crate::config::GithubSection;
use serde::{Deserialize, Serialize};
use specforge_protocol::evidence::RepoMeta;
use std::time::Duration;
use tracing::warn;

const TOKEN_ENV: &str = "GITHUB_TOKEN";
const USER_AGENT: &str = "specforge";
const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_RAW: &str = "application/vnd.github.raw";

const MAX_RETRIES: u32 = 2;
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum length for error body content in error messages
const MAX_ERROR_BODY_LEN: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum GithubError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub API error {status}: {message}")]
    Api { status: u16, message: String },
}

pub type Result<T> = std::result::Result<T, GithubError>;

// ============================================================================
// Response shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    full_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default = "default_branch")]
    default_branch: String,
    html_url: String,
}

fn default_branch() -> String {
    "main".to_string()
}

impl From<SearchItem> for RepoMeta {
    fn from(item: SearchItem) -> Self {
        RepoMeta {
            full_name: item.full_name,
            description: item.description,
            stars: item.stargazers_count,
            topics: item.topics,
            default_branch: item.default_branch,
            url: item.html_url,
        }
    }
}

/// One issue, PRs filtered out. Cached between runs, hence Serialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub state: String,
    pub html_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    pub html_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String,
}

// ============================================================================
// Client
// ============================================================================

#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(config: &GithubSection) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        let token = std::env::var(TOKEN_ENV)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Search repositories by topic, most-starred first.
    pub async fn search_repos(&self, topic: &str, limit: usize) -> Result<Vec<RepoMeta>> {
        let url = format!("{}/search/repositories", self.api_base);
        let per_page = limit.clamp(1, 100).to_string();
        let query = format!("topic:{}", topic);
        let response = self
            .send(self.request(&url, ACCEPT_JSON).query(&[
                ("q", query.as_str()),
                ("sort", "stars"),
                ("order", "desc"),
                ("per_page", per_page.as_str()),
            ]))
            .await?;
        let parsed: SearchResponse = response.json().await?;
        Ok(parsed.items.into_iter().take(limit).map(RepoMeta::from).collect())
    }

    /// Fetch the repo's preferred README as raw text. Missing README
    /// is a normal condition, not an error.
    pub async fn fetch_readme(&self, repo_id: &str) -> Result<Option<String>> {
        let url = format!("{}/repos/{}/readme", self.api_base, repo_id);
        match self.send(self.request(&url, ACCEPT_RAW)).await {
            Ok(response) => Ok(Some(response.text().await?)),
            Err(GithubError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fetch issues (open and closed), pull requests filtered out.
    pub async fn fetch_issues(&self, repo_id: &str, limit: usize) -> Result<Vec<Issue>> {
        let url = format!("{}/repos/{}/issues", self.api_base, repo_id);
        // PRs share the issues endpoint; over-fetch so filtering still
        // leaves enough.
        let per_page = limit.saturating_mul(3).clamp(1, 100).to_string();
        let response = self
            .send(self.request(&url, ACCEPT_JSON).query(&[
                ("state", "all"),
                ("per_page", per_page.as_str()),
            ]))
            .await?;
        let issues: Vec<Issue> = response.json().await?;
        Ok(issues.into_iter().filter(|i| i.pull_request.is_none()).collect())
    }

    pub async fn fetch_releases(&self, repo_id: &str, limit: usize) -> Result<Vec<Release>> {
        let url = format!("{}/repos/{}/releases", self.api_base, repo_id);
        let per_page = limit.clamp(1, 100).to_string();
        let response = self
            .send(self.request(&url, ACCEPT_JSON).query(&[("per_page", per_page.as_str())]))
            .await?;
        Ok(response.json().await?)
    }

    /// List the repository root. Empty on 404 (empty repo).
    pub async fn fetch_root_listing(&self, repo_id: &str) -> Result<Vec<ContentEntry>> {
        let url = format!("{}/repos/{}/contents/", self.api_base, repo_id);
        match self.send(self.request(&url, ACCEPT_JSON)).await {
            Ok(response) => Ok(response.json().await?),
            Err(GithubError::Api { status: 404, .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn request(&self, url: &str, accept: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.get(url).header("Accept", accept);
        if let Some(token) = &self.token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder
    }

    /// Send with bounded retry on 429/5xx. 403 from the anonymous rate
    /// limiter gets a token hint instead of a retry.
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let mut retry = 0u32;
        loop {
            let response = builder
                .try_clone()
                .ok_or_else(|| GithubError::Api {
                    status: 0,
                    message: "request not cloneable".to_string(),
                })?
                .send()
                .await?;

            let status = response.status().as_u16();
            if response.status().is_success() {
                return Ok(response);
            }

            if (status == 429 || (500..600).contains(&status)) && retry < MAX_RETRIES {
                retry += 1;
                let backoff = INITIAL_BACKOFF_MS * (1u64 << (retry - 1));
                warn!(status, retry, backoff_ms = backoff, "retrying GitHub call");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            let message = if status == 403 && body.contains("rate limit") {
                format!("rate limited; set {} to raise the limit", TOKEN_ENV)
            } else {
                sanitize_error_body(&body)
            };
            return Err(GithubError::Api { status, message });
        }
    }
}

/// Sanitize an API error body before it reaches logs: truncate, and
/// redact anything that might carry credentials.
fn sanitize_error_body(body: &str) -> String {
    const SECRET_PATTERNS: &[&str] =
        &["token", "secret", "password", "credential", "bearer", "ghp_", "github_pat_"];

    let truncated = if body.len() > MAX_ERROR_BODY_LEN {
        let cut = body
            .char_indices()
            .take_while(|(i, _)| *i <= MAX_ERROR_BODY_LEN)
            .last()
            .map(|(i, _)| i)
            .unwrap_or(0);
        format!("{}... (truncated)", &body[..cut])
    } else {
        body.to_string()
    };

    let lower = truncated.to_lowercase();
    if SECRET_PATTERNS.iter().any(|p| lower.contains(p)) {
        return "(error details redacted)".to_string();
    }
    truncated
}
