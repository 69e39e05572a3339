//! GitHub REST client.
//!
//! Fetches pull request and commit metadata and posts PR comments. All
//! failures are logged and collapsed to "no data" at the trait boundary so
//! the orchestration loop never aborts on a code-host error.

use async_trait::async_trait;
use ciboss_core::{Config, RepoParseError, RepoRef};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Files requested per page from the PR files endpoint.
pub const PR_FILES_PER_PAGE: u32 = 100;

/// Pages fetched at most from the PR files endpoint.
pub const PR_FILES_MAX_PAGES: u32 = 10;

const API_VERSION: &str = "2022-11-28";

/// Characters of an error response body kept in logs.
const ERROR_BODY_PREVIEW: usize = 200;

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("GitHub token not configured")]
    NotConfigured,
    #[error(transparent)]
    InvalidRepo(#[from] RepoParseError),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid header value: {0}")]
    InvalidHeader(String),
}

pub type Result<T> = std::result::Result<T, GithubError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub head_sha: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitDetails {
    pub message: String,
}

/// Code-hosting platform as seen by the orchestration loop.
///
/// `None` means the call failed or the host is not configured; an empty
/// `Vec` means the call succeeded and returned nothing.
#[async_trait]
pub trait CodeHost: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn fetch_pr_details(&self, repo: &str, pr_number: u64) -> Option<PullRequest>;

    async fn fetch_pr_files_page(
        &self,
        repo: &str,
        pr_number: u64,
        page: u32,
        per_page: u32,
    ) -> Option<Vec<String>>;

    /// All changed files of a pull request.
    ///
    /// Stops on an empty or short page and after `PR_FILES_MAX_PAGES` pages.
    /// A failure on any page discards the whole listing.
    async fn fetch_pr_files(&self, repo: &str, pr_number: u64) -> Option<Vec<String>> {
        let mut files = Vec::new();
        for page in 1..=PR_FILES_MAX_PAGES {
            let batch = self
                .fetch_pr_files_page(repo, pr_number, page, PR_FILES_PER_PAGE)
                .await?;
            let short = batch.len() < PR_FILES_PER_PAGE as usize;
            files.extend(batch);
            if short {
                break;
            }
        }
        Some(files)
    }

    async fn fetch_commit_files(&self, repo: &str, sha: &str) -> Option<Vec<String>>;

    async fn fetch_commit_details(&self, repo: &str, sha: &str) -> Option<CommitDetails>;

    /// Post a markdown comment on a pull request. Returns whether it landed.
    async fn post_comment(&self, repo: &str, pr_number: u64, body: &str) -> bool;
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    #[serde(default)]
    title: String,
    head: PullHead,
}

#[derive(Debug, Deserialize)]
struct PullHead {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    filename: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    commit: CommitBody,
    #[serde(default)]
    files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct CommitBody {
    #[serde(default)]
    message: String,
}

/// GitHub REST v3 client.
#[derive(Debug, Clone)]
pub struct GithubClient {
    api_base: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl GithubClient {
    pub fn new(api_base: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            http,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.github_api_base,
            config.github_token.clone(),
            Duration::from_secs(config.http_timeout_sec),
        )
    }

    fn headers(&self) -> Result<HeaderMap> {
        let token = self.token.as_deref().ok_or(GithubError::NotConfigured)?;
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| GithubError::InvalidHeader(e.to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
        headers.insert(USER_AGENT, HeaderValue::from_static("ciboss"));
        Ok(headers)
    }

    fn repo_url(&self, repo: &str, suffix: &str) -> Result<String> {
        let repo = RepoRef::parse(repo)?;
        Ok(format!(
            "{}/repos/{}/{}/{suffix}",
            self.api_base,
            urlencoding::encode(&repo.owner),
            urlencoding::encode(&repo.name),
        ))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GithubError::Status {
            status: status.as_u16(),
            body: body.chars().take(ERROR_BODY_PREVIEW).collect(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        debug!(url = %url, "GET");
        let response = self
            .http
            .get(url)
            .headers(self.headers()?)
            .query(query)
            .send()
            .await?;
        Ok(Self::check_status(response).await?.json().await?)
    }

    async fn pull_request(&self, repo: &str, pr_number: u64) -> Result<PullResponse> {
        let url = self.repo_url(repo, &format!("pulls/{pr_number}"))?;
        self.get_json(&url, &[]).await
    }

    async fn pr_files_page(
        &self,
        repo: &str,
        pr_number: u64,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<String>> {
        let url = self.repo_url(repo, &format!("pulls/{pr_number}/files"))?;
        let entries: Vec<FileEntry> = self
            .get_json(
                &url,
                &[("page", page.to_string()), ("per_page", per_page.to_string())],
            )
            .await?;
        Ok(entries.into_iter().map(|f| f.filename).collect())
    }

    async fn commit(&self, repo: &str, sha: &str) -> Result<CommitResponse> {
        let url = self.repo_url(repo, &format!("commits/{}", urlencoding::encode(sha)))?;
        self.get_json(&url, &[]).await
    }

    async fn create_comment(&self, repo: &str, pr_number: u64, body: &str) -> Result<()> {
        // PR conversation comments live on the issues endpoint.
        let url = self.repo_url(repo, &format!("issues/{pr_number}/comments"))?;
        debug!(url = %url, "POST");
        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl CodeHost for GithubClient {
    fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    async fn fetch_pr_details(&self, repo: &str, pr_number: u64) -> Option<PullRequest> {
        match self.pull_request(repo, pr_number).await {
            Ok(pr) => Some(PullRequest {
                head_sha: pr.head.sha,
                title: pr.title,
            }),
            Err(e) => {
                error!(repo = %repo, pr = pr_number, error = %e, "failed to fetch pull request");
                None
            }
        }
    }

    async fn fetch_pr_files_page(
        &self,
        repo: &str,
        pr_number: u64,
        page: u32,
        per_page: u32,
    ) -> Option<Vec<String>> {
        match self.pr_files_page(repo, pr_number, page, per_page).await {
            Ok(files) => Some(files),
            Err(e) => {
                error!(repo = %repo, pr = pr_number, page, error = %e, "failed to fetch pull request files");
                None
            }
        }
    }

    async fn fetch_commit_files(&self, repo: &str, sha: &str) -> Option<Vec<String>> {
        match self.commit(repo, sha).await {
            Ok(commit) => Some(commit.files.into_iter().map(|f| f.filename).collect()),
            Err(e) => {
                error!(repo = %repo, sha = %sha, error = %e, "failed to fetch commit files");
                None
            }
        }
    }

    async fn fetch_commit_details(&self, repo: &str, sha: &str) -> Option<CommitDetails> {
        match self.commit(repo, sha).await {
            Ok(commit) => Some(CommitDetails {
                message: commit.commit.message,
            }),
            Err(e) => {
                error!(repo = %repo, sha = %sha, error = %e, "failed to fetch commit details");
                None
            }
        }
    }

    async fn post_comment(&self, repo: &str, pr_number: u64, body: &str) -> bool {
        if !self.is_configured() {
            warn!("GITHUB_TOKEN not set, skipping PR comment");
            return false;
        }
        match self.create_comment(repo, pr_number, body).await {
            Ok(()) => {
                info!(repo = %repo, pr = pr_number, "posted PR comment");
                true
            }
            Err(e) => {
                error!(repo = %repo, pr = pr_number, error = %e, "failed to post PR comment");
                false
            }
        }
    }
}
