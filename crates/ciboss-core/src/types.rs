//! Core types for the CI orchestration loop.
//!
//! `RunState` is the single record threaded through the fetch, decision and
//! test-execution steps. Everything else here is the vocabulary those steps
//! share.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::text::truncate_chars;

/// Fallback commit reference used when no real SHA can be resolved.
pub const SENTINEL_COMMIT: &str = "HEAD";

/// Maximum characters kept from a commit message.
pub const MAX_COMMIT_MESSAGE_CHARS: usize = 500;

/// Unique identifier for a single orchestration run.
/// Uses `UUIDv7` so ids sort by creation time in logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub String);

impl Id {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// --- Enumerations ---

/// Outcome of the test suite for the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    #[default]
    Pending,
    Passed,
    Failed,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action chosen by the decision step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    RunTests,
    AnalyzeFailures,
    Summarize,
}

impl NextAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunTests => "run_tests",
            Self::AnalyzeFailures => "analyze_failures",
            Self::Summarize => "summarize",
        }
    }

    /// Deterministic action for a test status, used whenever the model's
    /// recommendation is missing or unusable.
    pub fn for_status(status: TestStatus) -> Self {
        match status {
            TestStatus::Pending => Self::RunTests,
            TestStatus::Failed => Self::AnalyzeFailures,
            TestStatus::Passed => Self::Summarize,
        }
    }

    /// Whether the loop ends after this action's side effects.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::RunTests)
    }
}

impl std::fmt::Display for NextAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for NextAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "run_tests" => Ok(Self::RunTests),
            "analyze_failures" => Ok(Self::AnalyzeFailures),
            "summarize" => Ok(Self::Summarize),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

// --- Repository reference ---

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepoParseError {
    #[error("invalid repo format: {0:?}, expected 'owner/repo'")]
    MissingSeparator(String),
    #[error("invalid repo format: {0:?}, expected exactly one '/'")]
    TooManySeparators(String),
    #[error("invalid repo format: {0:?}, owner and name must be non-empty")]
    EmptyComponent(String),
}

/// A repository split into its owner and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(raw: &str) -> Result<Self, RepoParseError> {
        let trimmed = raw.trim();
        let Some((owner, name)) = trimmed.split_once('/') else {
            return Err(RepoParseError::MissingSeparator(raw.to_string()));
        };
        if name.contains('/') {
            return Err(RepoParseError::TooManySeparators(raw.to_string()));
        }
        let (owner, name) = (owner.trim(), name.trim());
        if owner.is_empty() || name.is_empty() {
            return Err(RepoParseError::EmptyComponent(raw.to_string()));
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// --- Run State ---

/// Mutable record threaded through every orchestration step.
///
/// Created from caller-supplied seed fields and discarded when the run ends.
/// Serializes with the same field names the CLI accepts as a seed file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunState {
    /// Repository in `owner/name` form. Empty means "not specified".
    pub repo: String,
    pub commit_sha: Option<String>,
    pub commit_message: Option<String>,
    pub pr_number: Option<u64>,
    pub changed_files: Vec<String>,
    pub test_status: TestStatus,
    pub test_logs: Option<String>,
    pub summary: Option<String>,
    pub next_action: Option<NextAction>,
    pub linear_issue_id: Option<String>,
    pub linear_issue_url: Option<String>,
    pub linear_issue_identifier: Option<String>,
}

impl RunState {
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            ..Self::default()
        }
    }

    pub fn with_pr(mut self, pr_number: u64) -> Self {
        self.pr_number = Some(pr_number);
        self
    }

    pub fn with_commit(mut self, sha: impl Into<String>) -> Self {
        self.commit_sha = Some(sha.into());
        self
    }

    pub fn has_repo(&self) -> bool {
        !self.repo.trim().is_empty()
    }

    /// Commit SHA, or the sentinel when none has been resolved.
    pub fn commit_ref(&self) -> &str {
        self.commit_sha.as_deref().unwrap_or(SENTINEL_COMMIT)
    }

    /// Store a commit message, truncated to `MAX_COMMIT_MESSAGE_CHARS`.
    pub fn set_commit_message(&mut self, message: &str) {
        self.commit_message = Some(truncate_chars(message, MAX_COMMIT_MESSAGE_CHARS).to_string());
    }

    /// Fill `commit_sha` with the sentinel if it was never resolved.
    pub fn ensure_commit_sha(&mut self) {
        if self.commit_sha.as_deref().is_none_or(str::is_empty) {
            self.commit_sha = Some(SENTINEL_COMMIT.to_string());
        }
    }

    pub fn has_linked_issue(&self) -> bool {
        self.linear_issue_id.is_some()
    }

    pub fn link_issue(&mut self, id: String, url: String, identifier: Option<String>) {
        self.linear_issue_id = Some(id);
        self.linear_issue_url = Some(url);
        self.linear_issue_identifier = identifier;
    }

    /// Record the result of one test execution.
    pub fn record_test_outcome(&mut self, status: TestStatus, logs: String) {
        self.test_status = status;
        self.test_logs = Some(logs);
    }

    pub fn set_decision(&mut self, action: NextAction, summary: impl Into<String>) {
        self.next_action = Some(action);
        self.summary = Some(summary.into());
    }

    /// Turn a previous run's saved state into the seed of a new run.
    ///
    /// Keeps `repo`, `pr_number` and the linked issue. Test outcome, summary
    /// and decision start over. A sentinel commit is dropped so the next fetch
    /// resolves the real one.
    pub fn start_new_run(&mut self) {
        self.test_status = TestStatus::Pending;
        self.test_logs = None;
        self.summary = None;
        self.next_action = None;
        if self.commit_sha.as_deref() == Some(SENTINEL_COMMIT) {
            self.clear_commit();
        }
    }

    /// Forget the commit and everything fetched for it.
    pub fn clear_commit(&mut self) {
        self.commit_sha = None;
        self.commit_message = None;
        self.changed_files.clear();
    }
}
