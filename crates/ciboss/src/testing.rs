//! In-process fakes for the external collaborators.
//!
//! Each fake records what it was asked to do so tests can assert on call
//! counts and payloads. Compiled for unit tests and behind the
//! `test-support` feature for integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::executor::{ExecError, ExecOutput, TestCommand, TestExecutor};
use crate::github::{CodeHost, CommitDetails, PullRequest};
use crate::linear::{CreatedIssue, IssueTracker};
use crate::summarizer::{Summarizer, SummarizerError};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// --- Code host ---

/// Code host backed by fixed data.
#[derive(Debug)]
pub struct FakeCodeHost {
    configured: bool,
    head_sha: Option<String>,
    pr_files: Option<Vec<String>>,
    commit_files: Option<Vec<String>>,
    commit_message: Option<String>,
    pr_details_calls: AtomicUsize,
    pr_page_calls: AtomicUsize,
    commit_files_calls: AtomicUsize,
    commit_details_calls: AtomicUsize,
    comments: Mutex<Vec<(String, u64, String)>>,
}

impl Default for FakeCodeHost {
    fn default() -> Self {
        Self {
            configured: true,
            head_sha: None,
            pr_files: None,
            commit_files: None,
            commit_message: None,
            pr_details_calls: AtomicUsize::new(0),
            pr_page_calls: AtomicUsize::new(0),
            commit_files_calls: AtomicUsize::new(0),
            commit_details_calls: AtomicUsize::new(0),
            comments: Mutex::new(Vec::new()),
        }
    }
}

impl FakeCodeHost {
    /// Configured host with no data: every fetch is absent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Host without a credential.
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::default()
        }
    }

    pub fn with_head_sha(mut self, sha: impl Into<String>) -> Self {
        self.head_sha = Some(sha.into());
        self
    }

    /// Files served by the paged PR files endpoint.
    pub fn with_pr_files(mut self, files: Vec<String>) -> Self {
        self.pr_files = Some(files);
        self
    }

    pub fn with_commit_files(mut self, files: Vec<String>) -> Self {
        self.commit_files = Some(files);
        self
    }

    pub fn with_commit_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = Some(message.into());
        self
    }

    pub fn pr_details_calls(&self) -> usize {
        self.pr_details_calls.load(Ordering::SeqCst)
    }

    pub fn pr_page_calls(&self) -> usize {
        self.pr_page_calls.load(Ordering::SeqCst)
    }

    pub fn commit_files_calls(&self) -> usize {
        self.commit_files_calls.load(Ordering::SeqCst)
    }

    pub fn commit_details_calls(&self) -> usize {
        self.commit_details_calls.load(Ordering::SeqCst)
    }

    /// Total metadata fetches, excluding comment posts.
    pub fn fetch_calls(&self) -> usize {
        self.pr_details_calls()
            + self.pr_page_calls()
            + self.commit_files_calls()
            + self.commit_details_calls()
    }

    /// `(repo, pr_number, body)` of every posted comment.
    pub fn posted_comments(&self) -> Vec<(String, u64, String)> {
        lock(&self.comments).clone()
    }
}

#[async_trait]
impl CodeHost for FakeCodeHost {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn fetch_pr_details(&self, _repo: &str, _pr_number: u64) -> Option<PullRequest> {
        self.pr_details_calls.fetch_add(1, Ordering::SeqCst);
        self.head_sha.clone().map(|head_sha| PullRequest {
            head_sha,
            title: "Fake pull request".to_string(),
        })
    }

    async fn fetch_pr_files_page(
        &self,
        _repo: &str,
        _pr_number: u64,
        page: u32,
        per_page: u32,
    ) -> Option<Vec<String>> {
        self.pr_page_calls.fetch_add(1, Ordering::SeqCst);
        let files = self.pr_files.as_ref()?;
        let start = (page.saturating_sub(1) * per_page) as usize;
        Some(
            files
                .iter()
                .skip(start)
                .take(per_page as usize)
                .cloned()
                .collect(),
        )
    }

    async fn fetch_commit_files(&self, _repo: &str, _sha: &str) -> Option<Vec<String>> {
        self.commit_files_calls.fetch_add(1, Ordering::SeqCst);
        self.commit_files.clone()
    }

    async fn fetch_commit_details(&self, _repo: &str, _sha: &str) -> Option<CommitDetails> {
        self.commit_details_calls.fetch_add(1, Ordering::SeqCst);
        self.commit_message
            .clone()
            .map(|message| CommitDetails { message })
    }

    async fn post_comment(&self, repo: &str, pr_number: u64, body: &str) -> bool {
        if !self.configured {
            return false;
        }
        lock(&self.comments).push((repo.to_string(), pr_number, body.to_string()));
        true
    }
}

// --- Issue tracker ---

/// Arguments of a `create_issue` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub title: String,
    pub description: String,
    pub label_ids: Vec<String>,
}

/// Issue tracker that hands out sequential issue ids.
///
/// Knows a single workflow state, `Done`, with id `state-done`.
#[derive(Debug)]
pub struct FakeIssueTracker {
    configured: bool,
    fail_creates: bool,
    created: Mutex<Vec<CreateRequest>>,
    comments: Mutex<Vec<(String, String)>>,
    state_updates: Mutex<Vec<(String, String)>>,
}

impl Default for FakeIssueTracker {
    fn default() -> Self {
        Self {
            configured: true,
            fail_creates: false,
            created: Mutex::new(Vec::new()),
            comments: Mutex::new(Vec::new()),
            state_updates: Mutex::new(Vec::new()),
        }
    }
}

impl FakeIssueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::default()
        }
    }

    /// Every `create_issue` call fails (but is still recorded).
    pub fn failing_creates(mut self) -> Self {
        self.fail_creates = true;
        self
    }

    pub fn create_calls(&self) -> usize {
        lock(&self.created).len()
    }

    pub fn created(&self) -> Vec<CreateRequest> {
        lock(&self.created).clone()
    }

    /// `(issue_id, body)` of every comment.
    pub fn comments(&self) -> Vec<(String, String)> {
        lock(&self.comments).clone()
    }

    /// `(issue_id, state_id)` of every state change.
    pub fn state_updates(&self) -> Vec<(String, String)> {
        lock(&self.state_updates).clone()
    }
}

#[async_trait]
impl IssueTracker for FakeIssueTracker {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn team_id(&self) -> Option<&str> {
        self.configured.then_some("team-fake")
    }

    async fn create_issue(
        &self,
        title: &str,
        description: &str,
        label_ids: &[String],
    ) -> Option<CreatedIssue> {
        let mut created = lock(&self.created);
        created.push(CreateRequest {
            title: title.to_string(),
            description: description.to_string(),
            label_ids: label_ids.to_vec(),
        });
        if self.fail_creates {
            return None;
        }
        let n = created.len();
        Some(CreatedIssue {
            id: format!("issue-{n}"),
            identifier: format!("CI-{n}"),
            url: format!("https://linear.app/ciboss/issue/CI-{n}"),
        })
    }

    async fn add_comment(&self, issue_id: &str, body: &str) -> bool {
        lock(&self.comments).push((issue_id.to_string(), body.to_string()));
        true
    }

    async fn find_workflow_state(&self, _team_id: &str, name: &str) -> Option<String> {
        name.eq_ignore_ascii_case("done")
            .then(|| "state-done".to_string())
    }

    async fn update_issue_state(&self, issue_id: &str, state_id: &str) -> bool {
        lock(&self.state_updates).push((issue_id.to_string(), state_id.to_string()));
        true
    }
}

// --- Summarizer ---

/// Summarizer that plays back scripted replies.
///
/// Replies are consumed in order; once exhausted the last reply repeats.
#[derive(Debug)]
pub struct FakeSummarizer {
    replies: Mutex<VecDeque<Option<String>>>,
    last: Mutex<Option<String>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeSummarizer {
    /// Always answers `reply`.
    pub fn replying(reply: impl Into<String>) -> Self {
        Self::scripted(vec![Some(reply.into())])
    }

    /// Every call fails as if the model were unreachable.
    pub fn failing() -> Self {
        Self::scripted(vec![None])
    }

    /// `None` entries are failures.
    pub fn scripted(replies: Vec<Option<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        lock(&self.prompts).len()
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn complete(&self, prompt: &str) -> Result<String, SummarizerError> {
        lock(&self.prompts).push(prompt.to_string());
        let reply = {
            let mut last = lock(&self.last);
            if let Some(next) = lock(&self.replies).pop_front() {
                *last = next;
            }
            last.clone()
        };
        reply.ok_or(SummarizerError::Status {
            status: 503,
            body: "fake summarizer unavailable".to_string(),
        })
    }
}

// --- Test executor ---

/// Executor that returns a fixed result without spawning anything.
#[derive(Debug)]
pub struct FakeExecutor {
    result: Result<ExecOutput, ExecError>,
    commands: Mutex<Vec<TestCommand>>,
}

impl FakeExecutor {
    pub fn with_result(result: Result<ExecOutput, ExecError>) -> Self {
        Self {
            result,
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn passing(stdout: impl Into<String>) -> Self {
        Self::with_result(Ok(ExecOutput {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }))
    }

    pub fn failing(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::with_result(Ok(ExecOutput {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }))
    }

    pub fn timing_out(after: Duration) -> Self {
        Self::with_result(Err(ExecError::Timeout(after)))
    }

    pub fn calls(&self) -> usize {
        lock(&self.commands).len()
    }

    pub fn commands(&self) -> Vec<TestCommand> {
        lock(&self.commands).clone()
    }
}

#[async_trait]
impl TestExecutor for FakeExecutor {
    async fn run(&self, cmd: &TestCommand) -> Result<ExecOutput, ExecError> {
        lock(&self.commands).push(cmd.clone());
        self.result.clone()
    }
}
