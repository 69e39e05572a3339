//! ciboss - CI orchestration agent
//!
//! Fetches pull request metadata, runs the test suite, lets a language model
//! pick the next step, files or updates a Linear issue on failure and posts
//! a status comment back on the pull request.

pub mod executor;
pub mod github;
pub mod linear;
pub mod orchestrator;
pub mod publish;
pub mod steps;
pub mod summarizer;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use executor::{ShellExecutor, TestCommand, TestExecutor};
pub use github::{CodeHost, GithubClient};
pub use linear::{IssueTracker, LinearClient};
pub use orchestrator::{Orchestrator, OrchestratorConfig, RunOutcome, Termination};
pub use summarizer::{OpenAiSummarizer, Summarizer};
