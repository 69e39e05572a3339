//! The orchestration loop: fetch, then decide/test until a terminal action.

use std::sync::Arc;
use std::time::Duration;

use ciboss_core::{Config, Id, RunState};
use tracing::{info, info_span, warn, Instrument};

use crate::executor::{TestCommand, TestExecutor};
use crate::github::CodeHost;
use crate::linear::IssueTracker;
use crate::publish::IssueSettings;
use crate::steps::{decide_step, fetch_step, run_tests_step, PlannerContext};
use crate::summarizer::Summarizer;

/// Default cap on decision steps per run.
pub const DEFAULT_MAX_ITERATIONS: u32 = 4;

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub test_command: TestCommand,
    /// Maximum decision steps before the loop gives up.
    pub max_iterations: u32,
    pub issue_settings: IssueSettings,
}

impl OrchestratorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            test_command: TestCommand {
                command: config.test_command.clone(),
                working_dir: config.test_working_dir.clone(),
                timeout: Duration::from_secs(config.test_timeout_sec),
            },
            max_iterations: config.max_iterations,
            issue_settings: IssueSettings::from_config(config),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The planner chose a terminal action.
    Terminal,
    /// The iteration cap was reached first.
    IterationCap,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Terminal => "terminal",
            Termination::IterationCap => "iteration_cap",
        }
    }
}

/// Result of a complete run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub state: RunState,
    /// Decision steps taken.
    pub iterations: u32,
    /// Times the test command was executed.
    pub test_runs: u32,
    pub termination: Termination,
}

/// Drives one CI run against injected collaborators.
pub struct Orchestrator {
    host: Arc<dyn CodeHost>,
    tracker: Arc<dyn IssueTracker>,
    summarizer: Arc<dyn Summarizer>,
    executor: Arc<dyn TestExecutor>,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        host: Arc<dyn CodeHost>,
        tracker: Arc<dyn IssueTracker>,
        summarizer: Arc<dyn Summarizer>,
        executor: Arc<dyn TestExecutor>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            host,
            tracker,
            summarizer,
            executor,
            config,
        }
    }

    /// Run the loop to completion starting from `state`.
    pub async fn run(&self, state: RunState) -> RunOutcome {
        let run_id = Id::new();
        let span = info_span!("run", run_id = %run_id, repo = %state.repo);
        self.run_inner(state).instrument(span).await
    }

    async fn run_inner(&self, mut state: RunState) -> RunOutcome {
        info!(pr = ?state.pr_number, "starting CI run");
        fetch_step(&mut state, self.host.as_ref()).await;

        let ctx = PlannerContext {
            summarizer: self.summarizer.as_ref(),
            tracker: self.tracker.as_ref(),
            host: self.host.as_ref(),
            issue_settings: &self.config.issue_settings,
        };

        let mut iterations = 0u32;
        let mut test_runs = 0u32;

        let termination = loop {
            if iterations >= self.config.max_iterations {
                warn!(
                    iterations,
                    limit = self.config.max_iterations,
                    "iteration limit reached"
                );
                break Termination::IterationCap;
            }

            decide_step(&mut state, ctx).await;
            iterations += 1;

            match state.next_action {
                Some(action) if !action.is_terminal() => {
                    // A test run needs a decision left to act on its result.
                    if iterations >= self.config.max_iterations {
                        warn!(
                            iterations,
                            limit = self.config.max_iterations,
                            "iteration limit reached, not running tests"
                        );
                        break Termination::IterationCap;
                    }
                    if run_tests_step(&mut state, self.executor.as_ref(), &self.config.test_command)
                        .await
                    {
                        test_runs += 1;
                    }
                }
                _ => break Termination::Terminal,
            }
        };

        info!(
            iterations,
            test_runs,
            termination = termination.as_str(),
            status = %state.test_status,
            "CI run finished"
        );

        RunOutcome {
            state,
            iterations,
            test_runs,
            termination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCodeHost, FakeExecutor, FakeIssueTracker, FakeSummarizer};
    use ciboss_core::{NextAction, TestStatus};

    fn orchestrator(
        summarizer: FakeSummarizer,
        executor: FakeExecutor,
        max_iterations: u32,
    ) -> (Orchestrator, Arc<FakeSummarizer>, Arc<FakeExecutor>) {
        let summarizer = Arc::new(summarizer);
        let executor = Arc::new(executor);
        let config = OrchestratorConfig {
            max_iterations,
            ..OrchestratorConfig::default()
        };
        let orch = Orchestrator::new(
            Arc::new(FakeCodeHost::new()),
            Arc::new(FakeIssueTracker::new()),
            Arc::clone(&summarizer) as Arc<dyn Summarizer>,
            Arc::clone(&executor) as Arc<dyn TestExecutor>,
            config,
        );
        (orch, summarizer, executor)
    }

    #[test]
    fn config_from_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.test_command.command, "npx playwright test");
        assert_eq!(config.test_command.timeout, Duration::from_secs(1800));
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_eq!(config.issue_settings.done_state, "Done");
    }

    #[tokio::test]
    async fn passing_run_takes_two_decisions() {
        let (orch, summarizer, executor) = orchestrator(
            FakeSummarizer::replying(r#"{"action":"run_tests","summary":"go"}"#),
            FakeExecutor::passing("ok"),
            DEFAULT_MAX_ITERATIONS,
        );
        let outcome = orch.run(RunState::new("o/r")).await;

        assert_eq!(outcome.termination, Termination::Terminal);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.test_runs, 1);
        assert_eq!(outcome.state.test_status, TestStatus::Passed);
        assert_eq!(outcome.state.next_action, Some(NextAction::Summarize));
        assert_eq!(summarizer.calls(), 1);
        assert_eq!(
            executor.commands(),
            vec![OrchestratorConfig::default().test_command]
        );
    }

    #[tokio::test]
    async fn terminal_first_decision_skips_tests() {
        let (orch, _, executor) = orchestrator(
            FakeSummarizer::replying(r#"{"action":"summarize","summary":"nothing to do"}"#),
            FakeExecutor::passing("ok"),
            DEFAULT_MAX_ITERATIONS,
        );
        let outcome = orch.run(RunState::new("o/r")).await;
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.test_runs, 0);
        assert_eq!(executor.calls(), 0);
        assert_eq!(outcome.state.test_status, TestStatus::Pending);
    }

    #[tokio::test]
    async fn cap_skips_tests_without_a_decision_left() {
        let (orch, _, executor) = orchestrator(
            FakeSummarizer::failing(),
            FakeExecutor::failing(1, "", "boom"),
            1,
        );
        let outcome = orch.run(RunState::new("o/r")).await;
        assert_eq!(outcome.termination, Termination::IterationCap);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.test_runs, 0);
        assert_eq!(executor.calls(), 0);
        assert_eq!(outcome.state.next_action, Some(NextAction::RunTests));
        assert_eq!(outcome.state.test_status, TestStatus::Pending);
    }

    #[tokio::test]
    async fn two_iterations_are_enough_for_one_test_run() {
        let (orch, _, executor) = orchestrator(
            FakeSummarizer::failing(),
            FakeExecutor::failing(1, "", "boom"),
            2,
        );
        let outcome = orch.run(RunState::new("o/r")).await;
        assert_eq!(outcome.termination, Termination::Terminal);
        assert_eq!(outcome.test_runs, 1);
        assert_eq!(executor.calls(), 1);
        assert_eq!(outcome.state.next_action, Some(NextAction::AnalyzeFailures));
    }
}
