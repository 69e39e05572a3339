//! Decision step: chooses the next action and performs its side effects.
//!
//! Transitions, checked in order:
//!
//! 1. tests just ran and failed: file or update the issue, go to
//!    `analyze_failures` without asking the model.
//! 2. tests just ran and passed: update any linked issue, post the status
//!    comment, go to `summarize`.
//! 3. analyzing failures: ask the model for a write-up, update the issue,
//!    post the status comment, go to `summarize`.
//! 4. anything else: ask the model for the next action, falling back to the
//!    status rule when its reply is unusable.
//!
//! The model is called at most once per invocation.

use ciboss_core::decision::{fallback_decision, parse_decision};
use ciboss_core::prompt::{build_decision_prompt, build_failure_analysis_prompt};
use ciboss_core::{NextAction, RunState, TestStatus};
use tracing::{error, info, warn};

use crate::github::CodeHost;
use crate::linear::IssueTracker;
use crate::publish::{create_or_update_issue, post_ci_results_comment, IssueSettings};
use crate::summarizer::Summarizer;

pub const TESTS_FAILED_SUMMARY: &str =
    "Tests failed. Creating Linear issue and analyzing failures.";
pub const TESTS_PASSED_SUMMARY: &str = "All tests passed successfully.";
pub const ANALYSIS_UNAVAILABLE_SUMMARY: &str = "Test failures detected. See logs for details.";

/// Collaborators the decision step talks to.
#[derive(Clone, Copy)]
pub struct PlannerContext<'a> {
    pub summarizer: &'a dyn Summarizer,
    pub tracker: &'a dyn IssueTracker,
    pub host: &'a dyn CodeHost,
    pub issue_settings: &'a IssueSettings,
}

impl std::fmt::Debug for PlannerContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannerContext")
            .field("issue_settings", self.issue_settings)
            .finish_non_exhaustive()
    }
}

/// Run one decision. Sets `next_action` and `summary` on `state`.
pub async fn decide_step(state: &mut RunState, ctx: PlannerContext<'_>) {
    let previous = state.next_action;

    match (previous, state.test_status) {
        (Some(NextAction::RunTests), TestStatus::Failed) => {
            create_or_update_issue(state, ctx.tracker, ctx.issue_settings).await;
            state.set_decision(NextAction::AnalyzeFailures, TESTS_FAILED_SUMMARY);
        }
        (Some(NextAction::RunTests), TestStatus::Passed) => {
            if state.has_linked_issue() {
                create_or_update_issue(state, ctx.tracker, ctx.issue_settings).await;
            }
            state.set_decision(NextAction::Summarize, TESTS_PASSED_SUMMARY);
            post_ci_results_comment(state, ctx.host).await;
        }
        (Some(NextAction::AnalyzeFailures), _) => {
            let summary = match ctx
                .summarizer
                .complete(&build_failure_analysis_prompt(state))
                .await
            {
                Ok(analysis) => analysis,
                Err(e) => {
                    error!(error = %e, "failure analysis unavailable");
                    ANALYSIS_UNAVAILABLE_SUMMARY.to_string()
                }
            };
            state.summary = Some(summary);
            create_or_update_issue(state, ctx.tracker, ctx.issue_settings).await;
            post_ci_results_comment(state, ctx.host).await;
            state.next_action = Some(NextAction::Summarize);
        }
        _ => {
            let decision = match ctx.summarizer.complete(&build_decision_prompt(state)).await {
                Ok(response) => parse_decision(&response, state.test_status),
                Err(e) => {
                    error!(error = %e, "planner model unavailable");
                    fallback_decision(state.test_status)
                }
            };
            if decision.source.is_fallback() {
                warn!(
                    source = decision.source.as_str(),
                    action = %decision.action,
                    "using fallback decision"
                );
            }
            state.set_decision(decision.action, decision.summary);
        }
    }

    info!(
        previous = previous.map_or("none", |a| a.as_str()),
        next = state.next_action.map_or("none", |a| a.as_str()),
        status = %state.test_status,
        "decision made"
    );
}
