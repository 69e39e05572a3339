//! Side effects of a decision: issue-tracker updates and PR comments.

use ciboss_core::report::{
    build_ci_comment, build_failure_update, build_issue_description, build_issue_title,
    build_passing_update,
};
use ciboss_core::{Config, RunState, TestStatus};
use tracing::{info, warn};

use crate::github::CodeHost;
use crate::linear::IssueTracker;

/// Issue-tracker settings that don't belong to the client itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueSettings {
    /// Labels applied to created issues.
    pub label_ids: Vec<String>,
    /// Workflow state a tracked issue moves to when tests pass again.
    pub done_state: String,
}

impl Default for IssueSettings {
    fn default() -> Self {
        Self {
            label_ids: Vec::new(),
            done_state: "Done".to_string(),
        }
    }
}

impl IssueSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            label_ids: config.linear_label_ids.clone(),
            done_state: config.linear_done_state.clone(),
        }
    }
}

/// Create a failure issue, or update the one already linked to the run.
///
/// - tracker unconfigured: nothing happens.
/// - linked issue, passed: comment, then move it to the done state.
/// - linked issue, failed: one failure-update comment.
/// - no linked issue, failed: create one and link it on `state`.
/// - anything else: nothing happens.
pub async fn create_or_update_issue(
    state: &mut RunState,
    tracker: &dyn IssueTracker,
    settings: &IssueSettings,
) {
    if !tracker.is_configured() {
        warn!("LINEAR_API_KEY or LINEAR_TEAM_ID not set, skipping Linear integration");
        return;
    }

    if let Some(issue_id) = state.linear_issue_id.clone() {
        match state.test_status {
            TestStatus::Passed => {
                tracker
                    .add_comment(&issue_id, &build_passing_update(state))
                    .await;
                move_to_done(tracker, &issue_id, &settings.done_state).await;
            }
            TestStatus::Failed => {
                tracker
                    .add_comment(&issue_id, &build_failure_update(state))
                    .await;
            }
            TestStatus::Pending => {}
        }
        return;
    }

    if state.test_status != TestStatus::Failed {
        return;
    }

    let title = build_issue_title(state);
    let description = build_issue_description(state);
    if let Some(issue) = tracker
        .create_issue(&title, &description, &settings.label_ids)
        .await
    {
        info!(identifier = %issue.identifier, "linked Linear issue to run");
        state.link_issue(issue.id, issue.url, Some(issue.identifier));
    }
}

async fn move_to_done(tracker: &dyn IssueTracker, issue_id: &str, done_state: &str) {
    let Some(team_id) = tracker.team_id() else {
        return;
    };
    match tracker.find_workflow_state(team_id, done_state).await {
        Some(state_id) => {
            tracker.update_issue_state(issue_id, &state_id).await;
        }
        None => {
            warn!(issue_id = %issue_id, state = %done_state, "not moving issue, state unavailable");
        }
    }
}

/// Post the status comment for the run's pull request.
///
/// Returns false without calling the host when there is no PR, no repo, or
/// no code-host credential.
pub async fn post_ci_results_comment(state: &RunState, host: &dyn CodeHost) -> bool {
    let Some(pr_number) = state.pr_number else {
        info!("no PR number set, skipping comment");
        return false;
    };
    if !state.has_repo() {
        warn!("no repo set, cannot post comment");
        return false;
    }
    if !host.is_configured() {
        warn!("GITHUB_TOKEN not set, skipping comment");
        return false;
    }
    host.post_comment(&state.repo, pr_number, &build_ci_comment(state))
        .await
}
