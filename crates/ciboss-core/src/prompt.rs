//! Prompt assembly for the planner model.

use crate::text::truncate_chars;
use crate::types::RunState;

/// Characters of test output included in any prompt.
pub const LOG_PREVIEW_CHARS: usize = 4000;

/// Characters of the preview included in the next-action prompt.
pub const DECISION_LOG_PREVIEW_CHARS: usize = 1000;

const NOT_AVAILABLE: &str = "N/A";

/// First `LOG_PREVIEW_CHARS` of the test logs, or `N/A` when there are none.
pub fn log_preview(state: &RunState) -> &str {
    match state.test_logs.as_deref() {
        Some(logs) if !logs.is_empty() => truncate_chars(logs, LOG_PREVIEW_CHARS),
        _ => NOT_AVAILABLE,
    }
}

fn or_na(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => NOT_AVAILABLE,
    }
}

fn repo_or_na(state: &RunState) -> &str {
    if state.has_repo() {
        &state.repo
    } else {
        NOT_AVAILABLE
    }
}

/// Prompt asking the model for the next action as a JSON object.
pub fn build_decision_prompt(state: &RunState) -> String {
    let preview = log_preview(state);
    let decision_preview = if preview == NOT_AVAILABLE {
        NOT_AVAILABLE
    } else {
        truncate_chars(preview, DECISION_LOG_PREVIEW_CHARS)
    };
    let pr = state
        .pr_number
        .map_or_else(|| NOT_AVAILABLE.to_string(), |n| n.to_string());
    let previous = state
        .next_action
        .map_or("None (first run)", |action| action.as_str());

    format!(
        r#"You are a CI boss agent managing CI/CD workflows.

IMPORTANT: You must analyze the situation and decide the next action.

Repository: {repo}
Commit: {commit}
PR: {pr}
Changed files: {files:?}

Test status: {status}
Test logs (preview): {decision_preview}

Previous action: {previous}

Decide what to do next:
- "run_tests": Run Playwright tests (if tests haven't run yet)
- "analyze_failures": Analyze test failures (if tests failed)
- "summarize": Generate final summary (if tests passed or analysis complete)

You MUST respond with valid JSON: {{"action": "run_tests|analyze_failures|summarize", "summary": "brief explanation"}}
"#,
        repo = repo_or_na(state),
        commit = or_na(state.commit_sha.as_deref()),
        files = state.changed_files,
        status = state.test_status,
    )
}

/// Prompt asking the model for a short markdown analysis of failing tests.
pub fn build_failure_analysis_prompt(state: &RunState) -> String {
    format!(
        r#"You are a CI/CD expert. Analyze these test failures and provide a brief summary.

Repository: {repo}
Commit: {commit}
Changed files: {files:?}

Test logs (truncated):
{preview}

Provide:
1. A brief summary of what failed
2. Likely cause based on changed files
3. Suggested fix

Format as concise markdown."#,
        repo = repo_or_na(state),
        commit = or_na(state.commit_sha.as_deref()),
        files = state.changed_files,
        preview = log_preview(state),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NextAction, TestStatus};

    #[test]
    fn decision_prompt_for_first_run() {
        let mut state = RunState::new("octo/widgets").with_pr(42);
        state.changed_files = vec!["src/app.ts".to_string()];

        let prompt = build_decision_prompt(&state);
        assert!(prompt.contains("Repository: octo/widgets"));
        assert!(prompt.contains("Commit: N/A"));
        assert!(prompt.contains("PR: 42"));
        assert!(prompt.contains(r#"Changed files: ["src/app.ts"]"#));
        assert!(prompt.contains("Test status: pending"));
        assert!(prompt.contains("Test logs (preview): N/A"));
        assert!(prompt.contains("Previous action: None (first run)"));
        assert!(prompt.contains(r#"{"action": "run_tests|analyze_failures|summarize""#));
    }

    #[test]
    fn decision_prompt_limits_log_preview() {
        let mut state = RunState::new("o/r").with_commit("abc");
        state.record_test_outcome(TestStatus::Failed, "y".repeat(5000));
        state.next_action = Some(NextAction::AnalyzeFailures);

        let prompt = build_decision_prompt(&state);
        assert!(prompt.contains(&"y".repeat(DECISION_LOG_PREVIEW_CHARS)));
        assert!(!prompt.contains(&"y".repeat(DECISION_LOG_PREVIEW_CHARS + 1)));
        assert!(prompt.contains("Previous action: analyze_failures"));
    }

    #[test]
    fn failure_prompt_uses_full_preview() {
        let mut state = RunState::new("o/r").with_commit("abc123");
        state.record_test_outcome(TestStatus::Failed, "z".repeat(6000));

        let prompt = build_failure_analysis_prompt(&state);
        assert!(prompt.contains("Commit: abc123"));
        assert!(prompt.contains(&"z".repeat(LOG_PREVIEW_CHARS)));
        assert!(!prompt.contains(&"z".repeat(LOG_PREVIEW_CHARS + 1)));
        assert!(prompt.ends_with("Format as concise markdown."));
    }

    #[test]
    fn empty_logs_render_as_not_available() {
        let mut state = RunState::new("o/r");
        state.test_logs = Some(String::new());
        assert_eq!(log_preview(&state), "N/A");
    }
}
