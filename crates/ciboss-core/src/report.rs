//! Markdown bodies posted to the code host and the issue tracker.
//!
//! Every builder is a pure function of `RunState` so the CLI can render a
//! saved state without any network access.

use crate::text::{TRUNCATION_MARKER, exceeds_chars, truncate_chars, truncate_with_marker};
use crate::types::{RunState, TestStatus};

/// Log characters shown in a PR comment or issue update comment.
pub const MAX_COMMENT_LOG_CHARS: usize = 2000;

/// Changed files listed in a PR comment.
pub const MAX_COMMENT_FILES: usize = 10;

/// Changed files listed in an issue description.
pub const MAX_ISSUE_FILES: usize = 20;

/// Hard cap on an issue description.
pub const MAX_ISSUE_DESCRIPTION_CHARS: usize = 10_000;

/// Room kept in an issue description for everything after the logs.
const ISSUE_DESCRIPTION_RESERVE: usize = 500;

/// Logs always get at least this much room in an issue description.
const MIN_ISSUE_LOG_CHARS: usize = 1000;

const DESCRIPTION_TRUNCATION_MARKER: &str = "\n\n... (truncated)";

const FOOTER: &str = "_Generated by CI Boss Agent_";

fn status_header(status: TestStatus) -> (&'static str, &'static str) {
    match status {
        TestStatus::Passed => ("✅", "Tests Passed"),
        TestStatus::Failed => ("❌", "Tests Failed"),
        TestStatus::Pending => ("⏳", "Tests Pending"),
    }
}

fn commit_or_na(state: &RunState) -> &str {
    match state.commit_sha.as_deref() {
        Some(sha) if !sha.is_empty() => sha,
        _ => "N/A",
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Status comment posted on the pull request.
pub fn build_ci_comment(state: &RunState) -> String {
    let (glyph, text) = status_header(state.test_status);
    let mut lines = vec![
        format!("## {glyph} CI Boss Report: {text}"),
        String::new(),
        format!("**Commit:** `{}`", truncate_chars(commit_or_na(state), 8)),
    ];

    if let Some(summary) = non_empty(state.summary.as_deref()) {
        lines.push(String::new());
        lines.push("### Summary".to_string());
        lines.push(summary.to_string());
    }

    if let Some(url) = non_empty(state.linear_issue_url.as_deref()) {
        let label = non_empty(state.linear_issue_identifier.as_deref()).unwrap_or("Linear Issue");
        lines.push(String::new());
        lines.push(format!("📋 **Linked Linear Issue:** [{label}]({url})"));
    }

    if state.test_status == TestStatus::Failed {
        if let Some(logs) = non_empty(state.test_logs.as_deref()) {
            lines.push(String::new());
            lines.push("<details>".to_string());
            lines.push("<summary>Test Logs (click to expand)</summary>".to_string());
            lines.push(String::new());
            lines.push("```".to_string());
            lines.push(truncate_with_marker(
                logs,
                MAX_COMMENT_LOG_CHARS,
                TRUNCATION_MARKER,
            ));
            lines.push("```".to_string());
            lines.push(String::new());
            lines.push("</details>".to_string());
        }
    }

    let files = &state.changed_files;
    if !files.is_empty() {
        lines.push(String::new());
        lines.push(format!("**Changed Files:** {} file(s)", files.len()));
        if files.len() > MAX_COMMENT_FILES {
            lines.push(format!(
                "  (showing first {MAX_COMMENT_FILES} of {})",
                files.len()
            ));
        }
        for file in files.iter().take(MAX_COMMENT_FILES) {
            lines.push(format!("  - `{file}`"));
        }
    }

    lines.push(String::new());
    lines.push("---".to_string());
    lines.push(FOOTER.to_string());

    lines.join("\n")
}

/// Title for a newly created failure issue.
pub fn build_issue_title(state: &RunState) -> String {
    let repo = if state.has_repo() {
        state.repo.as_str()
    } else {
        "unknown"
    };
    let sha = non_empty(state.commit_sha.as_deref()).unwrap_or("unknown");
    format!(
        "[CI] Playwright failure on {repo}@{}",
        truncate_chars(sha, 7)
    )
}

/// Description for a newly created failure issue, capped at
/// `MAX_ISSUE_DESCRIPTION_CHARS`.
pub fn build_issue_description(state: &RunState) -> String {
    let repo = if state.has_repo() {
        state.repo.as_str()
    } else {
        "N/A"
    };
    let mut lines = vec![
        "## CI/CD Test Failure Details".to_string(),
        String::new(),
        format!("**Repository:** {repo}"),
        format!("**Commit:** `{}`", commit_or_na(state)),
    ];

    if let Some(pr) = state.pr_number {
        lines.push(format!("**Pull Request:** #{pr}"));
    }

    if let Some(summary) = non_empty(state.summary.as_deref()) {
        lines.push(String::new());
        lines.push("### Summary".to_string());
        lines.push(summary.to_string());
    }

    let files = &state.changed_files;
    if !files.is_empty() {
        lines.push(String::new());
        lines.push(format!("### Changed Files ({} total)", files.len()));
        for file in files.iter().take(MAX_ISSUE_FILES) {
            lines.push(format!("- `{file}`"));
        }
        if files.len() > MAX_ISSUE_FILES {
            lines.push(format!(
                "- ... and {} more files",
                files.len() - MAX_ISSUE_FILES
            ));
        }
    }

    if let Some(logs) = non_empty(state.test_logs.as_deref()) {
        lines.push(String::new());
        lines.push("### Test Logs".to_string());
        lines.push("```".to_string());
        let used = lines.join("\n").chars().count();
        let budget = MAX_ISSUE_DESCRIPTION_CHARS
            .saturating_sub(used)
            .saturating_sub(ISSUE_DESCRIPTION_RESERVE)
            .max(MIN_ISSUE_LOG_CHARS);
        lines.push(truncate_with_marker(logs, budget, TRUNCATION_MARKER));
        lines.push("```".to_string());
    }

    let description = lines.join("\n");
    if exceeds_chars(&description, MAX_ISSUE_DESCRIPTION_CHARS) {
        let keep = MAX_ISSUE_DESCRIPTION_CHARS - DESCRIPTION_TRUNCATION_MARKER.chars().count();
        return format!(
            "{}{DESCRIPTION_TRUNCATION_MARKER}",
            truncate_chars(&description, keep)
        );
    }
    description
}

/// Comment added to a tracked issue once its tests pass again.
pub fn build_passing_update(state: &RunState) -> String {
    format!(
        "## ✅ Tests Now Passing\n\n**Commit:** `{}`\n\nThe tests that previously failed are now passing.",
        commit_or_na(state)
    )
}

/// Comment added to a tracked issue when its tests fail again.
pub fn build_failure_update(state: &RunState) -> String {
    let summary = non_empty(state.summary.as_deref()).unwrap_or("No summary available");
    let logs = state
        .test_logs
        .as_deref()
        .map(|logs| truncate_with_marker(logs, MAX_COMMENT_LOG_CHARS, TRUNCATION_MARKER))
        .unwrap_or_default();
    format!(
        "## ❌ Test Failure Update\n\n**Commit:** `{}`\n\n### Summary\n{summary}\n\n### Test Logs\n```\n{logs}\n```",
        commit_or_na(state)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_state() -> RunState {
        let mut state = RunState::new("octo/widgets")
            .with_pr(12)
            .with_commit("0123456789abcdef");
        state.record_test_outcome(TestStatus::Failed, "1 failed: login.spec.ts".to_string());
        state.summary = Some("Login test broke".to_string());
        state.changed_files = vec!["src/login.ts".to_string()];
        state
    }

    #[test]
    fn comment_for_failed_run() {
        let comment = build_ci_comment(&failed_state());
        assert!(comment.starts_with("## ❌ CI Boss Report: Tests Failed\n\n**Commit:** `01234567`"));
        assert!(comment.contains("### Summary\nLogin test broke"));
        assert!(comment.contains("<summary>Test Logs (click to expand)</summary>"));
        assert!(comment.contains("1 failed: login.spec.ts"));
        assert!(comment.contains("**Changed Files:** 1 file(s)\n  - `src/login.ts`"));
        assert!(!comment.contains("showing first"));
        assert!(comment.ends_with("---\n_Generated by CI Boss Agent_"));
    }

    #[test]
    fn comment_for_passed_run_has_no_logs() {
        let mut state = failed_state();
        state.test_status = TestStatus::Passed;
        let comment = build_ci_comment(&state);
        assert!(comment.starts_with("## ✅ CI Boss Report: Tests Passed"));
        assert!(!comment.contains("<details>"));
    }

    #[test]
    fn comment_for_pending_run_without_commit() {
        let comment = build_ci_comment(&RunState::new("o/r"));
        assert!(comment.starts_with("## ⏳ CI Boss Report: Tests Pending"));
        assert!(comment.contains("**Commit:** `N/A`"));
        assert!(!comment.contains("### Summary"));
        assert!(!comment.contains("Changed Files"));
    }

    #[test]
    fn comment_links_issue() {
        let mut state = failed_state();
        state.link_issue(
            "iss-1".to_string(),
            "https://linear.app/t/ENG-7".to_string(),
            Some("ENG-7".to_string()),
        );
        let comment = build_ci_comment(&state);
        assert!(comment.contains("📋 **Linked Linear Issue:** [ENG-7](https://linear.app/t/ENG-7)"));

        state.linear_issue_identifier = None;
        let comment = build_ci_comment(&state);
        assert!(comment.contains("[Linear Issue](https://linear.app/t/ENG-7)"));
    }

    #[test]
    fn comment_truncates_logs_and_files() {
        let mut state = failed_state();
        state.test_logs = Some("x".repeat(2500));
        state.changed_files = (0..15).map(|i| format!("f{i}.ts")).collect();

        let comment = build_ci_comment(&state);
        assert!(comment.contains(&format!("{}\n... (truncated)", "x".repeat(2000))));
        assert!(!comment.contains(&"x".repeat(2001)));
        assert!(comment.contains("**Changed Files:** 15 file(s)\n  (showing first 10 of 15)"));
        assert!(comment.contains("`f9.ts`"));
        assert!(!comment.contains("`f10.ts`"));
    }

    #[test]
    fn issue_title_uses_short_sha() {
        assert_eq!(
            build_issue_title(&failed_state()),
            "[CI] Playwright failure on octo/widgets@0123456"
        );
        let state = RunState::new("o/r").with_commit("abc");
        assert_eq!(build_issue_title(&state), "[CI] Playwright failure on o/r@abc");
        assert_eq!(
            build_issue_title(&RunState::default()),
            "[CI] Playwright failure on unknown@unknown"
        );
    }

    #[test]
    fn issue_description_lists_context() {
        let description = build_issue_description(&failed_state());
        assert!(description.starts_with("## CI/CD Test Failure Details"));
        assert!(description.contains("**Repository:** octo/widgets"));
        assert!(description.contains("**Commit:** `0123456789abcdef`"));
        assert!(description.contains("**Pull Request:** #12"));
        assert!(description.contains("### Changed Files (1 total)\n- `src/login.ts`"));
        assert!(description.contains("### Test Logs\n```\n1 failed: login.spec.ts\n```"));
    }

    #[test]
    fn issue_description_limits_files() {
        let mut state = failed_state();
        state.changed_files = (0..25).map(|i| format!("f{i}.ts")).collect();
        let description = build_issue_description(&state);
        assert!(description.contains("- `f19.ts`"));
        assert!(!description.contains("- `f20.ts`"));
        assert!(description.contains("- ... and 5 more files"));
    }

    #[test]
    fn issue_description_is_capped() {
        let mut state = failed_state();
        state.summary = Some("s".repeat(12_000));
        state.test_logs = Some("l".repeat(20_000));
        let description = build_issue_description(&state);
        assert_eq!(description.chars().count(), MAX_ISSUE_DESCRIPTION_CHARS);
        assert!(description.ends_with("\n\n... (truncated)"));
    }

    #[test]
    fn issue_description_truncates_long_logs() {
        let mut state = failed_state();
        state.test_logs = Some("l".repeat(20_000));
        let description = build_issue_description(&state);
        assert!(description.chars().count() <= MAX_ISSUE_DESCRIPTION_CHARS);
        assert!(description.contains("l\n... (truncated)\n```"));
    }

    #[test]
    fn passing_update_names_commit() {
        let update = build_passing_update(&failed_state());
        assert!(update.starts_with("## ✅ Tests Now Passing"));
        assert!(update.contains("**Commit:** `0123456789abcdef`"));
    }

    #[test]
    fn failure_update_caps_logs() {
        let mut state = failed_state();
        state.test_logs = Some("e".repeat(3000));
        let update = build_failure_update(&state);
        assert!(update.starts_with("## ❌ Test Failure Update"));
        assert!(update.contains("### Summary\nLogin test broke"));
        assert!(update.contains(&format!("{}\n... (truncated)\n```", "e".repeat(2000))));

        state.summary = None;
        state.test_logs = None;
        let update = build_failure_update(&state);
        assert!(update.contains("### Summary\nNo summary available"));
        assert!(update.ends_with("```\n\n```"));
    }
}
