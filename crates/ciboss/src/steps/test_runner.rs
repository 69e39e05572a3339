//! Test execution step.

use ciboss_core::text::truncate_with_marker;
use ciboss_core::{NextAction, RunState, TestStatus};
use tracing::{error, info, warn};

use crate::executor::{ExecError, ExecOutput, TestCommand, TestExecutor};

/// Maximum characters of test output kept on the run.
pub const MAX_TEST_LOG_CHARS: usize = 20_000;

const LOG_TRUNCATION_MARKER: &str = "\n\n... (truncated)";
const STDERR_SEPARATOR: &str = "\n--- STDERR ---\n";

/// Run the test command if the planner asked for it.
///
/// Returns whether the command was executed. Execution errors are recorded
/// as a failed run with a diagnostic in `test_logs`.
pub async fn run_tests_step(
    state: &mut RunState,
    executor: &dyn TestExecutor,
    command: &TestCommand,
) -> bool {
    if state.next_action != Some(NextAction::RunTests) {
        info!(
            next_action = state.next_action.map_or("none", |a| a.as_str()),
            "skipping test execution"
        );
        return false;
    }

    match executor.run(command).await {
        Ok(output) => {
            let status = if output.success() {
                info!("tests passed");
                TestStatus::Passed
            } else {
                warn!(exit_code = output.exit_code, "tests failed");
                TestStatus::Failed
            };
            state.record_test_outcome(status, combine_logs(&output));
        }
        Err(e) => {
            error!(command = %command.command, error = %e, "test execution error");
            state.record_test_outcome(TestStatus::Failed, execution_error_log(&e, command));
        }
    }
    true
}

/// Stdout followed by a marked stderr section, capped at `MAX_TEST_LOG_CHARS`.
pub fn combine_logs(output: &ExecOutput) -> String {
    let mut logs = output.stdout.clone();
    if !output.stderr.is_empty() {
        logs.push_str(STDERR_SEPARATOR);
        logs.push_str(&output.stderr);
    }
    truncate_with_marker(&logs, MAX_TEST_LOG_CHARS, LOG_TRUNCATION_MARKER)
}

/// Diagnostic stored in `test_logs` when the command could not complete.
pub fn execution_error_log(err: &ExecError, command: &TestCommand) -> String {
    let cmd = &command.command;
    match err {
        ExecError::Timeout(after) => format!(
            "ERROR: Test execution timed out after {} seconds.\nCommand: {cmd}\nConsider increasing the timeout or optimizing tests.",
            after.as_secs()
        ),
        ExecError::NotFound(detail) => format!(
            "ERROR: Command not found - {detail}\nCommand: {cmd}\nEnsure the test runner is installed (e.g. npm install @playwright/test)."
        ),
        ExecError::Other(detail) => {
            format!("ERROR: Failed to execute tests - {detail}\nCommand: {cmd}")
        }
    }
}
