//! ciboss - CI orchestration agent
//!
//! Main entry point for the `ciboss` binary.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ciboss::{
    GithubClient, LinearClient, OpenAiSummarizer, Orchestrator, OrchestratorConfig, RunOutcome,
    ShellExecutor, Termination,
};
use ciboss_core::report::build_ci_comment;
use ciboss_core::{Config, RunState, TestStatus};
use clap::{Parser, Subcommand};
use eyre::{bail, Result, WrapErr};
use tracing::{debug, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// CI orchestration agent: test, triage, report.
#[derive(Parser)]
#[command(name = "ciboss", version)]
#[command(about = "Run tests for a pull request and report the results")]
struct Cli {
    /// Config file path (overrides .ciboss/config)
    #[arg(long, global = true, env = "CIBOSS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full CI loop for a repository
    Run {
        /// Repository as OWNER/NAME
        #[arg(long)]
        repo: Option<String>,

        /// Pull request number
        #[arg(long)]
        pr: Option<u64>,

        /// Commit SHA (resolved from the PR head when omitted)
        #[arg(long)]
        commit: Option<String>,

        /// JSON state of a previous run; its linked issue carries over
        #[arg(long)]
        seed: Option<PathBuf>,

        /// Continue the seeded run as saved instead of starting a new one
        #[arg(long, requires = "seed")]
        resume: bool,

        /// Test command (overrides config and PLAYWRIGHT_COMMAND)
        #[arg(long)]
        test_command: Option<String>,

        /// Directory to run the test command in
        #[arg(long)]
        working_dir: Option<PathBuf>,

        /// Test timeout in seconds
        #[arg(long)]
        timeout_sec: Option<u64>,

        /// Maximum decision steps
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Print the final run state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the status comment for a saved run state (no network)
    Render {
        /// Path to the run state JSON
        #[arg(long)]
        state: PathBuf,
    },
}

/// CLI overrides for `run`; applied after file and environment config.
struct RunOverrides {
    test_command: Option<String>,
    working_dir: Option<PathBuf>,
    timeout_sec: Option<u64>,
    max_iterations: Option<u32>,
}

impl RunOverrides {
    fn apply(self, config: &mut Config) -> Result<()> {
        if let Some(command) = self.test_command {
            if command.trim().is_empty() {
                bail!("--test-command must not be empty");
            }
            config.test_command = command;
        }
        if let Some(dir) = self.working_dir {
            config.test_working_dir = Some(dir);
        }
        if let Some(secs) = self.timeout_sec {
            config.test_timeout_sec = secs;
        }
        if let Some(max) = self.max_iterations {
            if max == 0 {
                bail!("--max-iterations must be at least 1");
            }
            config.max_iterations = max;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Command::Render { state } => {
            let state = read_state(&state)?;
            print!("{}", build_ci_comment(&state));
            Ok(())
        }
        Command::Run {
            repo,
            pr,
            commit,
            seed,
            resume,
            test_command,
            working_dir,
            timeout_sec,
            max_iterations,
            json,
        } => {
            let workspace_root =
                std::env::current_dir().wrap_err("failed to resolve working directory")?;
            let mut config = Config::load(cli.config.as_deref(), &workspace_root)
                .wrap_err("failed to load config")?;
            RunOverrides {
                test_command,
                working_dir,
                timeout_sec,
                max_iterations,
            }
            .apply(&mut config)?;
            config.resolve_paths(&workspace_root);
            debug!(config = ?config.redacted(), "effective config");

            let seed = seed.as_deref().map(read_state).transpose()?;
            let state = initial_state(seed, repo, pr, commit, resume);
            if !state.has_repo() {
                warn!("no --repo given; GitHub metadata and PR comments will be skipped");
            }

            let orchestrator = build_orchestrator(&config)?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .wrap_err("failed to create tokio runtime")?;
            let outcome = runtime.block_on(orchestrator.run(state));

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.state)?);
            } else {
                print_summary(&outcome);
            }

            std::process::exit(exit_code(&outcome));
        }
    }
}

fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let host = GithubClient::from_config(config).wrap_err("failed to build GitHub client")?;
    let tracker = LinearClient::from_config(config).wrap_err("failed to build Linear client")?;
    let summarizer =
        OpenAiSummarizer::from_config(config).wrap_err("failed to build model client")?;

    Ok(Orchestrator::new(
        Arc::new(host),
        Arc::new(tracker),
        Arc::new(summarizer),
        Arc::new(ShellExecutor::new()),
        OrchestratorConfig::from_config(config),
    ))
}

fn read_state(path: &Path) -> Result<RunState> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).wrap_err_with(|| format!("invalid run state in {}", path.display()))
}

/// Build the starting state from an optional seed and CLI overrides.
///
/// Unless `resume` is set, only the seed's repository, PR, commit and linked
/// issue carry over. An explicit `--pr` or `--commit` drops the seeded commit.
fn initial_state(
    seed: Option<RunState>,
    repo: Option<String>,
    pr: Option<u64>,
    commit: Option<String>,
    resume: bool,
) -> RunState {
    let mut state = seed.unwrap_or_default();
    if !resume {
        state.start_new_run();
    }
    if let Some(repo) = repo {
        state.repo = repo;
    }
    if pr.is_some() || commit.is_some() {
        state.clear_commit();
    }
    if let Some(pr) = pr {
        state.pr_number = Some(pr);
    }
    if let Some(sha) = commit {
        state.commit_sha = Some(sha);
    }
    state
}

/// 1 when tests failed, 2 when the iteration cap stopped the run, else 0.
fn exit_code(outcome: &RunOutcome) -> i32 {
    if outcome.state.test_status == TestStatus::Failed {
        1
    } else if outcome.termination == Termination::IterationCap {
        2
    } else {
        0
    }
}

fn print_summary(outcome: &RunOutcome) {
    let state = &outcome.state;
    println!("Repository:  {}", non_empty(&state.repo));
    if let Some(pr) = state.pr_number {
        println!("PR:          #{pr}");
    }
    println!("Commit:      {}", state.commit_ref());
    println!("Tests:       {}", state.test_status);
    println!(
        "Next action: {}",
        state.next_action.map_or("none", |a| a.as_str())
    );
    println!(
        "Iterations:  {} ({} test run(s), {})",
        outcome.iterations,
        outcome.test_runs,
        outcome.termination.as_str()
    );
    if let Some(url) = &state.linear_issue_url {
        let label = state.linear_issue_identifier.as_deref().unwrap_or("issue");
        println!("Issue:       {label} {url}");
    }
    if let Some(summary) = &state.summary {
        println!();
        println!("{summary}");
    }
}

fn non_empty(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}
