//! Fetch step: seeds the run with commit and changed-file metadata.

use ciboss_core::text::truncate_chars;
use ciboss_core::RunState;
use tracing::{info, warn};

use crate::github::CodeHost;

/// Populate `commit_sha`, `changed_files` and `commit_message` from the
/// code host.
///
/// Never fails: a call that returns nothing leaves the matching field as it
/// was. On return `commit_sha` is always set, falling back to the sentinel,
/// unless `repo` was empty, in which case the state is left untouched.
pub async fn fetch_step(state: &mut RunState, host: &dyn CodeHost) {
    if !state.has_repo() {
        warn!("no repository specified, skipping fetch");
        return;
    }

    if !host.is_configured() {
        warn!("GITHUB_TOKEN not set, using placeholder commit data");
        state.ensure_commit_sha();
        return;
    }

    let repo = state.repo.clone();
    let pr_number = state.pr_number;

    if let Some(pr) = pr_number {
        if state.commit_sha.as_deref().is_none_or(str::is_empty) {
            if let Some(details) = host.fetch_pr_details(&repo, pr).await {
                if !details.head_sha.is_empty() {
                    info!(
                        pr,
                        sha = %truncate_chars(&details.head_sha, 8),
                        "resolved head commit from pull request"
                    );
                    state.commit_sha = Some(details.head_sha);
                }
            }
        }
    }

    let commit_sha = state.commit_sha.clone().filter(|sha| !sha.is_empty());

    let mut changed_files = None;
    if let Some(pr) = pr_number {
        changed_files = host
            .fetch_pr_files(&repo, pr)
            .await
            .filter(|files| !files.is_empty());
        if let Some(files) = &changed_files {
            info!(pr, count = files.len(), "fetched changed files from pull request");
        }
    }

    if changed_files.is_none() {
        if let Some(sha) = &commit_sha {
            changed_files = host
                .fetch_commit_files(&repo, sha)
                .await
                .filter(|files| !files.is_empty());
            if let Some(files) = &changed_files {
                info!(
                    sha = %truncate_chars(sha, 8),
                    count = files.len(),
                    "fetched changed files from commit"
                );
            }
        }
    }

    if let Some(files) = changed_files {
        state.changed_files = files;
    }

    if state.commit_message.is_none() {
        if let Some(sha) = &commit_sha {
            if let Some(details) = host.fetch_commit_details(&repo, sha).await {
                if !details.message.is_empty() {
                    state.set_commit_message(&details.message);
                }
            }
        }
    }

    state.ensure_commit_sha();
}
