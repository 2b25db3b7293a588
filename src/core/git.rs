//! Git operations used by the deploy pipeline.
//!
//! All helpers surface the command's exit code and output in
//! [`CommandOutput`]; the pipeline decides what counts as a step failure.
//! Only spawn failures propagate as errors.

use std::path::Path;

use crate::error::Result;
use crate::process::{CommandOutput, CommandRunner};

/// Stage every change in the working tree (`git add -A`).
pub fn stage_all(runner: &dyn CommandRunner, dir: &Path) -> Result<CommandOutput> {
    runner.run("git", &["add", "-A"], dir)
}

/// Check whether the working tree has staged changes to commit.
///
/// Empty `git status --porcelain` output means a clean tree. A failed status
/// command is reported as pending changes so the pipeline attempts the commit
/// and surfaces the real git error there.
pub fn has_pending_changes(runner: &dyn CommandRunner, dir: &Path) -> Result<bool> {
    let output = runner.run("git", &["status", "--porcelain"], dir)?;
    if !output.success {
        return Ok(true);
    }
    Ok(!output.stdout.trim().is_empty())
}

/// Commit staged changes with the given message.
pub fn commit(runner: &dyn CommandRunner, dir: &Path, message: &str) -> Result<CommandOutput> {
    runner.run("git", &["commit", "-m", message], dir)
}

/// Push the branch to the configured remote.
pub fn push(
    runner: &dyn CommandRunner,
    dir: &Path,
    remote: &str,
    branch: &str,
) -> Result<CommandOutput> {
    runner.run("git", &["push", remote, branch], dir)
}
