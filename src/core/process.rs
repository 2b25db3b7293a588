//! Local process execution with consistent error handling.
//!
//! A non-zero exit code is not an error at this layer: it is captured in
//! [`CommandOutput`] for the caller to interpret. Only a process that cannot
//! be launched at all (missing executable, permission denied) produces
//! [`Error::Spawn`].

use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Error text for a failed command: stderr, falling back to stdout.
    pub fn error_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

/// Seam for executing local commands, so the pipeline can be driven by
/// scripted fakes in tests.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` in `dir`, capturing stdout and stderr.
    fn run(&self, program: &str, args: &[&str], dir: &Path) -> Result<CommandOutput>;

    /// Run a full shell command string in `dir`.
    ///
    /// Build commands need shell execution: they are configured as command
    /// strings ("npm run build", "sh build.sh && ...") and may use pipes,
    /// chaining, and environment expansion.
    fn run_shell(&self, command: &str, dir: &Path) -> Result<CommandOutput> {
        #[cfg(windows)]
        return self.run("cmd", &["/C", command], dir);

        #[cfg(not(windows))]
        return self.run("sh", &["-c", command], dir);
    }
}

/// Production runner backed by `std::process::Command`.
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], dir: &Path) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .current_dir(dir)
            .output()
            .map_err(|e| Error::spawn(program, &e))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}
