//! The deploy pipeline: Build -> Commit -> Push -> RemoteSync.
//!
//! One run executes on a dedicated worker thread and reports through the
//! [`ProgressSink`]; the caller stays free to drain events or accept input.
//! Steps run serially and fail fast: a failing step aborts the rest of the
//! run with no rollback of earlier steps. At most one run is active per
//! pipeline instance at a time.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::git;
use crate::process::CommandRunner;
use crate::progress::{ProgressEvent, ProgressSink, Severity, Subscription};
use crate::remote::{RemoteConnector, RemoteTarget};
use crate::utils::shell;

/// Input for a single deploy run.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    commit_message: String,
}

impl DeployRequest {
    /// Rejects empty or whitespace-only commit messages before any step runs.
    pub fn new(commit_message: &str) -> Result<Self> {
        let trimmed = commit_message.trim();
        if trimmed.is_empty() {
            return Err(Error::EmptyCommitMessage);
        }
        Ok(Self {
            commit_message: trimmed.to_string(),
        })
    }

    pub fn commit_message(&self) -> &str {
        &self.commit_message
    }
}

/// One stage of the four-stage deploy sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Build,
    Commit,
    Push,
    RemoteSync,
}

impl Step {
    pub const ALL: [Step; 4] = [Step::Build, Step::Commit, Step::Push, Step::RemoteSync];

    pub fn label(self) -> &'static str {
        match self {
            Step::Build => "Build",
            Step::Commit => "Commit",
            Step::Push => "Push",
            Step::RemoteSync => "Remote sync",
        }
    }

    fn banner(self) -> String {
        let position = Step::ALL.iter().position(|s| *s == self).unwrap_or(0) + 1;
        format!("Step {}/{}: {}", position, Step::ALL.len(), self.label())
    }
}

/// Result of one executed step, consumed by the pipeline to decide
/// continuation.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step: Step,
    pub succeeded: bool,
    /// Short human-readable summary for successful steps.
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    fn ok(step: Step, output: impl Into<String>) -> Self {
        Self {
            step,
            succeeded: true,
            output: output.into(),
            error: None,
        }
    }

    fn failed(step: Step, error: impl Into<String>) -> Self {
        Self {
            step,
            succeeded: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Terminal value of a run. Immutable once the run ends.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Where the state machine currently is. `Idle` is both the initial state
/// and the state after any terminal outcome; the last outcome is retained
/// separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployPhase {
    Idle,
    Building,
    Committing,
    Pushing,
    SyncingRemote,
}

/// Immutable per-pipeline settings, supplied once at construction.
#[derive(Debug, Clone)]
pub struct DeploySettings {
    pub site_dir: PathBuf,
    pub build_command: String,
    pub git_remote: String,
    pub branch: String,
    pub target: RemoteTarget,
    pub connect_timeout: Duration,
}

struct PipelineState {
    phase: DeployPhase,
    last_outcome: Option<PipelineOutcome>,
}

struct Inner {
    settings: DeploySettings,
    runner: Arc<dyn CommandRunner>,
    connector: Arc<dyn RemoteConnector>,
    sink: ProgressSink,
    state: Mutex<PipelineState>,
}

/// Sequential, fail-fast deploy orchestrator.
#[derive(Clone)]
pub struct DeployPipeline {
    inner: Arc<Inner>,
}

/// Handle to an in-flight run.
pub struct RunHandle {
    handle: JoinHandle<PipelineOutcome>,
}

impl RunHandle {
    /// Block until the run reaches a terminal state.
    pub fn wait(self) -> PipelineOutcome {
        self.handle.join().unwrap_or_else(|_| PipelineOutcome {
            success: false,
            failed_step: None,
            error: Some("Deploy worker panicked".to_string()),
        })
    }
}

impl DeployPipeline {
    pub fn new(
        settings: DeploySettings,
        runner: Arc<dyn CommandRunner>,
        connector: Arc<dyn RemoteConnector>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                runner,
                connector,
                sink: ProgressSink::new(),
                state: Mutex::new(PipelineState {
                    phase: DeployPhase::Idle,
                    last_outcome: None,
                }),
            }),
        }
    }

    /// Subscribe to progress events from the point of subscription onward.
    pub fn subscribe(&self) -> Subscription {
        self.inner.sink.subscribe()
    }

    pub fn phase(&self) -> DeployPhase {
        self.inner.state.lock().unwrap().phase
    }

    /// Outcome of the most recently finished run, if any.
    pub fn last_outcome(&self) -> Option<PipelineOutcome> {
        self.inner.state.lock().unwrap().last_outcome.clone()
    }

    /// Start a run on a dedicated worker thread.
    ///
    /// Rejects with [`Error::AlreadyRunning`] unless the pipeline is idle;
    /// the in-flight run is left untouched. The transition out of `Idle`
    /// happens under the state lock, so two concurrent callers cannot both
    /// start a run.
    pub fn run(&self, request: DeployRequest) -> Result<RunHandle> {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.phase != DeployPhase::Idle {
                return Err(Error::AlreadyRunning);
            }
            state.phase = DeployPhase::Building;
        }

        let inner = Arc::clone(&self.inner);
        let handle = thread::spawn(move || inner.execute(request));
        Ok(RunHandle { handle })
    }
}

impl Inner {
    fn execute(&self, request: DeployRequest) -> PipelineOutcome {
        let outcome = match self.run_steps(&request) {
            Ok(()) => PipelineOutcome {
                success: true,
                failed_step: None,
                error: None,
            },
            Err((step, err)) => {
                self.sink
                    .emit(ProgressEvent::log(Severity::Error, err.to_string()));
                PipelineOutcome {
                    success: false,
                    failed_step: Some(step),
                    error: Some(err.to_string()),
                }
            }
        };

        let summary = if outcome.success {
            let target = &self.settings.target;
            format!(
                "Site published to {}@{}:{}",
                target.user, target.host, target.remote_path
            )
        } else {
            outcome.error.clone().unwrap_or_default()
        };
        self.sink.emit(ProgressEvent::Completed {
            success: outcome.success,
            summary,
        });

        // Terminal state: retain the outcome, reset to Idle for the next run
        let mut state = self.state.lock().unwrap();
        state.last_outcome = Some(outcome.clone());
        state.phase = DeployPhase::Idle;
        outcome
    }

    fn run_steps(&self, request: &DeployRequest) -> std::result::Result<(), (Step, Error)> {
        self.finish(self.build_step())?;
        self.finish(self.commit_step(request.commit_message()))?;
        self.finish(self.push_step())?;
        self.finish(self.remote_sync_step())?;
        Ok(())
    }

    /// Emit the success log for a completed step, or convert a failed step
    /// into the typed error that aborts the run.
    fn finish(
        &self,
        result: std::result::Result<StepResult, (Step, Error)>,
    ) -> std::result::Result<(), (Step, Error)> {
        let result = result?;
        if result.succeeded {
            if !result.output.is_empty() {
                self.sink
                    .emit(ProgressEvent::log(Severity::Success, result.output));
            }
            return Ok(());
        }

        let detail = result.error.unwrap_or_default();
        let err = match result.step {
            Step::Build => Error::Build(detail),
            Step::Commit => Error::Commit(detail),
            Step::Push => Error::Push(detail),
            Step::RemoteSync => Error::RemoteSync(detail),
        };
        Err((result.step, err))
    }

    fn enter(&self, phase: DeployPhase, step: Step) {
        self.state.lock().unwrap().phase = phase;
        self.sink.emit(ProgressEvent::status(step.banner()));
    }

    fn build_step(&self) -> std::result::Result<StepResult, (Step, Error)> {
        self.enter(DeployPhase::Building, Step::Build);

        let output = self
            .runner
            .run_shell(&self.settings.build_command, &self.settings.site_dir)
            .map_err(|e| (Step::Build, e))?;

        if !output.success {
            return Ok(StepResult::failed(
                Step::Build,
                build_failure_detail(&self.settings.build_command, output.exit_code, output.error_text()),
            ));
        }

        Ok(StepResult::ok(Step::Build, "Build completed"))
    }

    fn commit_step(&self, message: &str) -> std::result::Result<StepResult, (Step, Error)> {
        self.enter(DeployPhase::Committing, Step::Commit);
        let dir = &self.settings.site_dir;
        let runner = self.runner.as_ref();

        let staged = git::stage_all(runner, dir).map_err(|e| (Step::Commit, e))?;
        if !staged.success {
            return Ok(StepResult::failed(
                Step::Commit,
                format!("git add failed: {}", staged.error_text()),
            ));
        }

        // A clean working tree is not an error: skip the commit and proceed
        // to push, which may push no new commits.
        if !git::has_pending_changes(runner, dir).map_err(|e| (Step::Commit, e))? {
            self.sink.emit(ProgressEvent::log(
                Severity::Info,
                "Nothing to commit; working tree clean",
            ));
            return Ok(StepResult::ok(Step::Commit, ""));
        }

        let committed = git::commit(runner, dir, message).map_err(|e| (Step::Commit, e))?;
        if !committed.success {
            return Ok(StepResult::failed(
                Step::Commit,
                format!("git commit failed: {}", committed.error_text()),
            ));
        }

        Ok(StepResult::ok(
            Step::Commit,
            format!("Committed \"{}\"", message),
        ))
    }

    fn push_step(&self) -> std::result::Result<StepResult, (Step, Error)> {
        self.enter(DeployPhase::Pushing, Step::Push);

        let pushed = git::push(
            self.runner.as_ref(),
            &self.settings.site_dir,
            &self.settings.git_remote,
            &self.settings.branch,
        )
        .map_err(|e| (Step::Push, e))?;

        if !pushed.success {
            return Ok(StepResult::failed(
                Step::Push,
                format!("git push failed: {}", pushed.error_text()),
            ));
        }

        Ok(StepResult::ok(
            Step::Push,
            format!(
                "Pushed to {}/{}",
                self.settings.git_remote, self.settings.branch
            ),
        ))
    }

    fn remote_sync_step(&self) -> std::result::Result<StepResult, (Step, Error)> {
        self.enter(DeployPhase::SyncingRemote, Step::RemoteSync);
        let target = &self.settings.target;

        let mut session = self
            .connector
            .connect(target, self.settings.connect_timeout)
            .map_err(|e| (Step::RemoteSync, e))?;
        self.sink.emit(ProgressEvent::log(
            Severity::Info,
            format!("Connected to {}@{}", target.user, target.host),
        ));

        let command = format!(
            "cd {} && git pull {} {} 2>&1",
            shell::quote_path(&target.remote_path),
            shell::quote_arg(&self.settings.git_remote),
            shell::quote_arg(&self.settings.branch),
        );
        let result = session.exec(&command);

        // The single connection is owned by this step and released on every
        // exit path before the state machine moves on.
        session.close();

        let output = result.map_err(|e| (Step::RemoteSync, e))?;
        let trimmed = output.trim();
        if !trimmed.is_empty() {
            self.sink
                .emit(ProgressEvent::log(Severity::Info, trimmed.to_string()));
        }

        if remote_output_indicates_failure(&output) {
            return Ok(StepResult::failed(
                Step::RemoteSync,
                format!("Remote pull reported an error: {}", trimmed),
            ));
        }

        Ok(StepResult::ok(Step::RemoteSync, "Remote sync completed"))
    }
}

/// Lexical success/failure check for the remote pull: the remote exit status
/// is not visible, so the combined output is scanned case-insensitively for
/// "error" or "fatal".
pub fn remote_output_indicates_failure(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("error") || lower.contains("fatal")
}

/// Build failure message with the tail of the build output for context.
fn build_failure_detail(command: &str, exit_code: i32, output: &str) -> String {
    let tail: Vec<&str> = output.lines().rev().take(15).collect();
    let tail: String = tail.into_iter().rev().collect::<Vec<_>>().join("\n");

    let mut msg = format!("'{}' exited with code {}", command, exit_code);
    if !tail.is_empty() {
        msg.push_str("\n");
        msg.push_str(&tail);
    }
    msg
}
