use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sitedeploy::error::{Error, Result};
use sitedeploy::pipeline::{DeployPhase, DeployPipeline, DeployRequest, DeploySettings, Step};
use sitedeploy::process::{CommandOutput, CommandRunner};
use sitedeploy::progress::{ProgressEvent, Subscription};
use sitedeploy::remote::{RemoteConnector, RemoteSession, RemoteTarget};

// === Fakes ===

/// Scripted local command runner. Git commands are keyed on their first
/// argument; the build command goes through `run_shell`.
#[derive(Default)]
struct FakeRunner {
    build_exit: i32,
    build_stderr: String,
    build_spawn_error: bool,
    status_stdout: String,
    commit_exit: i32,
    push_exit: i32,
    push_stderr: String,
    calls: Mutex<Vec<String>>,
    /// When set, the build blocks until the sender side releases it.
    build_gate: Mutex<Option<Receiver<()>>>,
}

impl FakeRunner {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn gated(self) -> (Self, Sender<()>) {
        let (tx, rx) = channel();
        *self.build_gate.lock().unwrap() = Some(rx);
        (self, tx)
    }
}

fn exit_output(exit_code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        success: exit_code == 0,
        exit_code,
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, program: &str, args: &[&str], _dir: &Path) -> Result<CommandOutput> {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().map(|a| a.to_string()));
        self.calls.lock().unwrap().push(call.join(" "));

        match (program, args.first().copied()) {
            ("git", Some("add")) => Ok(exit_output(0, "", "")),
            ("git", Some("status")) => Ok(exit_output(0, &self.status_stdout, "")),
            ("git", Some("commit")) => Ok(exit_output(self.commit_exit, "", "commit rejected")),
            ("git", Some("push")) => Ok(exit_output(self.push_exit, "", &self.push_stderr)),
            _ => Ok(exit_output(0, "", "")),
        }
    }

    fn run_shell(&self, command: &str, _dir: &Path) -> Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("shell {}", command));

        if let Some(gate) = self.build_gate.lock().unwrap().take() {
            let _ = gate.recv();
        }

        if self.build_spawn_error {
            return Err(Error::Spawn {
                command: command.to_string(),
                detail: "No such file or directory".to_string(),
            });
        }
        Ok(exit_output(self.build_exit, "", &self.build_stderr))
    }
}

/// Scripted remote connector. Counts `close` calls and records executed
/// commands.
struct FakeConnector {
    connect_error: Option<String>,
    exec_output: String,
    closes: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl FakeConnector {
    fn with_output(output: &str) -> Self {
        Self {
            connect_error: None,
            exec_output: output.to_string(),
            closes: Arc::new(AtomicUsize::new(0)),
            commands: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            connect_error: Some(message.to_string()),
            exec_output: String::new(),
            closes: Arc::new(AtomicUsize::new(0)),
            commands: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

struct FakeSession {
    output: String,
    closes: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl RemoteConnector for FakeConnector {
    fn connect(&self, _target: &RemoteTarget, _timeout: Duration) -> Result<Box<dyn RemoteSession>> {
        if let Some(message) = &self.connect_error {
            return Err(Error::Connection(message.clone()));
        }
        Ok(Box::new(FakeSession {
            output: self.exec_output.clone(),
            closes: Arc::clone(&self.closes),
            commands: Arc::clone(&self.commands),
        }))
    }
}

impl RemoteSession for FakeSession {
    fn exec(&mut self, command: &str) -> Result<String> {
        self.commands.lock().unwrap().push(command.to_string());
        Ok(self.output.clone())
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// === Helpers ===

fn settings() -> DeploySettings {
    DeploySettings {
        site_dir: PathBuf::from("/tmp"),
        build_command: "npm run build".to_string(),
        git_remote: "origin".to_string(),
        branch: "main".to_string(),
        target: RemoteTarget {
            host: "example.com".to_string(),
            port: 22,
            user: "deploy".to_string(),
            password: "secret".to_string(),
            remote_path: "/home/deploy/public_html".to_string(),
        },
        connect_timeout: Duration::from_secs(5),
    }
}

fn drain(subscription: &Subscription) -> Vec<ProgressEvent> {
    std::iter::from_fn(|| subscription.try_recv()).collect()
}

fn status_texts(events: &[ProgressEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::StatusChange { text } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

// === Tests ===

#[test]
fn successful_run_emits_one_status_per_step_in_order() {
    let runner = FakeRunner {
        status_stdout: " M index.html\n".to_string(),
        ..FakeRunner::default()
    };
    let connector = FakeConnector::with_output("Already up to date.\n");
    let closes = Arc::clone(&connector.closes);

    let pipeline = DeployPipeline::new(settings(), Arc::new(runner), Arc::new(connector));
    let subscription = pipeline.subscribe();

    let request = DeployRequest::new("Site update").unwrap();
    let outcome = pipeline.run(request).unwrap().wait();

    assert!(outcome.success);
    assert_eq!(outcome.failed_step, None);

    let events = drain(&subscription);
    assert_eq!(
        status_texts(&events),
        vec![
            "Step 1/4: Build",
            "Step 2/4: Commit",
            "Step 3/4: Push",
            "Step 4/4: Remote sync",
        ]
    );
    match events.last() {
        Some(ProgressEvent::Completed { success, summary }) => {
            assert!(*success);
            assert!(summary.contains("deploy@example.com"));
        }
        other => panic!("expected Completed as final event, got {:?}", other),
    }

    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(pipeline.last_outcome().unwrap().success);
}

#[test]
fn build_failure_stops_before_any_git_command() {
    let runner = Arc::new(FakeRunner {
        build_exit: 1,
        build_stderr: "Module not found: ./missing.css".to_string(),
        ..FakeRunner::default()
    });
    let connector = FakeConnector::with_output("");
    let closes = Arc::clone(&connector.closes);

    let pipeline = DeployPipeline::new(settings(), Arc::<FakeRunner>::clone(&runner), Arc::new(connector));
    let subscription = pipeline.subscribe();

    let outcome = pipeline
        .run(DeployRequest::new("Site update").unwrap())
        .unwrap()
        .wait();

    assert!(!outcome.success);
    assert_eq!(outcome.failed_step, Some(Step::Build));
    assert!(outcome.error.unwrap().contains("Module not found"));

    // Fail-fast: no git command ever ran, no session was opened
    assert!(runner.calls().iter().all(|c| !c.starts_with("git")));
    assert_eq!(closes.load(Ordering::SeqCst), 0);

    let events = drain(&subscription);
    assert_eq!(status_texts(&events), vec!["Step 1/4: Build"]);
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::Completed { success: false, .. })
    ));
}

#[test]
fn build_spawn_error_fails_the_build_step() {
    let runner = FakeRunner {
        build_spawn_error: true,
        ..FakeRunner::default()
    };
    let pipeline = DeployPipeline::new(
        settings(),
        Arc::new(runner),
        Arc::new(FakeConnector::with_output("")),
    );

    let outcome = pipeline
        .run(DeployRequest::new("Site update").unwrap())
        .unwrap()
        .wait();

    assert!(!outcome.success);
    assert_eq!(outcome.failed_step, Some(Step::Build));
    assert!(outcome.error.unwrap().contains("Failed to launch"));
}

#[test]
fn clean_tree_skips_commit_but_still_pushes() {
    let runner = Arc::new(FakeRunner::default()); // empty porcelain output
    let connector = FakeConnector::with_output("Already up to date.\n");

    let pipeline = DeployPipeline::new(settings(), Arc::<FakeRunner>::clone(&runner), Arc::new(connector));
    let subscription = pipeline.subscribe();

    let outcome = pipeline
        .run(DeployRequest::new("Site update").unwrap())
        .unwrap()
        .wait();

    assert!(outcome.success);

    let calls = runner.calls();
    assert!(calls.iter().all(|c| !c.starts_with("git commit")));
    assert!(calls.iter().any(|c| c == "git push origin main"));

    let events = drain(&subscription);
    assert!(events.iter().any(|e| matches!(
        e,
        ProgressEvent::LogLine { text, .. } if text.contains("Nothing to commit")
    )));
}

#[test]
fn dirty_tree_commits_with_the_request_message() {
    let runner = Arc::new(FakeRunner {
        status_stdout: " M index.html\n".to_string(),
        ..FakeRunner::default()
    });
    let connector = FakeConnector::with_output("ok\n");

    let pipeline = DeployPipeline::new(settings(), Arc::<FakeRunner>::clone(&runner), Arc::new(connector));
    let outcome = pipeline
        .run(DeployRequest::new("Refresh landing page").unwrap())
        .unwrap()
        .wait();

    assert!(outcome.success);
    assert!(runner
        .calls()
        .iter()
        .any(|c| c == "git commit -m Refresh landing page"));
}

#[test]
fn push_failure_stops_before_remote_sync() {
    let runner = FakeRunner {
        push_exit: 1,
        push_stderr: "remote: permission denied".to_string(),
        ..FakeRunner::default()
    };
    let connector = FakeConnector::with_output("");
    let closes = Arc::clone(&connector.closes);

    let pipeline = DeployPipeline::new(settings(), Arc::new(runner), Arc::new(connector));
    let outcome = pipeline
        .run(DeployRequest::new("Site update").unwrap())
        .unwrap()
        .wait();

    assert!(!outcome.success);
    assert_eq!(outcome.failed_step, Some(Step::Push));
    assert!(outcome.error.unwrap().contains("permission denied"));
    assert_eq!(closes.load(Ordering::SeqCst), 0);
}

#[test]
fn remote_sync_runs_pull_in_the_remote_path() {
    let runner = FakeRunner::default();
    let connector = FakeConnector::with_output("Updating 3c1f2a..9e8d7b\nFast-forward\n");
    let commands = Arc::clone(&connector.commands);

    let pipeline = DeployPipeline::new(settings(), Arc::new(runner), Arc::new(connector));
    let outcome = pipeline
        .run(DeployRequest::new("Site update").unwrap())
        .unwrap()
        .wait();

    assert!(outcome.success);
    assert_eq!(
        commands.lock().unwrap().as_slice(),
        ["cd '/home/deploy/public_html' && git pull origin main 2>&1"]
    );
}

#[test]
fn fatal_marker_in_remote_output_fails_even_with_clean_exit() {
    let runner = FakeRunner::default();
    let connector =
        FakeConnector::with_output("Fatal: could not read from remote repository.\n");
    let closes = Arc::clone(&connector.closes);

    let pipeline = DeployPipeline::new(settings(), Arc::new(runner), Arc::new(connector));
    let subscription = pipeline.subscribe();

    let outcome = pipeline
        .run(DeployRequest::new("Site update").unwrap())
        .unwrap()
        .wait();

    assert!(!outcome.success);
    assert_eq!(outcome.failed_step, Some(Step::RemoteSync));

    // The session is still released exactly once on the failure path
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    let events = drain(&subscription);
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::Completed { success: false, .. })
    ));
}

#[test]
fn connection_error_fails_the_run_without_a_session() {
    let runner = FakeRunner::default();
    let connector = FakeConnector::failing("Authentication failed for deploy@example.com");
    let closes = Arc::clone(&connector.closes);

    let pipeline = DeployPipeline::new(settings(), Arc::new(runner), Arc::new(connector));
    let outcome = pipeline
        .run(DeployRequest::new("Site update").unwrap())
        .unwrap()
        .wait();

    assert!(!outcome.success);
    assert_eq!(outcome.failed_step, Some(Step::RemoteSync));
    assert!(outcome.error.unwrap().contains("Authentication failed"));
    assert_eq!(closes.load(Ordering::SeqCst), 0);
}

#[test]
fn overlapping_run_is_rejected_and_leaves_the_first_untouched() {
    let (runner, gate) = FakeRunner {
        status_stdout: " M index.html\n".to_string(),
        ..FakeRunner::default()
    }
    .gated();
    let connector = FakeConnector::with_output("ok\n");

    let pipeline = DeployPipeline::new(settings(), Arc::new(runner), Arc::new(connector));

    let first = pipeline
        .run(DeployRequest::new("First deploy").unwrap())
        .unwrap();

    // The worker is parked inside the build step; a second run must be
    // rejected without emitting anything or disturbing the first.
    let rejected = pipeline.run(DeployRequest::new("Second deploy").unwrap());
    assert!(matches!(rejected, Err(Error::AlreadyRunning)));

    gate.send(()).unwrap();
    let outcome = first.wait();
    assert!(outcome.success);

    // After the terminal state the pipeline is idle again and accepts a run
    assert_eq!(pipeline.phase(), DeployPhase::Idle);
    let second = pipeline
        .run(DeployRequest::new("Second deploy").unwrap())
        .unwrap();
    assert!(second.wait().success);
}

#[test]
fn empty_commit_message_is_rejected_before_any_step() {
    let runner = Arc::new(FakeRunner::default());
    let pipeline = DeployPipeline::new(
        settings(),
        Arc::<FakeRunner>::clone(&runner),
        Arc::new(FakeConnector::with_output("")),
    );
    let subscription = pipeline.subscribe();

    let request = DeployRequest::new("   ");
    assert!(matches!(request, Err(Error::EmptyCommitMessage)));

    // Nothing ran and nothing was emitted
    assert!(runner.calls().is_empty());
    assert!(drain(&subscription).is_empty());
    assert!(pipeline.last_outcome().is_none());
}
