use std::sync::Arc;

use clap::Args;
use serde::Serialize;

use sitedeploy::log_status;
use sitedeploy::pipeline::{DeployPipeline, DeployRequest, PipelineOutcome};
use sitedeploy::progress::{ProgressEvent, Severity};
use sitedeploy::{config, SshConnector, SystemRunner};

use super::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct DeployArgs {
    /// Commit message describing the changes
    #[arg(short, long, default_value = "Site update")]
    pub message: String,
}

#[derive(Serialize)]
pub struct DeployOutput {
    pub command: String,
    #[serde(flatten)]
    pub outcome: PipelineOutcome,
}

pub fn run(args: DeployArgs, global: &GlobalArgs) -> CmdResult<DeployOutput> {
    let site_config = config::load(&global.config_path())?;
    let settings = site_config.into_settings()?;
    let request = DeployRequest::new(&args.message)?;

    let pipeline = DeployPipeline::new(settings, Arc::new(SystemRunner), Arc::new(SshConnector));

    // Subscribe before starting so no event is missed, then drain on this
    // thread while the worker runs.
    let events = pipeline.subscribe();
    let handle = pipeline.run(request)?;

    for event in events {
        let done = matches!(event, ProgressEvent::Completed { .. });
        render(&event);
        if done {
            break;
        }
    }

    let outcome = handle.wait();
    let exit_code = if outcome.success { 0 } else { 1 };

    Ok((
        DeployOutput {
            command: "deploy.run".to_string(),
            outcome,
        },
        exit_code,
    ))
}

fn render(event: &ProgressEvent) {
    match event {
        ProgressEvent::StatusChange { text } => {
            log_status!("deploy", "--- {} ---", text);
        }
        ProgressEvent::LogLine { text, severity } => match severity {
            Severity::Error => log_status!("deploy", "error: {}", text),
            Severity::Warning => log_status!("deploy", "warning: {}", text),
            _ => log_status!("deploy", "{}", text),
        },
        ProgressEvent::Completed { success, summary } => {
            if *success {
                log_status!("deploy", "{}", summary);
            } else {
                log_status!("deploy", "Deploy failed: {}", summary);
            }
        }
    }
}
