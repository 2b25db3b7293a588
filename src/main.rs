use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

mod commands;

use commands::{deploy, target, GlobalArgs};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "sitedeploy")]
#[command(version = VERSION)]
#[command(about = "One-command static site build, commit, and remote deployment")]
struct Cli {
    /// Path to the site configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the site, commit and push changes, then pull on the remote host
    Deploy(deploy::DeployArgs),
    /// Manage the deploy target configuration
    #[command(subcommand)]
    Target(target::TargetCommand),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs { config: cli.config };

    let exit_code = match cli.command {
        Commands::Deploy(args) => print_result(deploy::run(args, &global)),
        Commands::Target(command) => print_result(target::run(command, &global)),
    };

    ExitCode::from(exit_code)
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Print the command result as JSON on stdout and map it to an exit code.
/// Progress logs go to stderr; stdout carries only the result document.
fn print_result<T: Serialize>(result: commands::CmdResult<T>) -> u8 {
    match result {
        Ok((output, exit_code)) => {
            match serde_json::to_string_pretty(&output) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("Failed to serialize output: {}", e);
                    return 1;
                }
            }
            exit_code_to_u8(exit_code)
        }
        Err(err) => {
            let body = ErrorResponse {
                error: ErrorBody {
                    code: err.code(),
                    message: err.to_string(),
                },
            };
            match serde_json::to_string_pretty(&body) {
                Ok(json) => println!("{}", json),
                Err(_) => eprintln!("{}", err),
            }
            1
        }
    }
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
