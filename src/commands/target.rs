use clap::{Args, Subcommand};
use serde::Serialize;

use sitedeploy::config::{self, RemoteConfig, SiteConfig};
use sitedeploy::error::Error;
use sitedeploy::keychain;

use super::{CmdResult, GlobalArgs};

#[derive(Subcommand)]
pub enum TargetCommand {
    /// Show the current deploy target configuration
    Show,
    /// Create or update the deploy target configuration
    Set(SetArgs),
    /// Store the remote password in the OS keychain
    SetPassword(SetPasswordArgs),
    /// Remove the stored remote password from the OS keychain
    DeletePassword,
}

#[derive(Args)]
pub struct SetArgs {
    #[arg(long)]
    pub site_dir: Option<String>,
    #[arg(long)]
    pub build_command: Option<String>,
    #[arg(long)]
    pub branch: Option<String>,
    #[arg(long)]
    pub git_remote: Option<String>,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub user: Option<String>,
    #[arg(long)]
    pub remote_path: Option<String>,
}

#[derive(Args)]
pub struct SetPasswordArgs {
    /// Password value to store
    #[arg(long)]
    pub password: String,
}

#[derive(Serialize)]
pub struct TargetOutput {
    pub command: String,
    #[serde(flatten)]
    pub config: SiteConfig,
}

#[derive(Serialize)]
pub struct PasswordOutput {
    pub command: String,
    pub user: String,
    pub host: String,
    pub stored: bool,
}

pub enum TargetResult {
    Config(TargetOutput),
    Password(PasswordOutput),
}

impl Serialize for TargetResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TargetResult::Config(output) => output.serialize(serializer),
            TargetResult::Password(output) => output.serialize(serializer),
        }
    }
}

pub fn run(command: TargetCommand, global: &GlobalArgs) -> CmdResult<TargetResult> {
    match command {
        TargetCommand::Show => show(global),
        TargetCommand::Set(args) => set(args, global),
        TargetCommand::SetPassword(args) => set_password(args, global),
        TargetCommand::DeletePassword => delete_password(global),
    }
}

fn show(global: &GlobalArgs) -> CmdResult<TargetResult> {
    let config = config::load(&global.config_path())?;
    Ok((
        TargetResult::Config(TargetOutput {
            command: "target.show".to_string(),
            config,
        }),
        0,
    ))
}

fn set(args: SetArgs, global: &GlobalArgs) -> CmdResult<TargetResult> {
    let path = global.config_path();
    let mut config = config::load(&path).unwrap_or_else(|_| empty_config());

    if let Some(v) = args.site_dir {
        config.site_dir = v;
    }
    if let Some(v) = args.build_command {
        config.build_command = v;
    }
    if let Some(v) = args.branch {
        config.branch = v;
    }
    if let Some(v) = args.git_remote {
        config.git_remote = v;
    }
    if let Some(v) = args.host {
        config.remote.host = v;
    }
    if let Some(v) = args.port {
        config.remote.port = v;
    }
    if let Some(v) = args.user {
        config.remote.user = v;
    }
    if let Some(v) = args.remote_path {
        config.remote.remote_path = v;
    }

    if !config.is_valid() {
        return Err(Error::Config(
            "Target requires --site-dir, --host, --user, and --remote-path".to_string(),
        ));
    }

    config::save(&path, &config)?;
    Ok((
        TargetResult::Config(TargetOutput {
            command: "target.set".to_string(),
            config,
        }),
        0,
    ))
}

fn set_password(args: SetPasswordArgs, global: &GlobalArgs) -> CmdResult<TargetResult> {
    let config = config::load(&global.config_path())?;
    keychain::store(&config.remote.user, &config.remote.host, &args.password)?;
    Ok((
        TargetResult::Password(PasswordOutput {
            command: "target.set_password".to_string(),
            user: config.remote.user,
            host: config.remote.host,
            stored: true,
        }),
        0,
    ))
}

fn delete_password(global: &GlobalArgs) -> CmdResult<TargetResult> {
    let config = config::load(&global.config_path())?;
    keychain::delete(&config.remote.user, &config.remote.host)?;
    Ok((
        TargetResult::Password(PasswordOutput {
            command: "target.delete_password".to_string(),
            user: config.remote.user,
            host: config.remote.host,
            stored: false,
        }),
        0,
    ))
}

fn empty_config() -> SiteConfig {
    SiteConfig {
        site_dir: String::new(),
        build_command: "npm run build".to_string(),
        branch: "main".to_string(),
        git_remote: "origin".to_string(),
        remote: RemoteConfig {
            host: String::new(),
            port: 22,
            user: String::new(),
            remote_path: String::new(),
        },
    }
}
