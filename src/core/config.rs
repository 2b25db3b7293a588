//! Site configuration loaded from `sitedeploy.json`.
//!
//! The credential is never part of the file: it is resolved per run from the
//! environment or the OS keychain.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::keychain;
use crate::pipeline::DeploySettings;
use crate::remote::RemoteTarget;

pub const DEFAULT_CONFIG_FILE: &str = "sitedeploy.json";
pub const PASSWORD_ENV_VAR: &str = "SITEDEPLOY_PASSWORD";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    /// Root of the site working copy; build and git commands run here.
    pub site_dir: String,
    #[serde(default = "default_build_command")]
    pub build_command: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_git_remote")]
    pub git_remote: String,
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    pub remote_path: String,
}

fn default_build_command() -> String {
    "npm run build".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_git_remote() -> String {
    "origin".to_string()
}

fn default_port() -> u16 {
    22
}

impl SiteConfig {
    pub fn is_valid(&self) -> bool {
        !self.site_dir.is_empty()
            && !self.remote.host.is_empty()
            && !self.remote.user.is_empty()
            && !self.remote.remote_path.is_empty()
    }

    /// Site directory with `~` expanded.
    pub fn resolved_site_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.site_dir).to_string())
    }

    /// Resolve the credential and assemble immutable settings for one run.
    pub fn into_settings(self) -> Result<DeploySettings> {
        if !self.is_valid() {
            return Err(Error::Config(
                "siteDir, remote.host, remote.user, and remote.remotePath are required".to_string(),
            ));
        }

        let password = resolve_password(&self.remote.user, &self.remote.host)?;
        let site_dir = self.resolved_site_dir();
        if !site_dir.is_dir() {
            return Err(Error::Config(format!(
                "Site directory does not exist: {}",
                site_dir.display()
            )));
        }

        Ok(DeploySettings {
            site_dir,
            build_command: self.build_command,
            git_remote: self.git_remote,
            branch: self.branch,
            target: RemoteTarget {
                host: self.remote.host,
                port: self.remote.port,
                user: self.remote.user,
                password,
                remote_path: self.remote.remote_path,
            },
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        })
    }
}

pub fn load(path: &Path) -> Result<SiteConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Cannot read {}: {}", path.display(), e))
    })?;
    let config: SiteConfig = serde_json::from_str(&content)?;
    Ok(config)
}

pub fn save(path: &Path, config: &SiteConfig) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content + "\n")?;
    Ok(())
}

/// Resolve the SSH password for a target: environment variable first, then
/// the OS keychain.
pub fn resolve_password(user: &str, host: &str) -> Result<String> {
    if let Ok(value) = std::env::var(PASSWORD_ENV_VAR) {
        if !value.is_empty() {
            return Ok(value);
        }
    }

    if let Some(value) = keychain::get(user, host)? {
        return Ok(value);
    }

    Err(Error::Config(format!(
        "No credential for {}@{}. Set {} or store one with: sitedeploy target set-password",
        user, host, PASSWORD_ENV_VAR
    )))
}
