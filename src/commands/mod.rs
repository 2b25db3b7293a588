use std::path::PathBuf;

use sitedeploy::config;

pub mod deploy;
pub mod target;

/// Command output plus process exit code.
pub type CmdResult<T> = sitedeploy::Result<(T, i32)>;

pub struct GlobalArgs {
    /// `--config` override; defaults to `sitedeploy.json` in the working
    /// directory.
    pub config: Option<PathBuf>,
}

impl GlobalArgs {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_FILE))
    }
}
