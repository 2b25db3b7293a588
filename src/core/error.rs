use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Commit message must not be empty")]
    EmptyCommitMessage,

    #[error("A deploy is already running")]
    AlreadyRunning,

    #[error("Failed to launch '{command}': {detail}")]
    Spawn { command: String, detail: String },

    #[error("Build failed: {0}")]
    Build(String),

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Push failed: {0}")]
    Push(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Remote sync failed: {0}")]
    RemoteSync(String),

    #[error("Keychain error: {0}")]
    Keychain(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn spawn(command: &str, err: &std::io::Error) -> Self {
        Error::Spawn {
            command: command.to_string(),
            detail: err.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::EmptyCommitMessage => "EMPTY_COMMIT_MESSAGE",
            Error::AlreadyRunning => "ALREADY_RUNNING",
            Error::Spawn { .. } => "PROCESS_SPAWN_ERROR",
            Error::Build(_) => "BUILD_ERROR",
            Error::Commit(_) => "COMMIT_ERROR",
            Error::Push(_) => "PUSH_ERROR",
            Error::Connection(_) => "CONNECTION_ERROR",
            Error::RemoteSync(_) => "REMOTE_SYNC_ERROR",
            Error::Keychain(_) => "KEYCHAIN_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "JSON_ERROR",
        }
    }
}
