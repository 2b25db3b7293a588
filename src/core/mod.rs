// Public modules
pub mod config;
pub mod error;
pub mod git;
pub mod keychain;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod remote;

// Re-export common types for convenience
pub use error::{Error, Result};
pub use pipeline::{DeployPipeline, DeployRequest, PipelineOutcome, Step, StepResult};
pub use process::{CommandOutput, CommandRunner, SystemRunner};
pub use progress::{ProgressEvent, ProgressSink, Severity, Subscription};
pub use remote::{RemoteConnector, RemoteSession, RemoteTarget, SshConnector};
