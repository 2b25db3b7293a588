//! Remote command execution over an authenticated SSH session.
//!
//! The transport has no visibility into the semantics of the remote command:
//! `exec` returns combined output text and the caller decides whether that
//! text indicates a logical failure.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use ssh2::Session;

use crate::error::{Error, Result};

/// Connection details for the deploy target host.
///
/// Read-only for the lifetime of a run. The password is resolved at run
/// start (environment variable or keychain) and never persisted; see
/// `config::resolve_password`.
#[derive(Debug, Clone)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub remote_path: String,
}

impl RemoteTarget {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Seam for opening remote sessions, so the pipeline can be driven by
/// scripted fakes in tests.
pub trait RemoteConnector: Send + Sync {
    fn connect(&self, target: &RemoteTarget, timeout: Duration) -> Result<Box<dyn RemoteSession>>;
}

/// A single authenticated connection. `close` must be safe to call on every
/// exit path, including after a failed `exec`.
pub trait RemoteSession: Send {
    /// Execute one shell command and block until the remote process
    /// terminates, returning combined output text.
    fn exec(&mut self, command: &str) -> Result<String>;

    /// Release the connection. Idempotent.
    fn close(&mut self);
}

/// Connector backed by libssh2 with password authentication.
///
/// The connect-phase timeout covers TCP establishment; no timeout governs
/// command execution itself.
pub struct SshConnector;

impl RemoteConnector for SshConnector {
    fn connect(&self, target: &RemoteTarget, timeout: Duration) -> Result<Box<dyn RemoteSession>> {
        let addr = target
            .address()
            .to_socket_addrs()
            .map_err(|e| Error::Connection(format!("Cannot resolve {}: {}", target.host, e)))?
            .next()
            .ok_or_else(|| {
                Error::Connection(format!("No addresses found for {}", target.host))
            })?;

        let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| {
            Error::Connection(format!("Cannot reach {}: {}", target.address(), e))
        })?;

        let mut session = Session::new()
            .map_err(|e| Error::Connection(format!("SSH session init failed: {}", e)))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| Error::Connection(format!("SSH handshake failed: {}", e)))?;
        session
            .userauth_password(&target.user, &target.password)
            .map_err(|e| {
                Error::Connection(format!(
                    "Authentication failed for {}@{}: {}",
                    target.user, target.host, e
                ))
            })?;

        Ok(Box::new(SshSession {
            session: Some(session),
        }))
    }
}

struct SshSession {
    session: Option<Session>,
}

impl RemoteSession for SshSession {
    fn exec(&mut self, command: &str) -> Result<String> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| Error::Connection("Session already closed".to_string()))?;

        let mut channel = session
            .channel_session()
            .map_err(|e| Error::Connection(format!("Cannot open channel: {}", e)))?;
        channel
            .exec(command)
            .map_err(|e| Error::Connection(format!("Cannot execute remote command: {}", e)))?;

        let mut output = String::new();
        channel
            .read_to_string(&mut output)
            .map_err(|e| Error::Connection(format!("Failed to read remote output: {}", e)))?;

        // Deploy commands redirect stderr with `2>&1`, but drain the stderr
        // stream as well so nothing is lost when they don't.
        let mut stderr = String::new();
        if channel.stderr().read_to_string(&mut stderr).is_ok() && !stderr.is_empty() {
            output.push_str(&stderr);
        }

        let _ = channel.wait_close();
        Ok(output)
    }

    fn close(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.disconnect(None, "deploy finished", None);
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        self.close();
    }
}
