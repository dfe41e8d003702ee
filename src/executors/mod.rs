//! Remote execution backends
//!
//! A [`Connector`] opens one [`RemoteConnection`] per host. Each command
//! runs in its own [`RemoteSession`], which is consumed by
//! [`RemoteSession::output`] so it cannot outlive the command.

pub mod local;
pub mod ssh;

use crate::credential::Credential;
use crate::error::Result;
use crate::models::HostTarget;
use async_trait::async_trait;
use std::time::Duration;

/// Opens connections to hosts
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: RemoteConnection;

    /// Connect and authenticate.
    ///
    /// `connect_timeout` bounds only the transport connect, never the
    /// commands run later on the connection.
    async fn connect(
        &self,
        target: &HostTarget,
        credential: &Credential,
        connect_timeout: Duration,
    ) -> Result<Self::Connection>;
}

/// An established, exclusively owned connection to one host
#[async_trait]
pub trait RemoteConnection: Send + 'static {
    type Session: RemoteSession;

    /// Open a fresh session for a single command
    async fn open_session(&mut self) -> Result<Self::Session>;

    /// Gracefully close the connection. Dropping also releases it.
    async fn close(self);
}

/// Execution context for exactly one command
#[async_trait]
pub trait RemoteSession: Send + 'static {
    /// Run `command`, wait for it to finish and return its stdout.
    ///
    /// A non-zero exit status is an error.
    async fn output(self, command: &str) -> Result<String>;
}

/// Run blocking work on the blocking thread pool
pub(crate) async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| crate::error::SshFanError::Join(e.to_string()))?
}

/// Shorten remote stderr for use in a one-line diagnostic
pub(crate) fn stderr_excerpt(stderr: &[u8]) -> Option<String> {
    const LIMIT: usize = 256;

    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let mut excerpt: String = text.chars().take(LIMIT).collect();
    if text.chars().count() > LIMIT {
        excerpt.push_str("...");
    }
    Some(excerpt.replace('\n', " | "))
}

/// Diagnostic message for a command that exited non-zero
pub(crate) fn exit_message(exit_code: i32, stderr: &[u8]) -> String {
    match stderr_excerpt(stderr) {
        Some(excerpt) => format!("Process exited with status {}: {}", exit_code, excerpt),
        None => format!("Process exited with status {}", exit_code),
    }
}
