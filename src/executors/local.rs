//! Local shell backend
//!
//! Runs each command with `/bin/sh -c` on this machine instead of a remote
//! host. The host label is exported to the command as `SSHFAN_HOST`, so a
//! command list can be rehearsed against a host list without touching the
//! network. Connecting always succeeds.

use crate::credential::Credential;
use crate::error::{SshFanError, Result};
use crate::executors::{exit_message, Connector, RemoteConnection, RemoteSession};
use crate::models::HostTarget;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const SHELL: &str = "/bin/sh";

/// Connector that runs commands locally
#[derive(Debug, Clone, Default)]
pub struct LocalConnector;

impl LocalConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for LocalConnector {
    type Connection = LocalConnection;

    async fn connect(
        &self,
        target: &HostTarget,
        _credential: &Credential,
        _connect_timeout: Duration,
    ) -> Result<LocalConnection> {
        debug!(host = %target, "Local connection opened");
        Ok(LocalConnection {
            host: target.label.clone(),
        })
    }
}

/// Stand-in connection for one host label
#[derive(Debug)]
pub struct LocalConnection {
    host: String,
}

#[async_trait]
impl RemoteConnection for LocalConnection {
    type Session = LocalSession;

    async fn open_session(&mut self) -> Result<LocalSession> {
        Ok(LocalSession {
            host: self.host.clone(),
        })
    }

    async fn close(self) {
        debug!(host = %self.host, "Local connection closed");
    }
}

/// One local shell invocation
#[derive(Debug)]
pub struct LocalSession {
    host: String,
}

#[async_trait]
impl RemoteSession for LocalSession {
    async fn output(self, command: &str) -> Result<String> {
        debug!(host = %self.host, "Executing local command: {}", command);

        let output = Command::new(SHELL)
            .arg("-c")
            .arg(command)
            .env("SSHFAN_HOST", &self.host)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SshFanError::Command {
                host: self.host.clone(),
                command: command.to_string(),
                exit_code: None,
                message: format!("Failed to spawn shell: {}", e),
            })?;

        if !output.status.success() {
            // Killed by a signal has no exit code
            let exit_code = output.status.code().unwrap_or(-1);
            return Err(SshFanError::Command {
                host: self.host,
                command: command.to_string(),
                exit_code: output.status.code(),
                message: exit_message(exit_code, &output.stderr),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
