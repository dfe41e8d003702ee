//! SSH backend built on libssh2
//!
//! One TCP connection per host, authenticated with the shared private key.
//! Every command gets its own exec channel on that connection. libssh2 is
//! synchronous, so each step runs on the blocking thread pool.
//!
//! Host keys are not verified; the server's SHA-256 host key hash is logged
//! at debug level.
//!
//! # Example
//!
//! ```no_run
//! use sshfan::credential::{Credential, PrivateKey};
//! use sshfan::executors::ssh::SshConnector;
//! use sshfan::executors::{Connector, RemoteConnection, RemoteSession};
//! use sshfan::models::HostTarget;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let key = PrivateKey::from_file("/home/deploy/.ssh/id_rsa")?;
//! let credential = Credential::new("deploy", key);
//! let target = HostTarget::new("example.com", 22);
//!
//! let mut conn = SshConnector::new()
//!     .connect(&target, &credential, Duration::from_secs(10))
//!     .await?;
//! let stdout = conn.open_session().await?.output("uptime").await?;
//! println!("{}", stdout);
//! conn.close().await;
//! # Ok(())
//! # }
//! ```

use crate::credential::Credential;
use crate::error::{SshFanError, Result};
use crate::executors::{blocking, exit_message, Connector, RemoteConnection, RemoteSession};
use crate::models::HostTarget;
use async_trait::async_trait;
use ssh2::{Channel, HashType, Session};
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info};

/// Connector for real SSH hosts
#[derive(Debug, Clone, Default)]
pub struct SshConnector;

impl SshConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Connection = SshConnection;

    async fn connect(
        &self,
        target: &HostTarget,
        credential: &Credential,
        connect_timeout: Duration,
    ) -> Result<SshConnection> {
        let target = target.clone();
        let credential = credential.clone();
        blocking(move || SshConnection::establish(&target, &credential, connect_timeout)).await
    }
}

/// Authenticated SSH connection to one host
pub struct SshConnection {
    host: String,
    session: Session,
}

impl SshConnection {
    fn establish(
        target: &HostTarget,
        credential: &Credential,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let host = target.label.clone();
        let connect_err = |message: String| SshFanError::Connect {
            host: host.clone(),
            message,
        };

        let tcp = connect_tcp(target, connect_timeout).map_err(&connect_err)?;

        let mut session =
            Session::new().map_err(|e| connect_err(format!("Failed to create SSH session: {}", e)))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| connect_err(format!("SSH handshake failed: {}", e)))?;

        if let Some(hash) = session.host_key_hash(HashType::Sha256) {
            debug!(host = %host, fingerprint = %hex::encode(hash), "Server host key");
        }

        session
            .userauth_pubkey_memory(&credential.user, None, credential.key.as_pem(), None)
            .map_err(|e| connect_err(format!("Authentication failed: {}", e)))?;

        if !session.authenticated() {
            return Err(connect_err("Authentication failed".to_string()));
        }

        info!(host = %host, user = %credential.user, "SSH connection established");

        Ok(Self { host, session })
    }
}

/// Resolve `target` and connect to the first address that accepts
fn connect_tcp(target: &HostTarget, connect_timeout: Duration) -> std::result::Result<TcpStream, String> {
    let addrs = target
        .address()
        .to_socket_addrs()
        .map_err(|e| format!("Failed to resolve {}: {}", target.address(), e))?;

    let mut last_error = None;
    for addr in addrs {
        debug!("Connecting to {}", addr);
        match TcpStream::connect_timeout(&addr, connect_timeout) {
            Ok(tcp) => return Ok(tcp),
            Err(e) => last_error = Some(format!("Failed to connect to {}: {}", addr, e)),
        }
    }

    Err(last_error.unwrap_or_else(|| format!("No addresses found for {}", target.address())))
}

#[async_trait]
impl RemoteConnection for SshConnection {
    type Session = SshSession;

    async fn open_session(&mut self) -> Result<SshSession> {
        let session = self.session.clone();
        let host = self.host.clone();

        blocking(move || {
            let channel = session.channel_session().map_err(|e| SshFanError::Session {
                host: host.clone(),
                message: format!("Failed to open channel: {}", e),
            })?;
            Ok(SshSession { host, channel })
        })
        .await
    }

    async fn close(self) {
        let SshConnection { host, session } = self;
        let result = blocking(move || {
            session
                .disconnect(None, "batch complete", None)
                .map_err(|e| SshFanError::Other(e.to_string()))
        })
        .await;

        match result {
            Ok(()) => debug!(host = %host, "SSH connection closed"),
            Err(e) => debug!(host = %host, "SSH disconnect failed: {}", e),
        }
    }
}

/// One exec channel on an SSH connection
pub struct SshSession {
    host: String,
    channel: Channel,
}

impl SshSession {
    fn run_blocking(mut self, command: &str) -> Result<String> {
        let command_err = |exit_code: Option<i32>, message: String| SshFanError::Command {
            host: self.host.clone(),
            command: command.to_string(),
            exit_code,
            message,
        };

        debug!(host = %self.host, "Executing command: {}", command);

        self.channel
            .exec(command)
            .map_err(|e| command_err(None, format!("Failed to execute command: {}", e)))?;

        let mut stdout = Vec::new();
        self.channel
            .read_to_end(&mut stdout)
            .map_err(|e| command_err(None, format!("Failed to read stdout: {}", e)))?;

        let mut stderr = Vec::new();
        self.channel
            .stderr()
            .read_to_end(&mut stderr)
            .map_err(|e| command_err(None, format!("Failed to read stderr: {}", e)))?;

        self.channel
            .wait_close()
            .map_err(|e| command_err(None, format!("Failed to close channel: {}", e)))?;

        let exit_code = self
            .channel
            .exit_status()
            .map_err(|e| command_err(None, format!("Failed to get exit status: {}", e)))?;

        if exit_code != 0 {
            return Err(command_err(Some(exit_code), exit_message(exit_code, &stderr)));
        }

        debug!(host = %self.host, bytes = stdout.len(), "Command succeeded");
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn output(self, command: &str) -> Result<String> {
        let command = command.to_string();
        blocking(move || self.run_blocking(&command)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::tests::generated_pem;
    use crate::credential::PrivateKey;
    use std::net::TcpListener;

    fn credential() -> Credential {
        Credential::new("test", PrivateKey::parse(&generated_pem()).unwrap())
    }

    #[tokio::test]
    async fn test_connect_unresolvable_host() {
        let target = HostTarget::new("nonexistent.invalid", 22);
        let result = SshConnector::new()
            .connect(&target, &credential(), Duration::from_secs(2))
            .await;

        match result {
            Err(SshFanError::Connect { host, .. }) => assert_eq!(host, "nonexistent.invalid"),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("connect should fail"),
        }
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Grab a free port, then close it
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let target = HostTarget::new("127.0.0.1", port);
        let result = SshConnector::new()
            .connect(&target, &credential(), Duration::from_secs(2))
            .await;

        assert!(matches!(result, Err(SshFanError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_handshake_failure_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        // Accept and immediately hang up without speaking SSH
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let target = HostTarget::new("127.0.0.1", port);
        let result = SshConnector::new()
            .connect(&target, &credential(), Duration::from_secs(2))
            .await;

        match result {
            Err(SshFanError::Connect { message, .. }) => {
                assert!(message.contains("handshake"), "got: {}", message)
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("handshake should fail"),
        }
        server.join().unwrap();
    }
}
