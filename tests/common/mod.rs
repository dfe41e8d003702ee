//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use openssl::ec::{EcGroup, EcKey};
use openssl::nid::Nid;
use openssl::pkey::PKey;
use sshfan::credential::{Credential, PrivateKey};
use sshfan::error::{Result, SshFanError};
use sshfan::executors::{Connector, RemoteConnection, RemoteSession};
use sshfan::models::{HostTarget, RunConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn credential() -> Credential {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();
    let pem = String::from_utf8(key.private_key_to_pem_pkcs8().unwrap()).unwrap();
    Credential::new("test", PrivateKey::parse(&pem).unwrap())
}

pub fn run_config(hosts: &[&str], commands: &[&str], buffer: usize) -> Arc<RunConfig> {
    Arc::new(
        RunConfig::new(
            hosts.iter().map(|h| HostTarget::new(*h, 22)).collect(),
            commands.iter().map(|c| c.to_string()).collect(),
            credential(),
        )
        .with_result_buffer(buffer),
    )
}

/// In-process stand-in for SSH.
///
/// Hosts named `down*` refuse connections, hosts named `flaky*` lose the
/// ability to open sessions after the first command, and the command
/// `false` fails everywhere. Every other command prints `<command>@<host>`.
#[derive(Default)]
pub struct FakeNetwork {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    /// Per-command delay, to shuffle interleaving across hosts
    pub jitter: bool,
}

pub struct FakeConnector(pub Arc<FakeNetwork>);

pub struct FakeConnection {
    net: Arc<FakeNetwork>,
    host: String,
    sessions: usize,
}

pub struct FakeSession {
    net: Arc<FakeNetwork>,
    host: String,
}

#[async_trait]
impl Connector for FakeConnector {
    type Connection = FakeConnection;

    async fn connect(
        &self,
        target: &HostTarget,
        _credential: &Credential,
        _connect_timeout: Duration,
    ) -> Result<FakeConnection> {
        if target.name.starts_with("down") {
            return Err(SshFanError::Connect {
                host: target.to_string(),
                message: "connection refused".to_string(),
            });
        }
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConnection {
            net: self.0.clone(),
            host: target.to_string(),
            sessions: 0,
        })
    }
}

#[async_trait]
impl RemoteConnection for FakeConnection {
    type Session = FakeSession;

    async fn open_session(&mut self) -> Result<FakeSession> {
        self.sessions += 1;
        if self.host.starts_with("flaky") && self.sessions > 1 {
            return Err(SshFanError::Session {
                host: self.host.clone(),
                message: "connection reset".to_string(),
            });
        }
        Ok(FakeSession {
            net: self.net.clone(),
            host: self.host.clone(),
        })
    }

    async fn close(self) {
        self.net.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn output(self, command: &str) -> Result<String> {
        if self.net.jitter {
            let micros = (self.host.len() * 37 + command.len() * 11) % 500;
            tokio::time::sleep(Duration::from_micros(micros as u64)).await;
        } else {
            tokio::task::yield_now().await;
        }

        if command == "false" {
            return Err(SshFanError::Command {
                host: self.host,
                command: command.to_string(),
                exit_code: Some(1),
                message: "Process exited with status 1".to_string(),
            });
        }
        Ok(format!("{}@{}\n", command, self.host))
    }
}

/// Split aggregator output into `(host, output)` blocks
pub fn blocks(text: &str) -> Vec<(String, String)> {
    text.split_terminator("\n\n")
        .map(|block| {
            let (host, output) = block.split_once(":\n").expect("block header");
            (host.to_string(), output.to_string())
        })
        .collect()
}
