//! Core data models for sshfan

use crate::credential::Credential;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_RESULT_BUFFER: usize = 100;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HOSTS_FILE: &str = "./server_list.txt";
pub const DEFAULT_COMMANDS_FILE: &str = "./commands_list.txt";
pub const MAX_LIST_FILE_SIZE: u64 = 1_048_576; // 1 MB

/// A host to run the command batch against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTarget {
    /// Hostname or address to connect to
    pub name: String,
    pub port: u16,
    /// Host list entry as written, used in result blocks and diagnostics
    pub label: String,
}

impl HostTarget {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            port,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// `host:port` form used to open the TCP connection
    pub fn address(&self) -> String {
        format!("{}:{}", self.name, self.port)
    }
}

impl fmt::Display for HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Ordered commands shared read-only by every host worker
pub type CommandList = Arc<[String]>;

/// Immutable run configuration, built once and handed to the dispatcher
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub hosts: Vec<HostTarget>,
    pub commands: CommandList,
    pub credential: Arc<Credential>,
    /// Capacity of the result channel
    pub result_buffer: usize,
    /// Applies to the TCP connect only
    pub connect_timeout: Duration,
}

impl RunConfig {
    pub fn new(hosts: Vec<HostTarget>, commands: Vec<String>, credential: Credential) -> Self {
        Self {
            hosts,
            commands: commands.into(),
            credential: Arc::new(credential),
            result_buffer: DEFAULT_RESULT_BUFFER,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    pub fn with_result_buffer(mut self, result_buffer: usize) -> Self {
        self.result_buffer = result_buffer.max(1);
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

/// Captured stdout of one successful command on one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub host: String,
    pub output: String,
}

impl fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:\n{}", self.host, self.output)
    }
}

/// Sent exactly once per host worker, after all of its result records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionSignal;

/// Optional settings file contents; every field falls back to CLI or defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<PathBuf>, // Path to SSH private key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosts_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commands_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_buffer: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>, // seconds
}

impl Settings {
    /// Fill unset fields from `fallback`
    pub fn or(self, fallback: Settings) -> Settings {
        Settings {
            user: self.user.or(fallback.user),
            key: self.key.or(fallback.key),
            hosts_file: self.hosts_file.or(fallback.hosts_file),
            commands_file: self.commands_file.or(fallback.commands_file),
            port: self.port.or(fallback.port),
            result_buffer: self.result_buffer.or(fallback.result_buffer),
            connect_timeout: self.connect_timeout.or(fallback.connect_timeout),
        }
    }
}
