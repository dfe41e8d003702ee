//! Error types for sshfan

use std::path::PathBuf;
use thiserror::Error;

/// sshfan error types
#[derive(Error, Debug)]
pub enum SshFanError {
    /// Host or command list could not be read
    #[error("Failed to read list file {path:?}: {source}")]
    ListRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// List file exceeded size limit
    #[error("List file {path:?} is {size} bytes, exceeds limit of {limit}")]
    ListTooLarge {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    /// Malformed host list entry
    #[error("Invalid host entry: {0}")]
    InvalidHost(String),

    /// Settings validation errors
    #[error("Invalid settings: {0}")]
    Settings(String),

    /// YAML parsing errors
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// Private key could not be read
    #[error("Failed to read private key {path:?}: {source}")]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Private key could not be parsed
    #[error("Failed to parse private key: {0}")]
    KeyParse(String),

    /// Connection to a host failed (TCP, handshake or authentication)
    #[error("Failed to connect to {host}: {message}")]
    Connect { host: String, message: String },

    /// Session could not be opened on an established connection
    #[error("Failed to establish session with {host}: {message}")]
    Session { host: String, message: String },

    /// Remote command failed
    #[error("Failed to run command '{command}' on host '{host}': {message}")]
    Command {
        host: String,
        command: String,
        exit_code: Option<i32>,
        message: String,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking task failed to complete
    #[error("Task join error: {0}")]
    Join(String),

    /// Generic error
    #[error("Error: {0}")]
    Other(String),
}

impl SshFanError {
    /// Errors that stop the whole run before any host is contacted
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SshFanError::ListRead { .. }
                | SshFanError::ListTooLarge { .. }
                | SshFanError::InvalidHost(_)
                | SshFanError::Settings(_)
                | SshFanError::YamlParse(_)
                | SshFanError::KeyRead { .. }
                | SshFanError::KeyParse(_)
        )
    }
}

/// Result type alias using SshFanError
pub type Result<T> = std::result::Result<T, SshFanError>;
