//! CLI interface for sshfan

use crate::credential::{Credential, PrivateKey};
use crate::dispatcher::run_batch;
use crate::error::SshFanError;
use crate::executors::local::LocalConnector;
use crate::executors::ssh::SshConnector;
use crate::logging::{init_logging, LogConfig};
use crate::models::*;
use crate::parser::{parse_commands_file, parse_hosts_file, parse_settings_file};
use anyhow::{anyhow, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// sshfan - run a list of commands on a list of hosts over SSH
#[derive(Parser, Debug)]
#[command(name = "sshfan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run a list of commands on a list of hosts over SSH", long_about = None)]
pub struct Cli {
    /// File with the list of servers, one per line [default: ./server_list.txt]
    #[arg(long = "srv", value_name = "FILE")]
    pub hosts_file: Option<PathBuf>,

    /// File with the list of commands to execute [default: ./commands_list.txt]
    #[arg(long = "cmd", value_name = "FILE")]
    pub commands_file: Option<PathBuf>,

    /// File with the private SSH key [default: ~/.ssh/id_rsa]
    #[arg(long, value_name = "FILE")]
    pub key: Option<PathBuf>,

    /// Username to connect as [default: $USER]
    #[arg(short, long)]
    pub user: Option<String>,

    /// SSH port for hosts listed without one [default: 22]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Capacity of the result buffer [default: 100]
    #[arg(long, value_name = "N")]
    pub buffer: Option<usize>,

    /// TCP connect timeout in seconds [default: 10]
    #[arg(long, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// YAML settings file; command-line flags take precedence
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run commands with the local shell instead of connecting to the hosts
    #[arg(long)]
    pub local: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Log format (pretty or json)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl Cli {
    /// Initialize logging based on CLI arguments
    pub fn init_logging(&self) -> anyhow::Result<()> {
        let config = LogConfig {
            level: self.log_level.as_str().into(),
            format: self.log_format.as_str().into(),
        };

        init_logging(&config)
    }

    /// Merge command-line flags over the settings file
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let file = match &self.config {
            Some(path) => parse_settings_file(path)
                .with_context(|| format!("Failed to load settings from {:?}", path))?,
            None => Settings::default(),
        };

        let flags = Settings {
            user: self.user.clone(),
            key: self.key.clone(),
            hosts_file: self.hosts_file.clone(),
            commands_file: self.commands_file.clone(),
            port: self.port,
            result_buffer: self.buffer,
            connect_timeout: self.connect_timeout,
        };

        Ok(flags.or(file))
    }

    /// Load lists and key, failing before any host is contacted
    pub fn load_run_config(&self) -> anyhow::Result<RunConfig> {
        build_run_config(self.settings()?, |name| std::env::var(name).ok())
            .map_err(abort_context)
    }

    /// Run the batch and print results to stdout
    pub async fn execute(&self) -> anyhow::Result<()> {
        let config = Arc::new(self.load_run_config()?);
        let start = Instant::now();

        let summary = if self.local {
            info!("Running commands locally");
            run_batch(config.clone(), Arc::new(LocalConnector::new()), std::io::stdout()).await?
        } else {
            run_batch(config.clone(), Arc::new(SshConnector::new()), std::io::stdout()).await?
        };

        let expected = config.hosts.len() * config.commands.len();
        if summary.records < expected {
            warn!(
                "{} of {} commands produced no result, see errors above",
                expected - summary.records,
                expected
            );
        }
        info!(
            hosts = summary.hosts_completed,
            results = summary.records,
            elapsed = ?start.elapsed(),
            "Batch finished"
        );

        Ok(())
    }
}

/// Mark setup errors that stop the run before any worker is launched
fn abort_context(err: anyhow::Error) -> anyhow::Error {
    match err.downcast_ref::<SshFanError>() {
        Some(e) if e.is_fatal() => err.context("Aborting before any host is contacted"),
        _ => err,
    }
}

/// Resolve settings into a run configuration.
///
/// `env` looks up environment variables for the default user and key path.
fn build_run_config<F>(settings: Settings, env: F) -> anyhow::Result<RunConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let port = settings.port.unwrap_or(DEFAULT_SSH_PORT);
    if port == 0 {
        return Err(anyhow!("Port must not be 0"));
    }
    let result_buffer = settings.result_buffer.unwrap_or(DEFAULT_RESULT_BUFFER);
    if result_buffer == 0 {
        return Err(anyhow!("Result buffer must be at least 1"));
    }

    let hosts_file = settings
        .hosts_file
        .unwrap_or_else(|| PathBuf::from(DEFAULT_HOSTS_FILE));
    let commands_file = settings
        .commands_file
        .unwrap_or_else(|| PathBuf::from(DEFAULT_COMMANDS_FILE));

    let hosts = parse_hosts_file(&hosts_file, port)?;
    let commands = parse_commands_file(&commands_file)?;
    info!(
        "Loaded {} hosts from {:?} and {} commands from {:?}",
        hosts.len(),
        hosts_file,
        commands.len(),
        commands_file
    );

    let user = match settings.user {
        Some(user) => user,
        None => env("USER")
            .or_else(|| env("LOGNAME"))
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow!("Cannot determine username, pass one with --user"))?,
    };

    let key_path = match settings.key {
        Some(path) => path,
        None => env("HOME")
            .map(|home| PathBuf::from(home).join(".ssh").join("id_rsa"))
            .ok_or_else(|| anyhow!("Cannot locate default key, pass one with --key"))?,
    };
    let key = PrivateKey::from_file(&key_path)?;
    info!(
        "Using {:?} key {:?} for user {}",
        key.format(),
        key_path,
        user
    );

    let connect_timeout = Duration::from_secs(
        settings
            .connect_timeout
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
    );

    Ok(
        RunConfig::new(hosts, commands, Credential::new(user, key))
            .with_result_buffer(result_buffer)
            .with_connect_timeout(connect_timeout),
    )
}
