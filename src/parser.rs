//! Parsers for host lists, command lists and the settings file

use crate::error::{SshFanError, Result};
use crate::models::*;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Split newline-delimited list content into entries.
///
/// Every non-blank line is an entry, including a final line that has no
/// trailing newline. Surrounding whitespace and a trailing `\r` are
/// stripped, and blank lines are skipped. Empty content yields an empty
/// list.
///
/// # Example
///
/// ```
/// use sshfan::parser::parse_list;
///
/// let entries = parse_list("web1\nweb2\n\nweb3");
/// assert_eq!(entries, vec!["web1", "web2", "web3"]);
/// ```
pub fn parse_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read and split a list file.
///
/// # Errors
///
/// * `SshFanError::ListRead` - If the file cannot be read
/// * `SshFanError::ListTooLarge` - If the file exceeds `MAX_LIST_FILE_SIZE`
pub fn parse_list_file<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let read_err = |source| SshFanError::ListRead {
        path: path.to_path_buf(),
        source,
    };

    let size = fs::metadata(path).map_err(read_err)?.len();
    if size > MAX_LIST_FILE_SIZE {
        return Err(SshFanError::ListTooLarge {
            path: path.to_path_buf(),
            size,
            limit: MAX_LIST_FILE_SIZE,
        });
    }

    let content = fs::read_to_string(path).map_err(read_err)?;
    let entries = parse_list(&content);
    if entries.is_empty() {
        warn!("List file {:?} has no entries", path);
    }

    Ok(entries)
}

/// Parse one host list entry.
///
/// `host:port` with exactly one colon overrides `default_port`; any other
/// entry (including bare IPv6 addresses) is taken as the hostname. The
/// entry itself, as written, becomes the target's label.
pub fn parse_host(entry: &str, default_port: u16) -> Result<HostTarget> {
    let mut parts = entry.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(port), None) => {
            if name.is_empty() {
                return Err(SshFanError::InvalidHost(format!(
                    "'{}' has an empty hostname",
                    entry
                )));
            }
            let port = port
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| {
                    SshFanError::InvalidHost(format!("'{}' has an invalid port", entry))
                })?;
            Ok(HostTarget::new(name, port).with_label(entry))
        }
        _ => Ok(HostTarget::new(entry, default_port)),
    }
}

/// Parse host list content into targets, preserving order and duplicates
pub fn parse_hosts(content: &str, default_port: u16) -> Result<Vec<HostTarget>> {
    parse_list(content)
        .iter()
        .map(|entry| parse_host(entry, default_port))
        .collect()
}

/// Read a host list file
pub fn parse_hosts_file<P: AsRef<Path>>(path: P, default_port: u16) -> Result<Vec<HostTarget>> {
    parse_list_file(path)?
        .iter()
        .map(|entry| parse_host(entry, default_port))
        .collect()
}

/// Read a command list file
pub fn parse_commands_file<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    parse_list_file(path)
}

/// Parse a YAML settings file
pub fn parse_settings_file<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let content = fs::read_to_string(path)?;
    parse_settings_yaml(&content)
}

/// Parse YAML settings content.
///
/// # Example
///
/// ```
/// use sshfan::parser::parse_settings_yaml;
///
/// let settings = parse_settings_yaml("user: deploy\nport: 2222\n")?;
/// assert_eq!(settings.user.as_deref(), Some("deploy"));
/// # Ok::<(), sshfan::error::SshFanError>(())
/// ```
pub fn parse_settings_yaml(content: &str) -> Result<Settings> {
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }

    let settings: Settings = serde_yaml::from_str(content)?;
    validate_settings(&settings)?;
    Ok(settings)
}

fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.result_buffer == Some(0) {
        return Err(SshFanError::Settings(
            "result_buffer must be at least 1".to_string(),
        ));
    }
    if settings.port == Some(0) {
        return Err(SshFanError::Settings("port must not be 0".to_string()));
    }
    if let Some(user) = &settings.user {
        if user.trim().is_empty() {
            return Err(SshFanError::Settings("user cannot be empty".to_string()));
        }
    }
    Ok(())
}
