//! Private key loading and validation
//!
//! Keys are validated up front so that a bad key fails the run before any
//! host is contacted. Only unencrypted keys are accepted, in either the
//! OpenSSH format or one of the PEM formats OpenSSL understands.

use crate::error::{SshFanError, Result};
use openssl::pkey::PKey;
use std::fmt;
use std::fs;
use std::path::Path;

const OPENSSH_LABEL: &str = "OPENSSH PRIVATE KEY";
const PEM_LABELS: &[&str] = &[
    "PRIVATE KEY",
    "RSA PRIVATE KEY",
    "EC PRIVATE KEY",
    "DSA PRIVATE KEY",
];

/// A parsed, unencrypted private key in its original text encoding
#[derive(Clone)]
pub struct PrivateKey {
    pem: String,
    format: KeyFormat,
}

/// Encoding of a private key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    OpenSsh,
    Pem,
}

impl PrivateKey {
    /// Read and parse a private key file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read(path).map_err(|source| SshFanError::KeyRead {
            path: path.to_path_buf(),
            source,
        })?;
        let text = String::from_utf8(raw)
            .map_err(|_| SshFanError::KeyParse("key file is not valid UTF-8 text".to_string()))?;
        Self::parse(&text)
    }

    /// Parse an armored private key
    pub fn parse(text: &str) -> Result<Self> {
        let armor = Armor::read(text)?;
        let text = text.trim();

        let format = if armor.label == OPENSSH_LABEL {
            let key = ssh_key::PrivateKey::from_openssh(text)
                .map_err(|e| SshFanError::KeyParse(format!("invalid OpenSSH key: {}", e)))?;
            if key.is_encrypted() {
                return Err(SshFanError::KeyParse(
                    "passphrase-protected keys are not supported".to_string(),
                ));
            }
            KeyFormat::OpenSsh
        } else if armor.label == "ENCRYPTED PRIVATE KEY" || armor.encrypted {
            return Err(SshFanError::KeyParse(
                "passphrase-protected keys are not supported".to_string(),
            ));
        } else if PEM_LABELS.contains(&armor.label.as_str()) {
            PKey::private_key_from_pem(text.as_bytes())
                .map_err(|e| SshFanError::KeyParse(format!("invalid {}: {}", armor.label, e)))?;
            KeyFormat::Pem
        } else {
            return Err(SshFanError::KeyParse(format!(
                "unsupported key type '{}'",
                armor.label
            )));
        };

        Ok(Self {
            pem: text.to_string(),
            format,
        })
    }

    pub fn format(&self) -> KeyFormat {
        self.format
    }

    /// Armored key text, as handed to the SSH library
    pub fn as_pem(&self) -> &str {
        &self.pem
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("format", &self.format)
            .field("pem", &"<redacted>")
            .finish()
    }
}

/// Authentication identity shared by every host worker
#[derive(Debug, Clone)]
pub struct Credential {
    pub user: String,
    pub key: PrivateKey,
}

impl Credential {
    pub fn new(user: impl Into<String>, key: PrivateKey) -> Self {
        Self {
            user: user.into(),
            key,
        }
    }
}

/// PEM-style armor: label and encryption header
struct Armor {
    label: String,
    encrypted: bool,
}

impl Armor {
    fn read(text: &str) -> Result<Self> {
        let mut lines = text.lines().map(str::trim).skip_while(|l| l.is_empty());

        let label = lines
            .next()
            .and_then(|l| l.strip_prefix("-----BEGIN "))
            .and_then(|l| l.strip_suffix("-----"))
            .ok_or_else(|| SshFanError::KeyParse("missing BEGIN line".to_string()))?
            .to_string();
        let end = format!("-----END {}-----", label);

        let mut encrypted = false;
        let mut terminated = false;
        for line in lines {
            if line == end {
                terminated = true;
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.trim() == "Proc-Type" && value.contains("ENCRYPTED") {
                    encrypted = true;
                }
            }
        }

        if !terminated {
            return Err(SshFanError::KeyParse(format!("missing END line for {}", label)));
        }

        Ok(Self { label, encrypted })
    }
}
