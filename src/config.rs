//! Provisioning configuration
//!
//! Loads the shell-sourced `key=value` settings file that a site operator
//! drops on the host before first boot. The loader is the only fatal
//! precondition of the pipeline: a missing file, an unreadable file, or an
//! empty required key aborts before any host mutation.

use crate::error::{ProvisionError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "swarm_config.conf";

/// NFS mount option profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountProfile {
    /// Resilient options for unattended hosts
    Full,
    /// Minimal options for interactive debugging
    Minimal,
}

impl MountProfile {
    /// The fstab option string for this profile
    pub fn options(&self) -> &'static str {
        match self {
            MountProfile::Full => "auto,nofail,noatime,nolock,intr,tcp,actimeo=1800",
            MountProfile::Minimal => "rw,user",
        }
    }
}

/// Provisioning settings, immutable once loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Swarm worker join token
    pub swarm_token: String,
    /// Address of the swarm manager to join
    pub swarm_ip_address: String,
    /// Address of the NFS storage server
    pub nfs_ip_address: String,
    /// Site location, used for the storage export and mount point
    pub location: String,
    /// Optional provisioning server exporting shared data (authorized keys)
    pub provisioning_server: Option<String>,
    /// Whether to harden sshd and install the fail2ban jail
    pub harden_ssh: bool,
    /// Whether to sync authorized keys from shared storage
    pub sync_keys: bool,
    /// NFS mount option profile
    pub mount_profile: MountProfile,
}

impl ProvisionConfig {
    /// Load and validate the configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProvisionError::ConfigMissing(path.to_path_buf())
            } else {
                ProvisionError::ConfigUnreadable(format!("{}: {}", path.display(), e))
            }
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration contents (shell-sourced `key=value` lines)
    pub fn parse(contents: &str) -> Result<Self> {
        let values = parse_assignments(contents);

        let swarm_token = require(&values, "swarm_token")?;
        let swarm_ip_address = require(&values, "swarm_ip_address")?;
        // Older site configs used storage_ip_address for the same setting
        let nfs_ip_address = match get(&values, "nfs_ip_address") {
            Some(v) => v,
            None => require(&values, "storage_ip_address")
                .map_err(|_| ProvisionError::ConfigIncomplete("nfs_ip_address".to_string()))?,
        };
        let location = require(&values, "location")?;

        let provisioning_server = get(&values, "provisioning_server");
        let harden_ssh = parse_bool(get(&values, "harden_ssh").as_deref(), true);
        let sync_keys = parse_bool(get(&values, "sync_keys").as_deref(), false);
        let mount_profile = match get(&values, "mount_profile").as_deref() {
            Some("minimal") => MountProfile::Minimal,
            _ => MountProfile::Full,
        };

        Ok(Self {
            swarm_token,
            swarm_ip_address,
            nfs_ip_address,
            location,
            provisioning_server,
            harden_ssh,
            sync_keys,
            mount_profile,
        })
    }
}

/// Parse `key=value` assignments, tolerating comments, blank lines,
/// `export ` prefixes and surrounding quotes
fn parse_assignments(contents: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line).trim();
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_string();
            let value = strip_quotes(value.trim()).to_string();
            values.insert(key, value);
        }
    }

    values
}

/// Strip one pair of matching surrounding quotes
fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Get a non-empty value
fn get(values: &HashMap<String, String>, key: &str) -> Option<String> {
    values.get(key).filter(|v| !v.is_empty()).cloned()
}

/// Get a required non-empty value
fn require(values: &HashMap<String, String>, key: &str) -> Result<String> {
    get(values, key).ok_or_else(|| ProvisionError::ConfigIncomplete(key.to_string()))
}

fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        None => default,
    }
}
