//! Error types for rocoprov

use std::path::PathBuf;
use thiserror::Error;

/// Result type for rocoprov operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

/// rocoprov error types
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Configuration file not found: {0}")]
    ConfigMissing(PathBuf),

    #[error("Configuration file unreadable: {0}")]
    ConfigUnreadable(String),

    #[error("Configuration incomplete: missing required key '{0}'")]
    ConfigIncomplete(String),

    #[error("Container runtime not installed: {0}")]
    RuntimeNotInstalled(String),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("Hostname error: {0}")]
    Hostname(String),

    #[error("Package error: {0}")]
    Package(String),

    #[error("Hardening error: {0}")]
    Hardening(String),

    #[error("Scheduling error: {0}")]
    Schedule(String),

    #[error("Mount error: {0}")]
    Mount(String),

    #[error("Key sync error: {0}")]
    KeySync(String),

    #[error("Reboot error: {0}")]
    Reboot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
