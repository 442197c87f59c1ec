//! Authorized-key parsing and reporting
//!
//! Used by the key-sync step to pretty-print which keys a host accepts
//! after a sync. Parsing is deliberately lenient: unrecognized lines are
//! skipped rather than failing the sync.

use crate::error::{ProvisionError, Result};
use base64::Engine;
use sha2::{Digest, Sha256};

/// One entry of an `authorized_keys` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedKey {
    /// Key type, e.g. `ssh-ed25519`
    pub key_type: String,
    /// Base64-encoded key blob
    pub data: String,
    /// Free-text comment, usually `user@host`
    pub comment: Option<String>,
}

impl AuthorizedKey {
    /// Parse a single authorized_keys line
    ///
    /// Returns `None` for blank lines, comments, and lines without at
    /// least a type and key blob.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let mut parts = line.split_whitespace();
        let key_type = parts.next()?.to_string();
        let data = parts.next()?.to_string();
        let comment = {
            let rest = parts.collect::<Vec<_>>().join(" ");
            if rest.is_empty() { None } else { Some(rest) }
        };

        Some(Self {
            key_type,
            data,
            comment,
        })
    }

    /// OpenSSH-style fingerprint: unpadded base64 of the SHA-256 of the
    /// decoded key blob
    pub fn fingerprint(&self) -> Result<String> {
        let blob = base64::engine::general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| ProvisionError::KeySync(format!("invalid key data: {}", e)))?;

        let digest = Sha256::digest(&blob);
        let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(digest);
        Ok(format!("SHA256:{}", encoded))
    }

    /// Operator-facing label: the comment, or type + fingerprint without one
    pub fn label(&self) -> String {
        match &self.comment {
            Some(comment) => comment.clone(),
            None => match self.fingerprint() {
                Ok(fp) => format!("{} {}", self.key_type, fp),
                Err(_) => format!("{} <unparseable key>", self.key_type),
            },
        }
    }
}

/// Parse every recognizable key entry in an authorized_keys file
pub fn parse_authorized_keys(contents: &str) -> Vec<AuthorizedKey> {
    contents.lines().filter_map(AuthorizedKey::parse).collect()
}
