//! rocoprov - RocoCloud Swarm worker provisioner
//!
//! rocoprov turns a bare Linux host into a worker node of a RocoCloud
//! Docker Swarm cluster. It runs a fixed, strictly sequential pipeline of
//! idempotent provisioning steps:
//!
//! - Hostname normalization (one-time snapshot + derived FQDN)
//! - Package installation (fail2ban, NFS client/server, Docker engine)
//! - Security hardening (fail2ban jail for SSH, key-only SSH login)
//! - Container runtime verification (the sole gating check)
//! - Boot-time swarm join scheduling (one-shot, self-deleting)
//! - Persistent NFS storage mounts
//! - Authorized-key synchronization from shared storage
//! - Final reboot
//!
//! Each step declares whether its failure is fatal or best-effort; only a
//! missing configuration or an absent container runtime halts the run.

pub mod config;
pub mod error;
pub mod exec;
pub mod host;
pub mod keys;
pub mod pipeline;
pub mod scheduler;
pub mod steps;

pub use error::{ProvisionError, Result};
