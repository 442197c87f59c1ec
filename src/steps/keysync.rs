//! Authorized-key synchronizer
//!
//! Copies the cluster-wide authorized_keys file from the shared
//! provisioning mount over the host's own (overwrite, never merge: a
//! re-run always reflects the latest shared copy), registers a recurring
//! cron job repeating the copy, and logs which keys the host now accepts.

use crate::error::{ProvisionError, Result};
use crate::host::{HostContext, PROVISION_MOUNT};
use crate::keys::parse_authorized_keys;
use crate::pipeline::{PipelineState, Step, StepPolicy};
use crate::scheduler::{CronJob, CronTable, Schedule};

/// Cron job identifier for the recurring sync
pub const KEY_SYNC_JOB_ID: &str = "key-sync";

/// Minutes between re-syncs
const SYNC_INTERVAL_MINUTES: u32 = 5;

/// The key synchronization step
pub struct KeySyncStep;

impl KeySyncStep {
    pub fn new() -> Self {
        Self
    }

    /// On-host command the cron job repeats
    fn sync_command() -> String {
        format!(
            "cp {}/authorized_keys /root/.ssh/authorized_keys",
            PROVISION_MOUNT
        )
    }
}

impl Default for KeySyncStep {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for KeySyncStep {
    fn name(&self) -> &'static str {
        "key-sync"
    }

    fn policy(&self) -> StepPolicy {
        StepPolicy::BestEffort
    }

    fn summary(&self) -> String {
        "sync authorized keys from shared storage and schedule re-syncs".to_string()
    }

    fn completes(&self) -> PipelineState {
        PipelineState::KeysSynced
    }

    fn apply(&self, ctx: &HostContext) -> Result<()> {
        let source = ctx.paths.provision_dir().join("authorized_keys");
        let target = ctx.paths.authorized_keys();

        let contents = std::fs::read_to_string(&source).map_err(|e| {
            ProvisionError::KeySync(format!("cannot read {}: {}", source.display(), e))
        })?;

        let ssh_dir = target.parent().expect("authorized_keys has a parent");
        std::fs::create_dir_all(ssh_dir)?;
        std::fs::write(&target, &contents)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(ssh_dir, std::fs::Permissions::from_mode(0o700))?;
            std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o600))?;
        }

        // Operator-facing report of what the host now accepts
        let keys = parse_authorized_keys(&contents);
        tracing::info!("synced {} authorized key(s):", keys.len());
        for key in &keys {
            tracing::info!("  - {}", key.label());
        }

        let mut table = CronTable::load(ctx.executor.as_ref())?;
        table.upsert(&CronJob::new(
            KEY_SYNC_JOB_ID,
            Schedule::EveryMinutes(SYNC_INTERVAL_MINUTES),
            &Self::sync_command(),
        ));
        table.install(ctx.executor.as_ref())?;

        Ok(())
    }
}
