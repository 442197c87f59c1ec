//! Hostname normalizer
//!
//! Snapshots the host's original name once into `/etc/hostname.init`,
//! then derives the cluster-facing FQDN `<original>.rococloud.me` and
//! writes it as the active hostname. The derived name always comes from
//! the snapshot, so re-running never stacks suffixes. No service restart:
//! the new identity takes effect with the final reboot.

use crate::error::{ProvisionError, Result};
use crate::host::{HostContext, HostPaths};
use crate::pipeline::{PipelineState, Step, StepPolicy};

/// Domain suffix appended to every provisioned host
pub const DOMAIN_SUFFIX: &str = "rococloud.me";

/// The hostname normalization step
pub struct HostnameStep;

impl HostnameStep {
    pub fn new() -> Self {
        Self
    }

    /// Read the hostname the machine booted with
    fn current_hostname(paths: &HostPaths) -> Result<String> {
        match std::fs::read_to_string(paths.hostname()) {
            Ok(contents) => Ok(contents.trim().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(gethostname::gethostname().to_string_lossy().trim().to_string())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for HostnameStep {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for HostnameStep {
    fn name(&self) -> &'static str {
        "hostname"
    }

    fn policy(&self) -> StepPolicy {
        StepPolicy::BestEffort
    }

    fn summary(&self) -> String {
        format!("snapshot original hostname and set <original>.{}", DOMAIN_SUFFIX)
    }

    fn completes(&self) -> PipelineState {
        PipelineState::Prepared
    }

    fn apply(&self, ctx: &HostContext) -> Result<()> {
        let paths = &ctx.paths;
        let backup = paths.hostname_backup();

        // One-time snapshot; an existing backup means this already ran
        if !backup.exists() {
            let original = Self::current_hostname(paths)?;
            if original.is_empty() {
                return Err(ProvisionError::Hostname(
                    "could not determine current hostname".to_string(),
                ));
            }
            if let Some(parent) = backup.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&backup, format!("{}\n", original))?;
            tracing::info!("snapshotted original hostname '{}'", original);
        }

        let original = std::fs::read_to_string(&backup)?.trim().to_string();
        let fqdn = format!("{}.{}", original, DOMAIN_SUFFIX);

        std::fs::write(paths.hostname(), format!("{}\n", fqdn))?;
        tracing::info!("hostname set to '{}' (effective after reboot)", fqdn);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvisionConfig;
    use crate::exec::RecordingExecutor;
    use crate::host::HostPaths;

    fn context(root: &std::path::Path) -> HostContext {
        let config = ProvisionConfig::parse(
            "swarm_token=t\nswarm_ip_address=m\nnfs_ip_address=n\nlocation=siteA\n",
        )
        .unwrap();
        HostContext::new(
            config,
            HostPaths::rooted(root),
            std::sync::Arc::new(RecordingExecutor::new()),
        )
    }

    #[test]
    fn test_derives_fqdn_from_existing_hostname() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        std::fs::create_dir_all(dir.path().join("etc")).unwrap();
        std::fs::write(ctx.paths.hostname(), "node01\n").unwrap();

        HostnameStep::new().apply(&ctx).unwrap();

        let hostname = std::fs::read_to_string(ctx.paths.hostname()).unwrap();
        assert_eq!(hostname, "node01.rococloud.me\n");
        let backup = std::fs::read_to_string(ctx.paths.hostname_backup()).unwrap();
        assert_eq!(backup, "node01\n");
    }

    #[test]
    fn test_rerun_keeps_backup_and_fqdn_stable() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        std::fs::create_dir_all(dir.path().join("etc")).unwrap();
        std::fs::write(ctx.paths.hostname(), "node01\n").unwrap();

        let step = HostnameStep::new();
        step.apply(&ctx).unwrap();
        let first_backup = std::fs::read_to_string(ctx.paths.hostname_backup()).unwrap();

        // Second run starts from the already-rewritten /etc/hostname
        step.apply(&ctx).unwrap();

        let second_backup = std::fs::read_to_string(ctx.paths.hostname_backup()).unwrap();
        assert_eq!(first_backup, second_backup);

        let hostname = std::fs::read_to_string(ctx.paths.hostname()).unwrap();
        assert_eq!(hostname, "node01.rococloud.me\n");
    }

    #[test]
    fn test_falls_back_to_system_hostname() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());

        // No etc/hostname under the root: the step snapshots gethostname()
        HostnameStep::new().apply(&ctx).unwrap();

        let backup = std::fs::read_to_string(ctx.paths.hostname_backup()).unwrap();
        assert!(!backup.trim().is_empty());
        let hostname = std::fs::read_to_string(ctx.paths.hostname()).unwrap();
        assert!(hostname.trim().ends_with(".rococloud.me"));
    }
}
