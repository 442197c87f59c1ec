//! Storage mounter
//!
//! Creates the local mount points, appends the NFS entries to
//! `/etc/fstab` (skipping lines already present, so re-runs never stack
//! duplicates) and asks the mount subsystem to mount everything. A mount
//! failure is only a warning: the NFS server is frequently unreachable
//! until the network settles after the reboot, at which point the
//! `nofail`/`auto` options pick the mount up.

use crate::error::{ProvisionError, Result};
use crate::host::{HostContext, PROVISION_MOUNT, STORAGE_BASE};
use crate::pipeline::{PipelineState, Step, StepPolicy};

/// The NFS storage mounting step
pub struct StorageStep;

impl StorageStep {
    pub fn new() -> Self {
        Self
    }

    /// The fstab entries this host needs
    pub fn fstab_lines(ctx: &HostContext) -> Vec<String> {
        let config = &ctx.config;
        let options = config.mount_profile.options();

        let mut lines = vec![format!(
            "{}:/{} {}/{} nfs {} 0 0",
            config.nfs_ip_address, config.location, STORAGE_BASE, config.location, options
        )];

        if let Some(server) = &config.provisioning_server {
            lines.push(format!(
                "{}:/provision {} nfs {} 0 0",
                server, PROVISION_MOUNT, options
            ));
        }

        lines
    }

    /// Append missing lines to fstab, preserving everything already there
    fn update_fstab(ctx: &HostContext, lines: &[String]) -> Result<()> {
        let path = ctx.paths.fstab();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let existing: Vec<&str> = contents.lines().map(str::trim).collect();
        let missing: Vec<&String> = lines
            .iter()
            .filter(|l| !existing.contains(&l.as_str()))
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        if !contents.is_empty() && !contents.ends_with('\n') {
            contents.push('\n');
        }
        for line in missing {
            contents.push_str(line);
            contents.push('\n');
        }
        std::fs::write(&path, contents)?;

        Ok(())
    }
}

impl Default for StorageStep {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for StorageStep {
    fn name(&self) -> &'static str {
        "storage"
    }

    fn policy(&self) -> StepPolicy {
        StepPolicy::BestEffort
    }

    fn summary(&self) -> String {
        "register and mount the NFS storage exports".to_string()
    }

    fn completes(&self) -> PipelineState {
        PipelineState::Mounted
    }

    fn apply(&self, ctx: &HostContext) -> Result<()> {
        std::fs::create_dir_all(ctx.paths.storage_dir(&ctx.config.location))?;
        if ctx.config.provisioning_server.is_some() {
            std::fs::create_dir_all(ctx.paths.provision_dir())?;
        }

        let lines = Self::fstab_lines(ctx);
        Self::update_fstab(ctx, &lines)
            .map_err(|e| ProvisionError::Mount(format!("fstab update failed: {}", e)))?;

        // Storage may only become reachable after reboot; never fail on it
        match ctx.executor.run("mount", &["-a"]) {
            Ok(output) if output.success() => {
                tracing::info!("storage mounted");
            }
            Ok(output) => {
                tracing::warn!(
                    "mount -a failed (storage may attach after reboot): {}",
                    output.stderr.trim()
                );
            }
            Err(e) => {
                tracing::warn!("mount -a could not run: {}", e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvisionConfig;
    use crate::exec::RecordingExecutor;
    use crate::host::HostPaths;
    use std::sync::Arc;

    fn context(root: &std::path::Path, extra: &str) -> (HostContext, Arc<RecordingExecutor>) {
        let base =
            "swarm_token=abc123\nswarm_ip_address=10.0.0.5\nnfs_ip_address=10.0.0.9\nlocation=siteA\n";
        let config = ProvisionConfig::parse(&format!("{base}{extra}")).unwrap();
        let executor = Arc::new(RecordingExecutor::new());
        let ctx = HostContext::new(config, HostPaths::rooted(root), executor.clone());
        (ctx, executor)
    }

    #[test]
    fn test_appends_full_profile_line_and_mounts() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, executor) = context(dir.path(), "");

        StorageStep::new().apply(&ctx).unwrap();

        let fstab = std::fs::read_to_string(ctx.paths.fstab()).unwrap();
        assert_eq!(
            fstab,
            "10.0.0.9:/siteA /storage/siteA nfs auto,nofail,noatime,nolock,intr,tcp,actimeo=1800 0 0\n"
        );
        assert!(ctx.paths.storage_dir("siteA").is_dir());
        assert!(executor.ran("mount -a"));
    }

    #[test]
    fn test_minimal_profile_options() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _executor) = context(dir.path(), "mount_profile=minimal\n");

        let lines = StorageStep::fstab_lines(&ctx);
        assert_eq!(lines, vec!["10.0.0.9:/siteA /storage/siteA nfs rw,user 0 0"]);
    }

    #[test]
    fn test_provisioning_server_adds_second_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _executor) = context(dir.path(), "provisioning_server=10.0.0.7\n");

        StorageStep::new().apply(&ctx).unwrap();

        let fstab = std::fs::read_to_string(ctx.paths.fstab()).unwrap();
        assert!(fstab.contains("10.0.0.9:/siteA /storage/siteA nfs "));
        assert!(fstab.contains("10.0.0.7:/provision /storage/provision nfs "));
        assert!(ctx.paths.provision_dir().is_dir());
    }

    #[test]
    fn test_rerun_does_not_duplicate_entries() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _executor) = context(dir.path(), "");

        let step = StorageStep::new();
        step.apply(&ctx).unwrap();
        step.apply(&ctx).unwrap();

        let fstab = std::fs::read_to_string(ctx.paths.fstab()).unwrap();
        assert_eq!(fstab.matches("/storage/siteA").count(), 1);
    }

    #[test]
    fn test_preserves_existing_fstab_entries() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _executor) = context(dir.path(), "");
        std::fs::create_dir_all(dir.path().join("etc")).unwrap();
        std::fs::write(ctx.paths.fstab(), "/dev/sda1 / ext4 defaults 0 1\n").unwrap();

        StorageStep::new().apply(&ctx).unwrap();

        let fstab = std::fs::read_to_string(ctx.paths.fstab()).unwrap();
        assert!(fstab.starts_with("/dev/sda1 / ext4 defaults 0 1\n"));
        assert!(fstab.contains("10.0.0.9:/siteA"));
    }

    #[test]
    fn test_mount_failure_still_completes() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, executor) = context(dir.path(), "");
        executor.fail("mount");

        // The step reports success even though mount -a failed
        StorageStep::new().apply(&ctx).unwrap();
        assert!(ctx.paths.fstab().exists());
    }
}
