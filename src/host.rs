//! Host state addressing
//!
//! Every file the pipeline touches lives under a single root, `/` in
//! production and a temporary directory in tests. [`HostPaths`] is the one
//! place that knows where each artifact sits, so steps never hardcode
//! absolute paths into filesystem operations.
//!
//! Strings embedded into generated artifacts (fstab mount points, cron
//! commands, the boot script) always use the real absolute location,
//! independent of the root the tool itself writes through.

use crate::config::ProvisionConfig;
use crate::exec::Executor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Base directory for NFS mounts, as written into fstab and cron entries
pub const STORAGE_BASE: &str = "/storage";

/// Mount point of the shared provisioning export
pub const PROVISION_MOUNT: &str = "/storage/provision";

/// Resolver for host filesystem artifacts under a configurable root
#[derive(Debug, Clone)]
pub struct HostPaths {
    root: PathBuf,
}

impl HostPaths {
    /// Paths rooted at `/` (the real host)
    pub fn system() -> Self {
        Self::rooted("/")
    }

    /// Paths rooted at an arbitrary directory (tests)
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn join(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// The root this resolver writes through
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `/etc/hostname`
    pub fn hostname(&self) -> PathBuf {
        self.join("etc/hostname")
    }

    /// `/etc/hostname.init`, the one-time snapshot of the original hostname
    pub fn hostname_backup(&self) -> PathBuf {
        self.join("etc/hostname.init")
    }

    /// `/etc/ssh/sshd_config`
    pub fn sshd_config(&self) -> PathBuf {
        self.join("etc/ssh/sshd_config")
    }

    /// `/etc/fail2ban/filter.d/sshd-rococloud.conf`
    pub fn fail2ban_filter(&self) -> PathBuf {
        self.join("etc/fail2ban/filter.d/sshd-rococloud.conf")
    }

    /// `/etc/fail2ban/jail.d/sshd-rococloud.conf`
    pub fn fail2ban_jail(&self) -> PathBuf {
        self.join("etc/fail2ban/jail.d/sshd-rococloud.conf")
    }

    /// `/etc/apt/keyrings/docker.gpg`
    pub fn docker_keyring(&self) -> PathBuf {
        self.join("etc/apt/keyrings/docker.gpg")
    }

    /// `/etc/apt/sources.list.d/docker.list`
    pub fn docker_sources(&self) -> PathBuf {
        self.join("etc/apt/sources.list.d/docker.list")
    }

    /// `/etc/fstab`
    pub fn fstab(&self) -> PathBuf {
        self.join("etc/fstab")
    }

    /// `/root/connect.sh`, the generated one-shot join script
    pub fn connect_script(&self) -> PathBuf {
        self.join("root/connect.sh")
    }

    /// `/root/.ssh/authorized_keys`
    pub fn authorized_keys(&self) -> PathBuf {
        self.join("root/.ssh/authorized_keys")
    }

    /// Local mount point directory for the site storage export
    pub fn storage_dir(&self, location: &str) -> PathBuf {
        self.join("storage").join(location)
    }

    /// Local mount point directory for the shared provisioning export
    pub fn provision_dir(&self) -> PathBuf {
        self.join("storage/provision")
    }
}

/// Everything a step needs to mutate the host
pub struct HostContext {
    /// Loaded provisioning settings
    pub config: ProvisionConfig,
    /// Filesystem artifact resolver
    pub paths: HostPaths,
    /// Process boundary
    pub executor: Arc<dyn Executor>,
}

impl HostContext {
    /// Create a context
    pub fn new(config: ProvisionConfig, paths: HostPaths, executor: Arc<dyn Executor>) -> Self {
        Self {
            config,
            paths,
            executor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_paths() {
        let paths = HostPaths::system();
        assert_eq!(paths.hostname(), PathBuf::from("/etc/hostname"));
        assert_eq!(paths.fstab(), PathBuf::from("/etc/fstab"));
        assert_eq!(paths.connect_script(), PathBuf::from("/root/connect.sh"));
        assert_eq!(paths.storage_dir("siteA"), PathBuf::from("/storage/siteA"));
    }

    #[test]
    fn test_rooted_paths() {
        let paths = HostPaths::rooted("/tmp/fake");
        assert_eq!(
            paths.fail2ban_jail(),
            PathBuf::from("/tmp/fake/etc/fail2ban/jail.d/sshd-rococloud.conf")
        );
        assert_eq!(
            paths.authorized_keys(),
            PathBuf::from("/tmp/fake/root/.ssh/authorized_keys")
        );
    }
}
