//! Package installer
//!
//! Refreshes the apt index, upgrades the host, installs the fixed base
//! dependency set, then bootstraps the upstream Docker repository (signing
//! key, sources entry) and installs the engine packages. Every sub-step is
//! best-effort: failures are collected and reported at the end, but none
//! of them aborts the remaining sub-steps. Whether Docker actually works
//! is decided later by the runtime verification gate.

use crate::error::{ProvisionError, Result};
use crate::host::HostContext;
use crate::pipeline::{PipelineState, Step, StepPolicy};

/// Base dependency set installed before the Docker repository exists
pub const BASE_PACKAGES: &[&str] = &[
    "fail2ban",
    "nfs-common",
    "nfs-kernel-server",
    "ca-certificates",
    "curl",
    "gnupg",
];

/// Docker engine packages from the upstream repository
pub const DOCKER_PACKAGES: &[&str] = &[
    "docker-ce",
    "docker-ce-cli",
    "containerd.io",
    "docker-buildx-plugin",
    "docker-compose-plugin",
];

const DOCKER_GPG_URL: &str = "https://download.docker.com/linux/ubuntu/gpg";
const DOCKER_REPO_URL: &str = "https://download.docker.com/linux/ubuntu";

/// The package installation step
pub struct PackageStep;

impl PackageStep {
    pub fn new() -> Self {
        Self
    }

    /// Run a command, pushing a failure description instead of erroring
    fn run_logged(ctx: &HostContext, program: &str, args: &[&str], failures: &mut Vec<String>) {
        match ctx.executor.run(program, args) {
            Ok(output) if output.success() => {}
            Ok(output) => failures.push(format!(
                "{} {} exited {}: {}",
                program,
                args.join(" "),
                output.code,
                output.stderr.trim()
            )),
            Err(e) => failures.push(e.to_string()),
        }
    }

    /// Detect the dpkg architecture and OS release codename
    fn detect_target(ctx: &HostContext) -> Result<(String, String)> {
        let arch = ctx.executor.run("dpkg", &["--print-architecture"])?;
        if !arch.success() {
            return Err(ProvisionError::Package(
                "dpkg --print-architecture failed".to_string(),
            ));
        }

        let codename = ctx
            .executor
            .run_shell(". /etc/os-release && echo \"$VERSION_CODENAME\"")?;
        if !codename.success() || codename.stdout.trim().is_empty() {
            return Err(ProvisionError::Package(
                "could not read VERSION_CODENAME from /etc/os-release".to_string(),
            ));
        }

        Ok((
            arch.stdout.trim().to_string(),
            codename.stdout.trim().to_string(),
        ))
    }

    /// Fetch and dearmor the Docker signing key, then write the apt source
    fn setup_docker_repo(ctx: &HostContext, failures: &mut Vec<String>) {
        let keyring = ctx.paths.docker_keyring();
        if let Some(parent) = keyring.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                failures.push(format!("create {}: {}", parent.display(), e));
                return;
            }
        }

        let fetch_key = format!(
            "curl -fsSL {} | gpg --dearmor --yes -o {} && chmod a+r {}",
            DOCKER_GPG_URL,
            keyring.display(),
            keyring.display()
        );
        match ctx.executor.run_shell(&fetch_key) {
            Ok(output) if output.success() => {}
            Ok(output) => {
                failures.push(format!("docker signing key: {}", output.stderr.trim()));
                return;
            }
            Err(e) => {
                failures.push(format!("docker signing key: {}", e));
                return;
            }
        }

        let (arch, codename) = match Self::detect_target(ctx) {
            Ok(target) => target,
            Err(e) => {
                // Without a codename the sources line would be garbage
                failures.push(e.to_string());
                return;
            }
        };

        let sources = ctx.paths.docker_sources();
        let line = format!(
            "deb [arch={} signed-by={}] {} {} stable\n",
            arch,
            keyring.display(),
            DOCKER_REPO_URL,
            codename
        );

        let write = (|| -> Result<()> {
            if let Some(parent) = sources.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&sources, line)?;
            Ok(())
        })();
        if let Err(e) = write {
            failures.push(format!("write {}: {}", sources.display(), e));
            return;
        }

        Self::run_logged(ctx, "apt-get", &["update"], failures);

        let mut install = vec!["-y", "install"];
        install.extend_from_slice(DOCKER_PACKAGES);
        Self::run_logged(ctx, "apt-get", &install, failures);
    }
}

impl Default for PackageStep {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for PackageStep {
    fn name(&self) -> &'static str {
        "packages"
    }

    fn policy(&self) -> StepPolicy {
        StepPolicy::BestEffort
    }

    fn summary(&self) -> String {
        "update apt, install base packages, bootstrap the Docker repository".to_string()
    }

    fn completes(&self) -> PipelineState {
        PipelineState::PackagesInstalled
    }

    fn apply(&self, ctx: &HostContext) -> Result<()> {
        let mut failures = Vec::new();

        Self::run_logged(ctx, "apt-get", &["update"], &mut failures);
        Self::run_logged(ctx, "apt-get", &["-y", "upgrade"], &mut failures);

        let mut install = vec!["-y", "install"];
        install.extend_from_slice(BASE_PACKAGES);
        Self::run_logged(ctx, "apt-get", &install, &mut failures);

        Self::setup_docker_repo(ctx, &mut failures);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ProvisionError::Package(failures.join("; ")))
        }
    }
}
