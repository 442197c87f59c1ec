//! Container runtime verifier
//!
//! The sole gate of the pipeline. Everything after package installation is
//! pointless without a working Docker engine, so this step demands that
//! `docker --version` reports a recognizable version string before the
//! join, mount, and key-sync steps are allowed to run.

use crate::error::{ProvisionError, Result};
use crate::host::HostContext;
use crate::pipeline::{PipelineState, Step, StepPolicy};
use regex::Regex;

/// The runtime verification step
pub struct RuntimeStep;

impl RuntimeStep {
    pub fn new() -> Self {
        Self
    }

    /// Whether the version output looks like a real Docker engine
    pub fn version_ok(stdout: &str) -> bool {
        // e.g. "Docker version 24.0.7, build afdd53b"
        Regex::new(r"^Docker version \d+")
            .expect("static regex")
            .is_match(stdout.trim())
    }
}

impl Default for RuntimeStep {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for RuntimeStep {
    fn name(&self) -> &'static str {
        "runtime"
    }

    fn policy(&self) -> StepPolicy {
        StepPolicy::Fatal
    }

    fn summary(&self) -> String {
        "verify the Docker engine reports a valid version".to_string()
    }

    fn completes(&self) -> PipelineState {
        PipelineState::RuntimeVerified
    }

    fn apply(&self, ctx: &HostContext) -> Result<()> {
        let output = ctx.executor.run("docker", &["--version"])?;

        if !output.success() {
            return Err(ProvisionError::RuntimeNotInstalled(format!(
                "docker --version exited {}: {}",
                output.code,
                output.stderr.trim()
            )));
        }

        if !Self::version_ok(&output.stdout) {
            return Err(ProvisionError::RuntimeNotInstalled(format!(
                "unexpected version output: {:?}",
                output.stdout.trim()
            )));
        }

        tracing::info!("runtime verified: {}", output.stdout.trim());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvisionConfig;
    use crate::exec::{CommandOutput, RecordingExecutor};
    use crate::host::HostPaths;

    fn context(executor: RecordingExecutor) -> HostContext {
        let config = ProvisionConfig::parse(
            "swarm_token=t\nswarm_ip_address=m\nnfs_ip_address=n\nlocation=siteA\n",
        )
        .unwrap();
        HostContext::new(
            config,
            HostPaths::rooted("/tmp/unused"),
            std::sync::Arc::new(executor),
        )
    }

    #[test]
    fn test_accepts_docker_version() {
        let executor = RecordingExecutor::new();
        executor.set_output(
            "docker",
            CommandOutput::with_stdout("Docker version 24.0.7, build afdd53b\n"),
        );
        RuntimeStep::new().apply(&context(executor)).unwrap();
    }

    #[test]
    fn test_rejects_command_failure() {
        let executor = RecordingExecutor::new();
        executor.fail("docker");
        let err = RuntimeStep::new().apply(&context(executor)).unwrap_err();
        assert!(matches!(err, ProvisionError::RuntimeNotInstalled(_)));
    }

    #[test]
    fn test_rejects_foreign_version_string() {
        let executor = RecordingExecutor::new();
        executor.set_output("docker", CommandOutput::with_stdout("podman version 4.9\n"));
        let err = RuntimeStep::new().apply(&context(executor)).unwrap_err();
        assert!(matches!(err, ProvisionError::RuntimeNotInstalled(_)));
    }

    #[test]
    fn test_version_ok() {
        assert!(RuntimeStep::version_ok("Docker version 24.0.7, build afdd53b"));
        assert!(RuntimeStep::version_ok("Docker version 27.1.1\n"));
        assert!(!RuntimeStep::version_ok("Docker version unknown"));
        assert!(!RuntimeStep::version_ok(""));
    }
}
