//! Finalizer
//!
//! The last step of the success branch: wait briefly so log output
//! flushes, then reboot the host. The new hostname takes effect, the
//! `@reboot` job fires and joins the swarm, and the `nofail` mounts come
//! up once the network is stable. There is no return path.

use crate::error::{ProvisionError, Result};
use crate::host::HostContext;
use crate::pipeline::{PipelineState, Step, StepPolicy};
use std::time::Duration;

/// Seconds to wait before rebooting
const REBOOT_DELAY_SECS: u64 = 5;

/// The reboot step
pub struct RebootStep {
    delay: Duration,
}

impl RebootStep {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_secs(REBOOT_DELAY_SECS),
        }
    }

    /// A reboot step with a custom delay (tests)
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for RebootStep {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for RebootStep {
    fn name(&self) -> &'static str {
        "reboot"
    }

    fn policy(&self) -> StepPolicy {
        StepPolicy::BestEffort
    }

    fn summary(&self) -> String {
        "reboot the host to complete provisioning".to_string()
    }

    fn completes(&self) -> PipelineState {
        PipelineState::Rebooting
    }

    fn apply(&self, ctx: &HostContext) -> Result<()> {
        tracing::info!("rebooting in {} seconds", self.delay.as_secs());
        std::thread::sleep(self.delay);

        let output = ctx.executor.run("reboot", &[])?;
        if !output.success() {
            return Err(ProvisionError::Reboot(format!(
                "reboot exited {}: {}",
                output.code,
                output.stderr.trim()
            )));
        }

        Ok(())
    }
}
