//! Cluster join scheduler
//!
//! The join cannot happen inside this process: the host's identity only
//! settles after the final reboot. Instead the step writes a one-shot
//! script (`/root/connect.sh`) that sleeps briefly, runs the
//! `docker swarm join` invocation, deregisters its own cron entry and
//! deletes itself, then registers an `@reboot` cron job pointing at it.
//! The join thus happens exactly once, after the impending reboot.

use crate::error::Result;
use crate::host::HostContext;
use crate::pipeline::{PipelineState, Step, StepPolicy};
use crate::scheduler::{CronJob, CronTable, OneShotTask, Schedule};

/// Cron job identifier for the one-shot join
pub const JOIN_JOB_ID: &str = "swarm-join";

/// Seconds the boot script waits before joining
const JOIN_DELAY_SECS: u64 = 5;

/// The swarm join scheduling step
pub struct JoinStep;

impl JoinStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JoinStep {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for JoinStep {
    fn name(&self) -> &'static str {
        "swarm-join"
    }

    fn policy(&self) -> StepPolicy {
        StepPolicy::BestEffort
    }

    fn summary(&self) -> String {
        "schedule a one-shot swarm join for the next boot".to_string()
    }

    fn completes(&self) -> PipelineState {
        PipelineState::Scheduled
    }

    fn apply(&self, ctx: &HostContext) -> Result<()> {
        let task = OneShotTask {
            path: ctx.paths.connect_script(),
            delay_secs: JOIN_DELAY_SECS,
            command: format!(
                "docker swarm join --token {} {}",
                ctx.config.swarm_token, ctx.config.swarm_ip_address
            ),
            job_id: JOIN_JOB_ID.to_string(),
        };
        task.write()?;

        // The cron entry runs the script at its real on-host location
        let mut table = CronTable::load(ctx.executor.as_ref())?;
        table.upsert(&CronJob::new(
            JOIN_JOB_ID,
            Schedule::Reboot,
            "/root/connect.sh",
        ));
        table.install(ctx.executor.as_ref())?;

        tracing::info!(
            "swarm join scheduled: {} -> {}",
            ctx.config.swarm_ip_address,
            task.path.display()
        );
        Ok(())
    }
}
