//! The provisioning pipeline
//!
//! A fixed, strictly sequential list of typed steps. Each step declares a
//! policy up front: `Fatal` failures halt the run, `BestEffort` failures
//! are logged and recorded but execution continues. The only `Fatal` step
//! in the standard pipeline is the container runtime verification, the
//! sole branch point of the whole process.

use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::host::HostContext;
use crate::steps::{
    HardenStep, HostnameStep, JoinStep, KeySyncStep, PackageStep, RebootStep, RuntimeStep,
    StorageStep,
};
use serde::Serialize;

/// Failure policy of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepPolicy {
    /// Failure halts the pipeline
    Fatal,
    /// Failure is reported and the pipeline continues
    BestEffort,
}

/// Pipeline progress, advanced as steps complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Init,
    ConfigLoaded,
    Prepared,
    PackagesInstalled,
    Hardened,
    RuntimeVerified,
    Scheduled,
    Mounted,
    KeysSynced,
    Rebooting,
    /// Terminal failure: the container runtime did not verify
    RuntimeMissing,
}

/// Outcome of one executed step
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase", tag = "outcome", content = "detail")]
pub enum StepOutcome {
    Completed,
    Failed(String),
}

/// Report entry for one executed step
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// Step name
    pub name: &'static str,
    /// Declared policy
    pub policy: StepPolicy,
    /// What happened
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// What a pipeline run produced
pub struct RunOutcome {
    /// Reports for every step that ran, the failed `Fatal` step included
    pub reports: Vec<StepReport>,
    /// The error that halted the run, when a `Fatal` step failed
    pub fatal: Option<ProvisionError>,
}

/// One provisioning step
pub trait Step {
    /// Short identifier, used in logs and reports
    fn name(&self) -> &'static str;

    /// Failure policy
    fn policy(&self) -> StepPolicy;

    /// One-line description of the mutations this step performs
    fn summary(&self) -> String;

    /// State the pipeline enters when this step completes
    fn completes(&self) -> PipelineState;

    /// Perform the step against the host
    fn apply(&self, ctx: &HostContext) -> Result<()>;
}

/// Entry in the printed/serialized plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub name: &'static str,
    pub policy: StepPolicy,
    pub summary: String,
}

/// The sequential provisioning pipeline
pub struct Pipeline {
    steps: Vec<Box<dyn Step>>,
    state: PipelineState,
}

impl Pipeline {
    /// Build a pipeline from an explicit step list
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self {
            steps,
            // The pipeline only exists once the configuration loaded
            state: PipelineState::ConfigLoaded,
        }
    }

    /// The standard pipeline for a configuration
    ///
    /// Hardening and key sync are configuration-gated; the final reboot is
    /// skipped when the operator passed `--no-reboot`.
    pub fn standard(config: &ProvisionConfig, reboot: bool) -> Self {
        let mut steps: Vec<Box<dyn Step>> = vec![
            Box::new(HostnameStep::new()),
            Box::new(PackageStep::new()),
        ];

        if config.harden_ssh {
            steps.push(Box::new(HardenStep::new()));
        }

        steps.push(Box::new(RuntimeStep::new()));
        steps.push(Box::new(JoinStep::new()));
        steps.push(Box::new(StorageStep::new()));

        if config.sync_keys {
            steps.push(Box::new(KeySyncStep::new()));
        }

        if reboot {
            steps.push(Box::new(RebootStep::new()));
        }

        Self::new(steps)
    }

    /// Current pipeline state
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Describe the pipeline without touching the host
    pub fn plan(&self) -> Vec<PlanEntry> {
        self.steps
            .iter()
            .map(|step| PlanEntry {
                name: step.name(),
                policy: step.policy(),
                summary: step.summary(),
            })
            .collect()
    }

    /// Run all steps in order
    ///
    /// Always returns the per-step reports gathered so far; when a
    /// `Fatal` step fails, its error is carried alongside them and no
    /// further steps run.
    pub fn run(&mut self, ctx: &HostContext) -> RunOutcome {
        let mut reports = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            tracing::info!("==> {}: {}", step.name(), step.summary());

            match step.apply(ctx) {
                Ok(()) => {
                    self.state = step.completes();
                    tracing::info!("{} completed", step.name());
                    reports.push(StepReport {
                        name: step.name(),
                        policy: step.policy(),
                        outcome: StepOutcome::Completed,
                    });
                }
                Err(e) => match step.policy() {
                    StepPolicy::Fatal => {
                        if step.completes() == PipelineState::RuntimeVerified {
                            self.state = PipelineState::RuntimeMissing;
                        }
                        tracing::error!("{} failed: {}", step.name(), e);
                        reports.push(StepReport {
                            name: step.name(),
                            policy: step.policy(),
                            outcome: StepOutcome::Failed(e.to_string()),
                        });
                        return RunOutcome {
                            reports,
                            fatal: Some(e),
                        };
                    }
                    StepPolicy::BestEffort => {
                        tracing::error!("{} failed (continuing): {}", step.name(), e);
                        reports.push(StepReport {
                            name: step.name(),
                            policy: step.policy(),
                            outcome: StepOutcome::Failed(e.to_string()),
                        });
                    }
                },
            }
        }

        RunOutcome {
            reports,
            fatal: None,
        }
    }
}
