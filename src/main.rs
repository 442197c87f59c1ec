//! rocoprov - RocoCloud Swarm worker provisioner
//!
//! This is the CLI entry point for rocoprov.

use clap::{Parser, Subcommand};
use rocoprov::config::{ProvisionConfig, DEFAULT_CONFIG_FILE};
use rocoprov::error::Result;
use rocoprov::exec::SystemExecutor;
use rocoprov::host::{HostContext, HostPaths};
use rocoprov::pipeline::{Pipeline, Step, StepOutcome, StepPolicy};
use rocoprov::steps::RuntimeStep;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const GREEN_CHECK: &str = "\x1b[32m✔\x1b[0m";
const RED_CROSS: &str = "\x1b[31m✘\x1b[0m";

/// rocoprov - RocoCloud Swarm worker provisioner
#[derive(Parser)]
#[command(name = "rocoprov")]
#[command(author = "RocoCloud Ops")]
#[command(version)]
#[command(about = "Provisions a bare Linux host into a RocoCloud Docker Swarm worker", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full provisioning pipeline
    Run {
        /// Configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Skip the final reboot
        #[arg(long)]
        no_reboot: bool,
    },

    /// Show what the pipeline would do, without touching the host
    Plan {
        /// Configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Emit the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate the configuration file and exit
    Validate {
        /// Configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },

    /// Verify the container runtime and exit
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run { config, no_reboot } => {
            let config = ProvisionConfig::load(&config)?;
            let mut pipeline = Pipeline::standard(&config, !no_reboot);
            let ctx = HostContext::new(config, HostPaths::system(), Arc::new(SystemExecutor));

            let outcome = pipeline.run(&ctx);

            println!("\nProvisioning report:");
            for report in &outcome.reports {
                match &report.outcome {
                    StepOutcome::Completed => {
                        println!("  {} {}", GREEN_CHECK, report.name);
                    }
                    StepOutcome::Failed(detail) => {
                        println!("  {} {} ({})", RED_CROSS, report.name, detail);
                    }
                }
            }
            println!("Pipeline state: {:?}", pipeline.state());

            if let Some(e) = outcome.fatal {
                return Err(e);
            }
        }

        Commands::Plan { config, json } => {
            let config = ProvisionConfig::load(&config)?;
            let pipeline = Pipeline::standard(&config, true);
            let plan = pipeline.plan();

            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                for entry in &plan {
                    let policy = match entry.policy {
                        StepPolicy::Fatal => "fatal",
                        StepPolicy::BestEffort => "best-effort",
                    };
                    println!("{:<12} [{:<11}] {}", entry.name, policy, entry.summary);
                }
            }
        }

        Commands::Validate { config } => {
            let loaded = ProvisionConfig::load(&config)?;
            println!(
                "{} {} valid: manager {}, storage {}:/{}",
                GREEN_CHECK,
                config.display(),
                loaded.swarm_ip_address,
                loaded.nfs_ip_address,
                loaded.location
            );
        }

        Commands::Check => {
            // A runtime check needs no configuration
            let config = ProvisionConfig::parse(
                "swarm_token=unused\nswarm_ip_address=unused\nnfs_ip_address=unused\nlocation=unused\n",
            )?;
            let ctx = HostContext::new(config, HostPaths::system(), Arc::new(SystemExecutor));
            RuntimeStep::new().apply(&ctx)?;
            println!("{} container runtime verified", GREEN_CHECK);
        }
    }

    Ok(())
}
