//! Scheduled job management
//!
//! The pipeline owns two kinds of jobs: a one-shot boot-time task (the
//! swarm join) and a recurring interval task (the key re-sync). Both live
//! in root's crontab. Entries written by this tool carry a trailing
//! `# rocoprov:<id>` marker so they can be upserted by identifier; lines
//! without a marker are never touched, and re-running the pipeline never
//! duplicates a job.

use crate::error::{ProvisionError, Result};
use crate::exec::Executor;
use std::path::PathBuf;

/// Marker prefix identifying entries owned by this tool
const MARKER_PREFIX: &str = "# rocoprov:";

/// When a cron job runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Once after the next system startup
    Reboot,
    /// Every `n` minutes
    EveryMinutes(u32),
}

impl Schedule {
    fn render(&self) -> String {
        match self {
            Schedule::Reboot => "@reboot".to_string(),
            Schedule::EveryMinutes(n) => format!("*/{} * * * *", n),
        }
    }
}

/// A crontab entry owned by this tool
#[derive(Debug, Clone)]
pub struct CronJob {
    /// Stable identifier, rendered into the marker comment
    pub id: String,
    /// When the job runs
    pub schedule: Schedule,
    /// Shell command the job runs
    pub command: String,
}

impl CronJob {
    /// Create a job
    pub fn new(id: &str, schedule: Schedule, command: &str) -> Self {
        Self {
            id: id.to_string(),
            schedule,
            command: command.to_string(),
        }
    }

    /// Render the crontab line, marker included
    pub fn render(&self) -> String {
        format!(
            "{} {} {}{}",
            self.schedule.render(),
            self.command,
            MARKER_PREFIX,
            self.id
        )
    }

    fn marker(&self) -> String {
        format!("{}{}", MARKER_PREFIX, self.id)
    }
}

/// Root's crontab, loaded in full and written back in full
///
/// Pre-existing entries that this tool does not own are preserved verbatim
/// across load/install cycles.
#[derive(Debug, Default)]
pub struct CronTable {
    lines: Vec<String>,
}

impl CronTable {
    /// Load the current table; a host with no crontab yields an empty table
    pub fn load(executor: &dyn Executor) -> Result<Self> {
        let output = executor.run("crontab", &["-l"])?;
        if !output.success() {
            // `crontab -l` exits non-zero when no table exists yet
            return Ok(Self::default());
        }

        let lines = output
            .stdout
            .lines()
            .map(|l| l.to_string())
            .filter(|l| !l.trim().is_empty())
            .collect();

        Ok(Self { lines })
    }

    /// All current lines
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Insert or replace the entry for a job, keyed by its marker
    pub fn upsert(&mut self, job: &CronJob) {
        let marker = job.marker();
        self.lines.retain(|line| !line.ends_with(&marker));
        self.lines.push(job.render());
    }

    /// Remove the entry for a job id, if present
    pub fn remove(&mut self, id: &str) {
        let marker = format!("{}{}", MARKER_PREFIX, id);
        self.lines.retain(|line| !line.ends_with(&marker));
    }

    /// Install the table as root's crontab
    pub fn install(&self, executor: &dyn Executor) -> Result<()> {
        let mut table = self.lines.join("\n");
        table.push('\n');

        let output = executor.run_shell(&format!("crontab - <<'EOF'\n{}EOF", table))?;
        if !output.success() {
            return Err(ProvisionError::Schedule(format!(
                "crontab install failed: {}",
                output.stderr.trim()
            )));
        }
        Ok(())
    }
}

/// A one-shot script that runs once after the next reboot, then removes
/// every trace of itself
///
/// Templating is separate from scheduling: this type renders and writes
/// the script, while registering the `@reboot` entry is the caller's job
/// through [`CronTable`].
#[derive(Debug, Clone)]
pub struct OneShotTask {
    /// Where the script is written
    pub path: PathBuf,
    /// Seconds to wait before running, letting the network settle
    pub delay_secs: u64,
    /// The command to run once
    pub command: String,
    /// Cron job id the script deregisters on completion
    pub job_id: String,
}

impl OneShotTask {
    /// Render the script body
    pub fn render(&self) -> String {
        format!(
            "#!/bin/sh\nsleep {}\n{}\ncrontab -l 2>/dev/null | grep -v '{}{}' | crontab -\nrm -f -- \"$0\"\n",
            self.delay_secs, self.command, MARKER_PREFIX, self.job_id
        )
    }

    /// Write the script with execute permission
    pub fn write(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, self.render())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o755))?;
        }

        Ok(())
    }
}
