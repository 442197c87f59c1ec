//! Process boundary
//!
//! Every external tool the pipeline drives (apt-get, docker, crontab,
//! systemctl, mount, reboot) is invoked through the [`Executor`] trait.
//! The pipeline blocks on each child process and observes only the exit
//! status and captured output. Tests substitute a recording fake.

use crate::error::{ProvisionError, Result};
use std::collections::HashMap;
use std::process::Command;
use std::sync::Mutex;

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code, -1 when terminated by a signal
    pub code: i32,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl CommandOutput {
    /// Successful empty output
    pub fn ok() -> Self {
        Self {
            code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Successful output with the given stdout
    pub fn with_stdout(stdout: &str) -> Self {
        Self {
            code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: &str) -> Self {
        Self {
            code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    /// Whether the command exited zero
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Synchronous command execution seam
pub trait Executor: Send + Sync {
    /// Run a program with arguments, capturing output
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Run a shell snippet (for pipelines and redirections)
    fn run_shell(&self, script: &str) -> Result<CommandOutput>;
}

/// Executor backed by real subprocesses
pub struct SystemExecutor;

impl SystemExecutor {
    fn capture(mut command: Command, display: &str) -> Result<CommandOutput> {
        let output = command
            .output()
            .map_err(|e| ProvisionError::Command(format!("{}: {}", display, e)))?;

        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

impl Executor for SystemExecutor {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        tracing::debug!("exec: {} {}", program, args.join(" "));
        let mut command = Command::new(program);
        command.args(args);
        Self::capture(command, program)
    }

    fn run_shell(&self, script: &str) -> Result<CommandOutput> {
        tracing::debug!("exec: sh -c {:?}", script);
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        Self::capture(command, script)
    }
}

/// Fake executor that records invocations and serves canned outputs
///
/// Outputs are keyed by program name (or, for shell snippets, the literal
/// `sh` key); programs listed as failing return exit code 1. Everything
/// else succeeds with empty output.
#[derive(Default)]
pub struct RecordingExecutor {
    commands: Mutex<Vec<String>>,
    outputs: Mutex<HashMap<String, CommandOutput>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a canned output for a program name
    pub fn set_output(&self, program: &str, output: CommandOutput) {
        self.outputs
            .lock()
            .unwrap()
            .insert(program.to_string(), output);
    }

    /// Make a program fail with exit code 1
    pub fn fail(&self, program: &str) {
        self.set_output(program, CommandOutput::failed(1, "simulated failure"));
    }

    /// All recorded command lines, in invocation order
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Whether any recorded command line contains the needle
    pub fn ran(&self, needle: &str) -> bool {
        self.commands().iter().any(|c| c.contains(needle))
    }

    fn record(&self, line: String, key: &str) -> Result<CommandOutput> {
        self.commands.lock().unwrap().push(line);
        let output = self
            .outputs
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_else(CommandOutput::ok);
        Ok(output)
    }
}

impl Executor for RecordingExecutor {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let line = if args.is_empty() {
            program.to_string()
        } else {
            format!("{} {}", program, args.join(" "))
        };
        self.record(line, program)
    }

    fn run_shell(&self, script: &str) -> Result<CommandOutput> {
        self.record(script.to_string(), "sh")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_executor_captures_stdout() {
        let executor = SystemExecutor;
        let output = executor.run("echo", &["hello"]).unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[test]
    fn test_system_executor_shell() {
        let executor = SystemExecutor;
        let output = executor.run_shell("echo a && echo b").unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "a\nb\n");
    }

    #[test]
    fn test_recording_executor_records_in_order() {
        let executor = RecordingExecutor::new();
        executor.run("apt-get", &["update"]).unwrap();
        executor.run_shell("mount -a").unwrap();

        let commands = executor.commands();
        assert_eq!(commands, vec!["apt-get update", "mount -a"]);
        assert!(executor.ran("apt-get"));
    }

    #[test]
    fn test_recording_executor_canned_output() {
        let executor = RecordingExecutor::new();
        executor.set_output("docker", CommandOutput::with_stdout("Docker version 24.0.7"));
        executor.fail("mount");

        let ok = executor.run("docker", &["--version"]).unwrap();
        assert!(ok.success());
        assert_eq!(ok.stdout, "Docker version 24.0.7");

        let bad = executor.run("mount", &["-a"]).unwrap();
        assert!(!bad.success());
        assert_eq!(bad.code, 1);
    }
}
