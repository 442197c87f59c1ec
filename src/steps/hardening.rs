//! Security hardener
//!
//! Two independent halves: a fail2ban filter/jail pair watching SSH
//! authentication failures, and an sshd_config rewrite that turns off
//! password logins. A failure in one half never prevents the other from
//! running; both are reported together at the end.

use crate::error::{ProvisionError, Result};
use crate::host::HostContext;
use crate::pipeline::{PipelineState, Step, StepPolicy};
use regex::Regex;
use std::path::Path;

/// fail2ban filter matching sshd authentication failures
pub const FILTER_CONF: &str = r#"[Definition]
failregex = ^%(__prefix_line)sFailed (?:password|publickey) for .* from <HOST>(?: port \d+)?(?: ssh\d*)?$
            ^%(__prefix_line)sInvalid user .* from <HOST>
ignoreregex =
"#;

/// fail2ban jail: three strikes, banned for a day
pub const JAIL_CONF: &str = r#"[sshd-rococloud]
enabled  = true
port     = ssh
filter   = sshd-rococloud
logpath  = /var/log/auth.log
maxretry = 3
bantime  = 86400
"#;

/// The SSH/fail2ban hardening step
pub struct HardenStep;

impl HardenStep {
    pub fn new() -> Self {
        Self
    }

    /// Set a global sshd_config directive, replacing active or
    /// commented-out occurrences and appending when absent. Directives
    /// inside `Match` blocks are conditional and left untouched; the
    /// rewrite only covers the section before the first `Match` line.
    pub fn set_directive(contents: &str, key: &str, value: &str) -> String {
        let match_block = Regex::new(r"(?m)^[ \t]*Match\b").expect("static match pattern");
        let (global, conditional) = match match_block.find(contents) {
            Some(m) => contents.split_at(m.start()),
            None => (contents, ""),
        };

        let pattern = Regex::new(&format!(r"(?m)^[ \t#]*{}\b.*$", regex::escape(key)))
            .expect("static directive pattern");
        let directive = format!("{} {}", key, value);

        let global = if pattern.is_match(global) {
            let mut replaced_first = false;
            pattern
                .replace_all(global, |_: &regex::Captures| {
                    if replaced_first {
                        // Later duplicates are silenced rather than repeated
                        format!("# {}", directive)
                    } else {
                        replaced_first = true;
                        directive.clone()
                    }
                })
                .into_owned()
        } else {
            let mut result = global.to_string();
            if !result.is_empty() && !result.ends_with('\n') {
                result.push('\n');
            }
            result.push_str(&directive);
            result.push('\n');
            result
        };

        format!("{}{}", global, conditional)
    }

    fn write_fail2ban(ctx: &HostContext) -> Result<()> {
        let filter = ctx.paths.fail2ban_filter();
        let jail = ctx.paths.fail2ban_jail();

        for (path, contents) in [(&filter, FILTER_CONF), (&jail, JAIL_CONF)] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)?;
        }

        let output = ctx.executor.run("systemctl", &["restart", "fail2ban"])?;
        if !output.success() {
            return Err(ProvisionError::Hardening(format!(
                "fail2ban restart failed: {}",
                output.stderr.trim()
            )));
        }

        Ok(())
    }

    fn harden_sshd(ctx: &HostContext) -> Result<()> {
        let path = ctx.paths.sshd_config();
        if !Path::exists(&path) {
            return Err(ProvisionError::Hardening(format!(
                "{} not found",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(&path)?;
        let contents = Self::set_directive(&contents, "PasswordAuthentication", "no");
        let contents = Self::set_directive(&contents, "PermitRootLogin", "prohibit-password");
        std::fs::write(&path, contents)?;

        let output = ctx.executor.run("systemctl", &["restart", "ssh"])?;
        if !output.success() {
            return Err(ProvisionError::Hardening(format!(
                "ssh restart failed: {}",
                output.stderr.trim()
            )));
        }

        Ok(())
    }
}

impl Default for HardenStep {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for HardenStep {
    fn name(&self) -> &'static str {
        "harden"
    }

    fn policy(&self) -> StepPolicy {
        StepPolicy::BestEffort
    }

    fn summary(&self) -> String {
        "install the SSH fail2ban jail and disable password logins".to_string()
    }

    fn completes(&self) -> PipelineState {
        PipelineState::Hardened
    }

    fn apply(&self, ctx: &HostContext) -> Result<()> {
        let mut failures = Vec::new();

        if let Err(e) = Self::write_fail2ban(ctx) {
            failures.push(e.to_string());
        }
        if let Err(e) = Self::harden_sshd(ctx) {
            failures.push(e.to_string());
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ProvisionError::Hardening(failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvisionConfig;
    use crate::exec::RecordingExecutor;
    use crate::host::HostPaths;
    use std::sync::Arc;

    fn context(root: &std::path::Path) -> (HostContext, Arc<RecordingExecutor>) {
        let config = ProvisionConfig::parse(
            "swarm_token=t\nswarm_ip_address=m\nnfs_ip_address=n\nlocation=siteA\n",
        )
        .unwrap();
        let executor = Arc::new(RecordingExecutor::new());
        let ctx = HostContext::new(config, HostPaths::rooted(root), executor.clone());
        (ctx, executor)
    }

    fn write_sshd_config(ctx: &HostContext, contents: &str) {
        let path = ctx.paths.sshd_config();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_set_directive_replaces_commented() {
        let out = HardenStep::set_directive(
            "#PasswordAuthentication yes\nPort 22\n",
            "PasswordAuthentication",
            "no",
        );
        assert_eq!(out, "PasswordAuthentication no\nPort 22\n");
    }

    #[test]
    fn test_set_directive_replaces_active() {
        let out = HardenStep::set_directive(
            "PermitRootLogin yes\n",
            "PermitRootLogin",
            "prohibit-password",
        );
        assert_eq!(out, "PermitRootLogin prohibit-password\n");
    }

    #[test]
    fn test_set_directive_appends_when_absent() {
        let out = HardenStep::set_directive("Port 22\n", "PasswordAuthentication", "no");
        assert_eq!(out, "Port 22\nPasswordAuthentication no\n");
    }

    #[test]
    fn test_set_directive_silences_duplicates() {
        let out = HardenStep::set_directive(
            "PasswordAuthentication yes\n#PasswordAuthentication yes\n",
            "PasswordAuthentication",
            "no",
        );
        assert_eq!(
            out,
            "PasswordAuthentication no\n# PasswordAuthentication no\n"
        );
    }

    #[test]
    fn test_set_directive_does_not_match_prefix() {
        // PasswordAuthenticationFoo must not match PasswordAuthentication
        let out = HardenStep::set_directive(
            "PasswordAuthenticationFoo yes\n",
            "PasswordAuthentication",
            "no",
        );
        assert!(out.contains("PasswordAuthenticationFoo yes"));
        assert!(out.ends_with("PasswordAuthentication no\n"));
    }

    #[test]
    fn test_set_directive_leaves_match_blocks_alone() {
        let out = HardenStep::set_directive(
            "Port 22\nMatch User backup\n    PasswordAuthentication yes\n",
            "PasswordAuthentication",
            "no",
        );
        // Global directive lands before the Match block; the conditional
        // override inside it stays as it was.
        assert_eq!(
            out,
            "Port 22\nPasswordAuthentication no\nMatch User backup\n    PasswordAuthentication yes\n"
        );
    }

    #[test]
    fn test_set_directive_rewrites_global_before_match() {
        let out = HardenStep::set_directive(
            "#PermitRootLogin yes\nMatch Address 10.0.0.0/8\n    PermitRootLogin yes\n",
            "PermitRootLogin",
            "prohibit-password",
        );
        assert_eq!(
            out,
            "PermitRootLogin prohibit-password\nMatch Address 10.0.0.0/8\n    PermitRootLogin yes\n"
        );
    }

    #[test]
    fn test_writes_jail_and_restarts_services() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, executor) = context(dir.path());
        write_sshd_config(&ctx, "#PasswordAuthentication yes\n#PermitRootLogin yes\n");

        HardenStep::new().apply(&ctx).unwrap();

        let jail = std::fs::read_to_string(ctx.paths.fail2ban_jail()).unwrap();
        assert!(jail.contains("maxretry = 3"));
        assert!(jail.contains("bantime  = 86400"));
        assert!(std::fs::read_to_string(ctx.paths.fail2ban_filter())
            .unwrap()
            .contains("failregex"));

        let sshd = std::fs::read_to_string(ctx.paths.sshd_config()).unwrap();
        assert!(sshd.contains("PasswordAuthentication no"));
        assert!(sshd.contains("PermitRootLogin prohibit-password"));

        assert!(executor.ran("systemctl restart fail2ban"));
        assert!(executor.ran("systemctl restart ssh"));
    }

    #[test]
    fn test_halves_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, executor) = context(dir.path());
        // No sshd_config on disk: the sshd half fails
        executor.fail("systemctl");

        let err = HardenStep::new().apply(&ctx).unwrap_err();
        assert!(matches!(err, ProvisionError::Hardening(_)));

        // The fail2ban artifacts were still written
        assert!(ctx.paths.fail2ban_jail().exists());
        assert!(ctx.paths.fail2ban_filter().exists());
    }
}
