//! Per-family deny set and chain rule management
//!
//! A [`ProtocolContext`] owns everything needed for one IP family: the deny
//! set name, the resolved `ipset` and `iptables`/`ip6tables` paths, and the
//! per-chain rule commands. It never retries; the first failing command is
//! returned to the caller.

use crate::core::commands::{self, RuleCommands};
use crate::core::error::Result;
use crate::core::family::Family;
use crate::executor::{CommandOutput, CommandRunner, command_line};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// State and commands for one IP protocol family
#[derive(Debug, Clone)]
pub struct ProtocolContext {
    family: Family,
    set_name: String,
    set_bin: PathBuf,
    rule_bin: PathBuf,
    commands: RuleCommands,
}

impl ProtocolContext {
    /// Builds a context from already resolved binaries.
    pub fn new(
        family: Family,
        set_name: impl Into<String>,
        set_bin: PathBuf,
        rule_bin: PathBuf,
        chains: &[String],
    ) -> Self {
        let set_name = set_name.into();
        let commands = RuleCommands::new(chains, &set_name);
        Self {
            family,
            set_name,
            set_bin,
            rule_bin,
            commands,
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn set_name(&self) -> &str {
        &self.set_name
    }

    pub fn set_bin(&self) -> &Path {
        &self.set_bin
    }

    pub fn rule_bin(&self) -> &Path {
        &self.rule_bin
    }

    pub fn commands(&self) -> &RuleCommands {
        &self.commands
    }

    /// Ensures the deny set exists and every chain carries exactly one drop
    /// rule referencing it.
    ///
    /// Safe to call repeatedly: a rule is only inserted when the check
    /// command reports it absent.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the set cannot be listed or created, or if a check
    /// or insert fails for a reason other than the rule being absent.
    pub async fn check_and_create<R: CommandRunner>(&self, runner: &R) -> Result<()> {
        self.ensure_set(runner).await?;

        for (check, insert) in self.commands.check().iter().zip(self.commands.startup()) {
            let output = runner.run(&self.rule_bin, check).await?;
            if output.success() {
                debug!(
                    "{} rule for set {} already present: {}",
                    self.family,
                    self.set_name,
                    command_line(&self.rule_bin, check)
                );
                continue;
            }
            if !is_rule_absent(&output) {
                return Err(output.into_error(&self.rule_bin, check));
            }

            info!("{} set-up: {}", self.family, command_line(&self.rule_bin, insert));
            self.run_checked(runner, &self.rule_bin, insert).await?;
        }

        Ok(())
    }

    /// Removes the drop rule from every configured chain.
    ///
    /// A rule that is already gone, or that would reference a set that does
    /// not exist yet, counts as removed so that bring-up on a clean system
    /// succeeds. The deny set itself is kept for the next init.
    ///
    /// # Errors
    ///
    /// Returns `Err` on the first delete that fails for any other reason.
    pub async fn shut_down<R: CommandRunner>(&self, runner: &R) -> Result<()> {
        for delete in self.commands.shutdown() {
            let output = runner.run(&self.rule_bin, delete).await?;
            if output.success() {
                info!("{} clean-up: {}", self.family, command_line(&self.rule_bin, delete));
            } else if is_rule_absent(&output)
                || is_set_unknown_to_rules(&output, &self.set_name)
            {
                debug!(
                    "{} rule not present, skipping: {}",
                    self.family,
                    command_line(&self.rule_bin, delete)
                );
            } else {
                return Err(output.into_error(&self.rule_bin, delete));
            }
        }
        Ok(())
    }

    /// Adds `value` to the deny set, replacing the timeout of an existing entry.
    ///
    /// # Errors
    ///
    /// Returns `Err` if ipset rejects the address or cannot be run.
    pub async fn add<R: CommandRunner>(
        &self,
        runner: &R,
        value: &str,
        timeout_secs: Option<u64>,
    ) -> Result<()> {
        let args = commands::set_add_args(&self.set_name, value, timeout_secs);
        self.run_checked(runner, &self.set_bin, &args).await
    }

    /// Removes `value` from the deny set. Removing an absent entry succeeds.
    ///
    /// # Errors
    ///
    /// Returns `Err` if ipset fails for any reason other than the entry
    /// being absent.
    pub async fn delete<R: CommandRunner>(&self, runner: &R, value: &str) -> Result<()> {
        let args = commands::set_del_args(&self.set_name, value);
        let output = runner.run(&self.set_bin, &args).await?;
        if output.success() {
            return Ok(());
        }
        if is_member_absent(&output) {
            debug!("'{value}' not in {}, nothing to delete", self.set_name);
            return Ok(());
        }
        Err(output.into_error(&self.set_bin, &args))
    }

    async fn ensure_set<R: CommandRunner>(&self, runner: &R) -> Result<()> {
        let list = commands::set_exists_args(&self.set_name);
        let output = runner.run(&self.set_bin, &list).await?;
        if output.success() {
            debug!("set {} already exists", self.set_name);
            return Ok(());
        }
        if !is_set_missing(&output) {
            return Err(output.into_error(&self.set_bin, &list));
        }

        let create = commands::set_create_args(self.family, &self.set_name);
        info!("ipset set-up: {}", command_line(&self.set_bin, &create));
        self.run_checked(runner, &self.set_bin, &create).await
    }

    async fn run_checked<R: CommandRunner>(
        &self,
        runner: &R,
        program: &Path,
        args: &[String],
    ) -> Result<()> {
        let output = runner.run(program, args).await?;
        if output.success() {
            Ok(())
        } else {
            Err(output.into_error(program, args))
        }
    }
}

/// `iptables -C`/`-D` exit 1 with "Bad rule (does a matching rule exist in
/// that chain?)" when the rule is not there. Exit 1 is also used for a
/// missing chain, which must stay an error.
fn is_rule_absent(output: &CommandOutput) -> bool {
    output.exit_code == Some(1)
        && (output.stderr.trim().is_empty()
            || output.stderr.contains("does a matching rule exist"))
}

/// iptables refuses `-C`/`-D` with "Set <name> doesn't exist." (exit 2)
/// while the referenced set is gone, e.g. after a reboot. No rule can
/// reference a missing set, so for a delete this means "rule absent".
fn is_set_unknown_to_rules(output: &CommandOutput, set_name: &str) -> bool {
    output
        .stderr
        .contains(&format!("Set {set_name} doesn't exist"))
}

fn is_set_missing(output: &CommandOutput) -> bool {
    output
        .stderr
        .contains("The set with the given name does not exist")
}

fn is_member_absent(output: &CommandOutput) -> bool {
    output.stderr.contains("it's not added")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use crate::core::test_helpers::{RULE_ABSENT, RecordingRunner, SET_MISSING};

    fn context(family: Family, chains: &[&str]) -> ProtocolContext {
        let chains: Vec<String> = chains.iter().map(ToString::to_string).collect();
        ProtocolContext::new(
            family,
            "test-set",
            PathBuf::from("/sbin/ipset"),
            PathBuf::from(format!("/sbin/{}", family.rule_binary())),
            &chains,
        )
    }

    #[tokio::test]
    async fn test_check_and_create_inserts_missing_rule() {
        let runner = RecordingRunner::new();
        runner.script("-name list", CommandOutput::failed(1, SET_MISSING));
        runner.script("-C INPUT", CommandOutput::failed(1, RULE_ABSENT));

        context(Family::V4, &["INPUT"])
            .check_and_create(&runner)
            .await
            .unwrap();

        assert_eq!(
            runner.lines(),
            [
                "/sbin/ipset -name list test-set",
                "/sbin/ipset -exist create test-set hash:net family inet timeout 0",
                "/sbin/iptables -C INPUT -m set --match-set test-set src -j DROP",
                "/sbin/iptables -I INPUT -m set --match-set test-set src -j DROP",
            ]
        );
    }

    #[tokio::test]
    async fn test_check_and_create_keeps_existing_rule() {
        let runner = RecordingRunner::new();

        context(Family::V6, &["INPUT", "FORWARD"])
            .check_and_create(&runner)
            .await
            .unwrap();

        assert_eq!(runner.count("create"), 0);
        assert_eq!(runner.count(" -I "), 0);
        assert_eq!(runner.count(" -C "), 2);
    }

    #[tokio::test]
    async fn test_check_and_create_propagates_unexpected_check_failure() {
        let runner = RecordingRunner::new();
        runner.script(
            "-C INPUT",
            CommandOutput::failed(1, "iptables: No chain/target/match by that name."),
        );

        let err = context(Family::V4, &["INPUT"])
            .check_and_create(&runner)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Command { exit_code: Some(1), .. }));
        assert_eq!(runner.count(" -I "), 0);
    }

    #[tokio::test]
    async fn test_check_and_create_fails_when_set_listing_fails() {
        let runner = RecordingRunner::new();
        runner.script(
            "-name list",
            CommandOutput::failed(1, "Kernel error received: Operation not permitted"),
        );

        let result = context(Family::V4, &["INPUT"]).check_and_create(&runner).await;

        assert!(result.is_err());
        assert_eq!(runner.count(" -C "), 0);
    }

    #[tokio::test]
    async fn test_shut_down_tolerates_absent_rule() {
        let runner = RecordingRunner::new();
        runner.script("-D INPUT", CommandOutput::failed(1, RULE_ABSENT));

        context(Family::V4, &["INPUT", "FORWARD"])
            .shut_down(&runner)
            .await
            .unwrap();

        assert_eq!(runner.count(" -D "), 2);
        assert_eq!(runner.count("ipset"), 0);
    }

    #[tokio::test]
    async fn test_shut_down_tolerates_missing_set() {
        let runner = RecordingRunner::new();
        runner.script(
            " -D ",
            CommandOutput::failed(2, "iptables v1.8.10: Set test-set doesn't exist."),
        );

        context(Family::V4, &["INPUT", "FORWARD"])
            .shut_down(&runner)
            .await
            .unwrap();

        assert_eq!(runner.count(" -D "), 2);
    }

    #[tokio::test]
    async fn test_shut_down_other_set_missing_is_error() {
        let runner = RecordingRunner::new();
        runner.script(
            " -D ",
            CommandOutput::failed(2, "iptables v1.8.10: Set some-other-set doesn't exist."),
        );

        let result = context(Family::V4, &["INPUT"]).shut_down(&runner).await;

        assert!(result.is_err());
    }

    #[test]
    fn test_set_missing_requires_ipset_message() {
        assert!(is_set_missing(&CommandOutput::failed(1, SET_MISSING)));
        assert!(!is_set_missing(&CommandOutput::failed(
            1,
            "ipset v7.19: Kernel error received: file does not exist"
        )));
    }

    #[tokio::test]
    async fn test_shut_down_surfaces_other_failures() {
        let runner = RecordingRunner::new();
        runner.script(
            "-D INPUT",
            CommandOutput::failed(4, "Another app is currently holding the xtables lock."),
        );

        let result = context(Family::V4, &["INPUT", "FORWARD"])
            .shut_down(&runner)
            .await;

        assert!(result.is_err());
        // Stops at the first failure
        assert_eq!(runner.count(" -D FORWARD"), 0);
    }

    #[tokio::test]
    async fn test_add_passes_timeout() {
        let runner = RecordingRunner::new();

        context(Family::V4, &["INPUT"])
            .add(&runner, "192.0.2.7", Some(600))
            .await
            .unwrap();

        assert_eq!(
            runner.lines(),
            ["/sbin/ipset -exist add test-set 192.0.2.7 timeout 600"]
        );
    }

    #[tokio::test]
    async fn test_add_failure_is_error() {
        let runner = RecordingRunner::new();
        runner.script(
            "add",
            CommandOutput::failed(1, "ipset v7.19: Syntax error: '1.2.3' is invalid"),
        );

        let result = context(Family::V4, &["INPUT"])
            .add(&runner, "1.2.3", None)
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delete_absent_member_is_ok() {
        let runner = RecordingRunner::new();
        runner.script(
            "del",
            CommandOutput::failed(
                1,
                "ipset v7.19: Element cannot be deleted from the set: it's not added",
            ),
        );

        context(Family::V4, &["INPUT"])
            .delete(&runner, "192.0.2.7")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_other_failure_is_error() {
        let runner = RecordingRunner::new();
        runner.script(
            "del",
            CommandOutput::failed(1, "ipset v7.19: The set with the given name does not exist"),
        );

        let result = context(Family::V4, &["INPUT"])
            .delete(&runner, "192.0.2.7")
            .await;

        assert!(result.is_err());
    }
}
