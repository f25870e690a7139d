//! Shared test utilities for core module tests
//!
//! Provides a scripted [`CommandRunner`] that records every invocation so
//! tests can assert on the exact kernel commands without touching the real
//! firewall. This module is only compiled in test mode.

use crate::core::error::Result;
use crate::core::family::Family;
use crate::executor::{CommandOutput, CommandRunner, command_line};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// stderr of `iptables -C`/`-D` when the rule is not in the chain
pub const RULE_ABSENT: &str = "iptables: Bad rule (does a matching rule exist in that chain?).";

/// stderr of `ipset list` for an unknown set
pub const SET_MISSING: &str = "ipset v7.19: The set with the given name does not exist";

/// stderr of `iptables -C`/`-D`/`-I` when the referenced set is missing
pub fn set_unknown_to_rules(bin: &str, set: &str) -> String {
    format!("{bin} v1.8.10: Set {set} doesn't exist.")
}

/// Records commands and answers them from a script.
///
/// Commands whose rendered line contains a scripted pattern get the scripted
/// output (first match wins); everything else succeeds.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<String>>,
    script: Mutex<Vec<(String, CommandOutput)>>,
    missing: HashSet<String>,
    resolved: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runner on whose `PATH` the given binaries do not exist
    pub fn without_binaries(names: &[&str]) -> Self {
        Self {
            missing: names.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    pub fn script(&self, pattern: &str, output: CommandOutput) {
        self.script
            .lock()
            .unwrap()
            .push((pattern.to_string(), output));
    }

    /// Removes every scripted answer; all commands succeed afterwards.
    pub fn clear_script(&self) {
        self.script.lock().unwrap().clear();
    }

    /// Rendered command lines, in call order
    pub fn lines(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded commands containing `needle`
    pub fn count(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Binary names looked up through [`CommandRunner::resolve`]
    pub fn resolved(&self) -> Vec<String> {
        self.resolved.lock().unwrap().clone()
    }
}

impl CommandRunner for RecordingRunner {
    async fn run(&self, program: &Path, args: &[String]) -> Result<CommandOutput> {
        let line = command_line(program, args);
        self.calls.lock().unwrap().push(line.clone());

        let output = self
            .script
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map_or_else(CommandOutput::ok, |(_, output)| output.clone());
        Ok(output)
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.resolved.lock().unwrap().push(name.to_string());
        if self.missing.contains(name) {
            None
        } else {
            Some(PathBuf::from(format!("/sbin/{name}")))
        }
    }
}

/// Simulates kernel state so tests can check end state rather than commands
///
/// Tracks which chains carry the drop rule (with duplicates), which sets
/// exist and their members.
#[derive(Default)]
pub struct KernelRunner {
    state: Mutex<KernelState>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct KernelState {
    /// (binary, chain, set) per inserted rule
    pub rules: Vec<(String, String, String)>,
    pub sets: Vec<String>,
    pub members: Vec<(String, String)>,
}

impl KernelRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> KernelState {
        self.state.lock().unwrap().clone()
    }

    pub fn rule_count(&self, family: Family, chain: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .rules
            .iter()
            .filter(|(bin, c, _)| bin == family.rule_binary() && c == chain)
            .count()
    }
}

impl CommandRunner for KernelRunner {
    async fn run(&self, program: &Path, args: &[String]) -> Result<CommandOutput> {
        let bin = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut state = self.state.lock().unwrap();

        let output = if bin == "ipset" {
            match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
                ["-name", "list", set] => {
                    if state.sets.iter().any(|s| s == set) {
                        CommandOutput::ok()
                    } else {
                        CommandOutput::failed(1, SET_MISSING)
                    }
                }
                ["-exist", "create", set, ..] => {
                    if !state.sets.iter().any(|s| s == set) {
                        state.sets.push((*set).to_string());
                    }
                    CommandOutput::ok()
                }
                ["-exist", "add", set, value, ..] => {
                    if !state.sets.iter().any(|s| s == set) {
                        return Ok(CommandOutput::failed(1, SET_MISSING));
                    }
                    let entry = ((*set).to_string(), (*value).to_string());
                    if !state.members.contains(&entry) {
                        state.members.push(entry);
                    }
                    CommandOutput::ok()
                }
                ["-exist", "del", set, value] => {
                    state.members.retain(|(s, v)| s != set || v != value);
                    CommandOutput::ok()
                }
                _ => CommandOutput::failed(2, "unsupported ipset command"),
            }
        } else {
            if !state.sets.contains(&args[5]) {
                return Ok(CommandOutput::failed(2, set_unknown_to_rules(&bin, &args[5])));
            }
            let key = (bin.clone(), args[1].clone(), args[5].clone());
            let present = state.rules.iter().position(|r| *r == key);
            match (args[0].as_str(), present) {
                ("-I", _) => {
                    state.rules.insert(0, key);
                    CommandOutput::ok()
                }
                ("-C", Some(_)) => CommandOutput::ok(),
                ("-D", Some(idx)) => {
                    state.rules.remove(idx);
                    CommandOutput::ok()
                }
                ("-C" | "-D", None) => CommandOutput::failed(1, RULE_ABSENT),
                _ => CommandOutput::failed(2, "unsupported iptables command"),
            }
        };
        Ok(output)
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        Some(PathBuf::from(format!("/sbin/{name}")))
    }
}
