//! Argument lists for the set-manager and rule-manager binaries
//!
//! Everything here is pure: given a family, a set name and the configured
//! chains it returns owned argument vectors. Nothing is mutated after a
//! [`RuleCommands`] is built.

use crate::core::family::Family;

/// Rule operation encoded by the iptables verb flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleVerb {
    Insert,
    Delete,
    Check,
}

impl RuleVerb {
    pub const fn flag(self) -> &'static str {
        match self {
            RuleVerb::Insert => "-I",
            RuleVerb::Delete => "-D",
            RuleVerb::Check => "-C",
        }
    }
}

/// Builds the drop rule matching sources in `set_name` on `chain`.
pub fn rule_args(verb: RuleVerb, chain: &str, set_name: &str) -> Vec<String> {
    [
        verb.flag(),
        chain,
        "-m",
        "set",
        "--match-set",
        set_name,
        "src",
        "-j",
        "DROP",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Startup, shutdown and check commands, one entry per configured chain
///
/// The three lists always have the same length and the entry at index `i` of
/// each refers to the same chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleCommands {
    chains: Vec<String>,
    startup: Vec<Vec<String>>,
    shutdown: Vec<Vec<String>>,
    check: Vec<Vec<String>>,
}

impl RuleCommands {
    pub fn new(chains: &[String], set_name: &str) -> Self {
        let build = |verb| {
            chains
                .iter()
                .map(|chain| rule_args(verb, chain, set_name))
                .collect()
        };

        Self {
            chains: chains.to_vec(),
            startup: build(RuleVerb::Insert),
            shutdown: build(RuleVerb::Delete),
            check: build(RuleVerb::Check),
        }
    }

    pub fn chains(&self) -> &[String] {
        &self.chains
    }

    pub fn startup(&self) -> &[Vec<String>] {
        &self.startup
    }

    pub fn shutdown(&self) -> &[Vec<String>] {
        &self.shutdown
    }

    pub fn check(&self) -> &[Vec<String>] {
        &self.check
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

/// `ipset -name list <set>`; fails when the set is missing
pub fn set_exists_args(set_name: &str) -> Vec<String> {
    vec!["-name".into(), "list".into(), set_name.into()]
}

/// `ipset -exist create <set> hash:net family <inet|inet6> timeout 0`
///
/// `timeout 0` keeps entries without their own timeout forever while still
/// allowing per-entry timeouts on `add`.
pub fn set_create_args(family: Family, set_name: &str) -> Vec<String> {
    [
        "-exist",
        "create",
        set_name,
        "hash:net",
        "family",
        family.ipset_family(),
        "timeout",
        "0",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

pub fn set_add_args(set_name: &str, value: &str, timeout_secs: Option<u64>) -> Vec<String> {
    let mut args: Vec<String> = vec!["-exist".into(), "add".into(), set_name.into(), value.into()];
    if let Some(secs) = timeout_secs {
        args.push("timeout".into());
        args.push(secs.to_string());
    }
    args
}

pub fn set_del_args(set_name: &str, value: &str) -> Vec<String> {
    vec!["-exist".into(), "del".into(), set_name.into(), value.into()]
}
