use crate::core::error::{Error, Result};
use crate::utils::get_config_dir;
use crate::validators::{validate_chain_name, validate_set_name};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default deny set for IPv4 decisions
pub const DEFAULT_IPV4_SET: &str = "crowdsec-blacklists";

/// Default deny set for IPv6 decisions
pub const DEFAULT_IPV6_SET: &str = "crowdsec6-blacklists";

/// Enforcement configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirewallConfig {
    /// Chains that get the drop rule, in order
    #[serde(default = "default_chains")]
    pub iptables_chains: Vec<String>,
    /// Skip the IPv6 set, rules and `ip6tables` lookup entirely
    #[serde(default)]
    pub disable_ipv6: bool,
    #[serde(default = "default_ipv4_set")]
    pub ipv4_set_name: String,
    #[serde(default = "default_ipv6_set")]
    pub ipv6_set_name: String,
    /// Upper bound for a single ipset/iptables call; 0 waits forever
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Append every enforcement action to the audit log
    #[serde(default)]
    pub audit_log: bool,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            iptables_chains: default_chains(),
            disable_ipv6: false,
            ipv4_set_name: default_ipv4_set(),
            ipv6_set_name: default_ipv6_set(),
            command_timeout_secs: default_command_timeout(),
            audit_log: false,
        }
    }
}

fn default_chains() -> Vec<String> {
    vec!["INPUT".to_string()]
}

fn default_ipv4_set() -> String {
    DEFAULT_IPV4_SET.to_string()
}

fn default_ipv6_set() -> String {
    DEFAULT_IPV6_SET.to_string()
}

fn default_command_timeout() -> u64 {
    30
}

impl FirewallConfig {
    /// Checks chain and set names against kernel limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.iptables_chains.is_empty() {
            return Err(Error::validation(
                "iptables_chains",
                "at least one chain is required",
            ));
        }
        for chain in &self.iptables_chains {
            validate_chain_name(chain)
                .map_err(|message| Error::validation("iptables_chains", message))?;
        }

        validate_set_name(&self.ipv4_set_name)
            .map_err(|message| Error::validation("ipv4_set_name", message))?;
        validate_set_name(&self.ipv6_set_name)
            .map_err(|message| Error::validation("ipv6_set_name", message))?;

        if self.ipv4_set_name == self.ipv6_set_name {
            return Err(Error::validation(
                "ipv6_set_name",
                "must differ from ipv4_set_name",
            ));
        }

        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Default location: `~/.config/banset/config.json` (or `/root/.config/...`)
pub fn default_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.json"))
}

/// Loads the config from `path`, or returns defaults if the file is missing.
///
/// # Errors
///
/// Returns `Err` if the file exists but cannot be read or parsed. Validation
/// happens when the manager is built.
pub async fn load_config(path: &Path) -> Result<FirewallConfig> {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => Ok(serde_json::from_str(&json)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("no config at {}, using defaults", path.display());
            Ok(FirewallConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}
