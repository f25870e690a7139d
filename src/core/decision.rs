use serde::{Deserialize, Serialize};

/// Prefix marking a decision as a dry-run measure
pub const SIMULATION_PREFIX: &str = "simulation:";

/// A ban/unban instruction from the decision feed
///
/// Field names follow the feed's JSON (`type`, `value`, `duration`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Remediation type, e.g. `ban` or `simulation:ban`
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,

    /// IPv4/IPv6 address or CIDR range
    pub value: String,

    /// Ban lifetime in seconds; the kernel expires the entry on its own
    #[serde(default, rename = "duration", skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_kind() -> String {
    "ban".to_string()
}

impl Decision {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
            timeout_secs: None,
        }
    }

    /// Shorthand for a plain `ban` decision
    pub fn ban(value: impl Into<String>) -> Self {
        Self::new(default_kind(), value)
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn is_simulation(&self) -> bool {
        self.kind.starts_with(SIMULATION_PREFIX)
    }
}
