use crate::core::family::Family;
use std::time::Duration;
use thiserror::Error;

/// Core error types for banset
#[derive(Debug, Error)]
pub enum Error {
    /// A required binary could not be resolved on `PATH`
    #[error("unable to find {0}")]
    BinaryNotFound(String),

    /// The binary exists but could not be started
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The binary did not finish within the configured timeout
    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    /// A kernel command exited unsuccessfully
    #[error("`{command}` failed (exit code {exit_code:?}): {stderr}")]
    Command {
        command: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    /// Bring-up or teardown of one family failed
    #[error("{family} {phase} failed: {source}")]
    BringUp {
        family: Family,
        phase: Phase,
        #[source]
        source: Box<Error>,
    },

    /// Inserting an address into a deny set failed
    #[error("failed inserting ban ip '{value}' for {family} set: {source}")]
    Ban {
        family: Family,
        value: String,
        #[source]
        source: Box<Error>,
    },

    /// Removing an address from a deny set failed
    #[error("failed deleting ban ip '{value}' from {family} set: {source}")]
    Unban {
        family: Family,
        value: String,
        #[source]
        source: Box<Error>,
    },

    /// Some lines of a decision feed were malformed or failed to apply
    #[error("{failed} of {total} decision(s) could not be applied")]
    BatchFailed { failed: usize, total: usize },

    /// The decision value matches neither address family
    #[error("ip '{0}' was not recognised")]
    UnrecognizedAddress(String),

    /// Configuration validation failed
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Lifecycle step a [`Error::BringUp`] happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Phase {
    #[strum(serialize = "init")]
    Init,
    #[strum(serialize = "shutdown")]
    Shutdown,
}

/// Coarse grouping of errors so callers can count malformed input separately
/// from infrastructure failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ErrorCategory {
    /// Missing binaries; fatal to construction
    #[strum(serialize = "environment")]
    Environment,
    /// Init/shutdown failures; fatal to startup
    #[strum(serialize = "bring-up")]
    BringUp,
    /// One decision could not be applied; the feed should continue
    #[strum(serialize = "decision")]
    Decision,
    /// The decision value is not an address of a known family
    #[strum(serialize = "classification")]
    Classification,
    #[strum(serialize = "config")]
    Config,
    #[strum(serialize = "internal")]
    Internal,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::BinaryNotFound(_) => ErrorCategory::Environment,
            Error::BringUp { .. } => ErrorCategory::BringUp,
            Error::Ban { .. } | Error::Unban { .. } | Error::BatchFailed { .. } => {
                ErrorCategory::Decision
            }
            Error::UnrecognizedAddress(_) => ErrorCategory::Classification,
            Error::Validation { .. } | Error::Serialization(_) => ErrorCategory::Config,
            Error::Spawn { .. } | Error::Timeout { .. } | Error::Command { .. } | Error::Io(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Walks nested errors down to the kernel command failure, if any.
    pub fn command_stderr(&self) -> Option<&str> {
        match self {
            Error::Command { stderr, .. } => Some(stderr),
            Error::BringUp { source, .. }
            | Error::Ban { source, .. }
            | Error::Unban { source, .. } => source.command_stderr(),
            _ => None,
        }
    }

    pub(crate) fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// Known iptables/ipset failure texts and their translations
pub struct KernelErrorPattern;

impl KernelErrorPattern {
    /// Matches an error message against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        if lower.contains("permission denied")
            || lower.contains("operation not permitted")
            || lower.contains("you must be root")
        {
            return ErrorTranslation::new("Insufficient permissions to modify firewall state")
                .with_suggestion("Run banset as root")
                .with_suggestion("Or grant CAP_NET_ADMIN to the service unit");
        }

        if lower.contains("unable to find") || lower.contains("no such file") {
            return ErrorTranslation::new("ipset or iptables is not installed or not in PATH")
                .with_suggestion("Install them: sudo apt install ipset iptables  (Debian/Ubuntu)")
                .with_suggestion("Or: sudo dnf install ipset iptables  (Fedora/RHEL)")
                .with_suggestion("Or: sudo pacman -S ipset iptables  (Arch)")
                .with_suggestion("Set disable_ipv6 if ip6tables is unavailable");
        }

        if lower.contains("xtables lock") || lower.contains("resource temporarily unavailable") {
            return ErrorTranslation::new("Another process is holding the xtables lock")
                .with_suggestion("Another firewall manager may be running")
                .with_suggestion("Wait a moment and try again");
        }

        if lower.contains("no chain/target/match by that name") {
            return ErrorTranslation::new("Firewall chain not found")
                .with_suggestion("Check iptables_chains in the configuration")
                .with_suggestion("List chains: sudo iptables -S");
        }

        if lower.contains("set") && (lower.contains("doesn't exist") || lower.contains("does not exist")) {
            return ErrorTranslation::new("Deny set does not exist")
                .with_suggestion("Run `banset init` to create the sets and rules");
        }

        if lower.contains("kernel module") || lower.contains("protocol not supported") {
            return ErrorTranslation::new("ip_set kernel support is not available")
                .with_suggestion("Load the module: sudo modprobe ip_set")
                .with_suggestion("Check: lsmod | grep ip_set");
        }

        if lower.contains("syntax error") || lower.contains("resolving to ipv") {
            return ErrorTranslation::new("Address rejected by ipset")
                .with_suggestion("Check the address belongs to the right family")
                .with_suggestion("Use 192.0.2.1, 192.0.2.0/24, 2001:db8::1 or 2001:db8::/32");
        }

        if lower.contains("timed out") || lower.contains("did not finish") {
            return ErrorTranslation::new("Firewall command timed out")
                .with_suggestion("Check system load: uptime")
                .with_suggestion("Raise command_timeout_secs in the configuration");
        }

        ErrorTranslation::new(format!("Firewall error: {msg}"))
            .with_suggestion("Check the detailed error message for more information")
            .with_suggestion("Verify the rules: sudo iptables -S; sudo ipset list -name")
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_translation() {
        let translation =
            KernelErrorPattern::match_error(&Error::BinaryNotFound("ipset".into()).to_string());
        assert!(translation.user_message.contains("not installed"));
        assert!(translation.suggestions.len() >= 3);
    }

    #[test]
    fn test_missing_chain_translation() {
        let translation =
            KernelErrorPattern::match_error("iptables: No chain/target/match by that name.");
        assert!(translation.user_message.contains("chain"));
        assert!(
            translation
                .suggestions
                .iter()
                .any(|s| s.contains("iptables_chains"))
        );
    }

    #[test]
    fn test_missing_set_translation() {
        let translation = KernelErrorPattern::match_error(
            "ipset v7.19: The set with the given name does not exist",
        );
        assert!(translation.user_message.contains("Deny set"));
    }

    #[test]
    fn test_xtables_lock_translation() {
        let translation = KernelErrorPattern::match_error(
            "Another app is currently holding the xtables lock. Perhaps you want to use the -w option?",
        );
        assert!(translation.user_message.contains("xtables lock"));
    }

    #[test]
    fn test_fallback_translation_keeps_message() {
        let translation = KernelErrorPattern::match_error("something odd");
        assert!(translation.user_message.contains("something odd"));
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::BinaryNotFound("iptables".into()).category(),
            ErrorCategory::Environment
        );
        assert_eq!(
            Error::UnrecognizedAddress("nope".into()).category(),
            ErrorCategory::Classification
        );
        let ban = Error::Ban {
            family: Family::V4,
            value: "192.0.2.1".into(),
            source: Box::new(Error::Command {
                command: "ipset add".into(),
                stderr: "boom".into(),
                exit_code: Some(1),
            }),
        };
        assert_eq!(ban.category(), ErrorCategory::Decision);
        assert_eq!(ban.command_stderr(), Some("boom"));
    }

    #[test]
    fn test_batch_failure_is_not_a_config_error() {
        let err = Error::BatchFailed {
            failed: 2,
            total: 5,
        };
        assert_eq!(err.category(), ErrorCategory::Decision);
        assert_eq!(err.to_string(), "2 of 5 decision(s) could not be applied");
    }

    #[test]
    fn test_ban_message_names_family() {
        let err = Error::Ban {
            family: Family::V6,
            value: "2001:db8::1".into(),
            source: Box::new(Error::UnrecognizedAddress("x".into())),
        };
        assert!(err.to_string().contains("ipv6"));
    }
}
