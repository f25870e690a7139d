//! Address family classification
//!
//! Decisions carry their target as a plain string. The family is picked by
//! sniffing for a colon (IPv6) or a dot (IPv4), which agrees with a real
//! address parser for every well-formed address and CIDR range. The colon is
//! checked first so a value can never select both families; validating the
//! address itself is left to ipset.

/// IP protocol family, one deny set and one rule binary each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Family {
    #[strum(serialize = "ipv4")]
    V4,
    #[strum(serialize = "ipv6")]
    V6,
}

impl Family {
    /// Returns the family `value` belongs to, or `None` for unrecognised input.
    pub fn classify(value: &str) -> Option<Self> {
        if value.contains(':') {
            Some(Family::V6)
        } else if value.contains('.') {
            Some(Family::V4)
        } else {
            None
        }
    }

    /// Rule-manager binary for this family
    pub const fn rule_binary(self) -> &'static str {
        match self {
            Family::V4 => "iptables",
            Family::V6 => "ip6tables",
        }
    }

    /// `family` argument for `ipset create`
    pub const fn ipset_family(self) -> &'static str {
        match self {
            Family::V4 => "inet",
            Family::V6 => "inet6",
        }
    }
}
