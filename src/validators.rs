//! Input validation for configuration and decision values
//!
//! Chain and set names end up as arguments to iptables and ipset. They are
//! never passed through a shell, but rejecting odd names early gives a clear
//! configuration error instead of a cryptic kernel one.

use ipnetwork::IpNetwork;

/// Longest chain name iptables accepts (`XT_EXTENSION_MAXNAMELEN` - 1)
pub const MAX_CHAIN_NAME: usize = 28;

/// Longest set name ipset accepts (`IPSET_MAXNAMELEN` - 1)
pub const MAX_SET_NAME: usize = 31;

fn check_name(name: &str, max: usize, what: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err(format!("{what} name cannot be empty"));
    }

    if name.len() > max {
        return Err(format!("{what} name too long (max {max} characters)"));
    }

    if name.starts_with('-') {
        return Err(format!("{what} name cannot start with '-'"));
    }

    // ASCII only, so names stay within kernel limits byte for byte
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(format!("{what} name contains invalid characters"));
    }

    Ok(())
}

/// Validates an iptables chain name.
///
/// # Errors
///
/// Returns `Err` if the name is empty, longer than 28 characters, starts
/// with `-`, or contains anything but ASCII alphanumerics, `.`, `-`, `_`.
pub fn validate_chain_name(name: &str) -> Result<(), String> {
    check_name(name, MAX_CHAIN_NAME, "Chain")
}

/// Validates an ipset set name.
///
/// # Errors
///
/// Same rules as [`validate_chain_name`] with a 31 character limit.
pub fn validate_set_name(name: &str) -> Result<(), String> {
    check_name(name, MAX_SET_NAME, "Set")
}

/// Parses a decision value as an address or CIDR range.
///
/// Informational only: dispatch does not depend on it, ipset has the final
/// word on what it accepts.
///
/// # Errors
///
/// Returns `Err` if the value is not a valid address or network.
pub fn parse_address(value: &str) -> Result<IpNetwork, String> {
    value
        .trim()
        .parse::<IpNetwork>()
        .map_err(|e| format!("'{value}' is not a valid address or range: {e}"))
}

/// Checks if a banned address is in a range that is usually a mistake to drop.
///
/// This is informational only and does not block the ban.
pub fn check_reserved_ip(net: IpNetwork) -> Option<String> {
    use std::net::IpAddr;

    if net.prefix() == 0 {
        return Some("Range covers every address of its family".to_string());
    }

    match net.ip() {
        IpAddr::V4(ipv4) => {
            if ipv4.is_loopback() {
                return Some("Loopback range (127.x) - banning it can break local services".to_string());
            }
            if ipv4.is_private() {
                return Some("Private IP range (RFC 1918) - may lock out LAN clients".to_string());
            }
            if ipv4.is_link_local() {
                return Some("Link-local range (169.254.x.x)".to_string());
            }
            None
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() {
                return Some("Loopback address (::1) - banning it can break local services".to_string());
            }
            let first = ipv6.segments()[0];
            if first & 0xffc0 == 0xfe80 {
                return Some("Link-local range (fe80::/10)".to_string());
            }
            if first & 0xfe00 == 0xfc00 {
                return Some("Unique local range (fc00::/7) - may lock out LAN clients".to_string());
            }
            None
        }
    }
}
