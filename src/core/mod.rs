//! Core enforcement functionality
//!
//! This module contains the types and logic for programming ipset deny sets
//! and the iptables rules that drop their members. It provides:
//!
//! - [`manager`]: The dual-stack manager exposing init/add/delete/shutdown
//! - [`context`]: Per-family set and rule management
//! - [`commands`]: Pure construction of ipset/iptables argument lists
//! - [`family`]: Address family classification
//! - [`decision`]: The ban/unban instruction consumed from the decision feed
//! - [`error`]: Error types for enforcement operations

pub mod commands;
pub mod context;
pub mod decision;
pub mod error;
pub mod family;
pub mod manager;

#[cfg(test)]
pub mod test_helpers;
