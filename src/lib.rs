//! banset - ipset/iptables enforcement backend for IP ban decisions
//!
//! Keeps one ipset deny set per IP family and makes sure the configured
//! iptables/ip6tables chains drop traffic from its members.
//!
//! # Architecture
//!
//! - [`core`] - Deny set and chain rule lifecycle, address family dispatch
//! - [`executor`] - Running ipset/iptables and resolving their paths
//! - [`config`] - Configuration model and loading
//! - [`validators`] - Input validation
//! - [`audit`] - Audit trail of enforcement actions
//! - [`batch`] - Applying JSON-lines decision feeds
//! - [`utils`] - Utility functions (XDG directories)
//!
//! # Lifecycle
//!
//! ```no_run
//! use banset::{Decision, DualStackManager, config::FirewallConfig, executor::SystemRunner};
//!
//! # async fn example() -> banset::Result<()> {
//! let config = FirewallConfig::default();
//! let manager = DualStackManager::new(&config, SystemRunner::with_timeout(config.command_timeout()))?;
//!
//! manager.init().await?;
//! manager.add(&Decision::ban("203.0.113.5")).await?;
//! manager.delete(&Decision::ban("203.0.113.5")).await?;
//! manager.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod batch;
pub mod config;
pub mod core;
pub mod executor;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::decision::Decision;
pub use core::error::{Error, ErrorCategory, Result};
pub use core::family::Family;
pub use core::manager::DualStackManager;
