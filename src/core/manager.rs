//! Dual-stack enforcement manager
//!
//! [`DualStackManager`] owns the mandatory IPv4 context and the optional IPv6
//! context and exposes the four lifecycle operations. Callers create one
//! instance at startup and share it (e.g. behind an `Arc`) with the workers
//! that apply decisions.
//!
//! # Ordering
//!
//! `add`/`delete` must only run after `init` returned and before `shutdown`
//! is called; concurrent adds and deletes for different addresses are fine.

use crate::config::FirewallConfig;
use crate::core::context::ProtocolContext;
use crate::core::decision::Decision;
use crate::core::error::{Error, Phase, Result};
use crate::core::family::Family;
use crate::executor::{CommandRunner, SystemRunner};
use tracing::{debug, info};

/// Binary managing the deny sets for both families
pub const SET_BINARY: &str = "ipset";

pub struct DualStackManager<R: CommandRunner = SystemRunner> {
    v4: ProtocolContext,
    v6: Option<ProtocolContext>,
    runner: R,
}

impl<R: CommandRunner> DualStackManager<R> {
    /// Resolves the binaries and builds both contexts.
    ///
    /// With `disable_ipv6` set the IPv6 context is skipped entirely and
    /// `ip6tables` is never looked up.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BinaryNotFound`] if `ipset`, `iptables` or (when IPv6
    /// is enabled) `ip6tables` cannot be resolved, and [`Error::Validation`]
    /// if the configuration is invalid.
    pub fn new(config: &FirewallConfig, runner: R) -> Result<Self> {
        config.validate()?;

        let set_bin = resolve(&runner, SET_BINARY)?;
        let v4 = ProtocolContext::new(
            Family::V4,
            &config.ipv4_set_name,
            set_bin.clone(),
            resolve(&runner, Family::V4.rule_binary())?,
            &config.iptables_chains,
        );

        let v6 = if config.disable_ipv6 {
            info!("ipv6 is disabled, only managing {}", config.ipv4_set_name);
            None
        } else {
            Some(ProtocolContext::new(
                Family::V6,
                &config.ipv6_set_name,
                set_bin,
                resolve(&runner, Family::V6.rule_binary())?,
                &config.iptables_chains,
            ))
        };

        Ok(Self { v4, v6, runner })
    }

    pub fn v4(&self) -> &ProtocolContext {
        &self.v4
    }

    pub fn v6(&self) -> Option<&ProtocolContext> {
        self.v6.as_ref()
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn contexts(&self) -> impl Iterator<Item = &ProtocolContext> {
        std::iter::once(&self.v4).chain(self.v6.as_ref())
    }

    /// Flushes any stale rule, then (re)creates set and rules, IPv4 first.
    ///
    /// Fails fast without rolling back; calling `init` again heals whatever
    /// partial state a failure left behind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BringUp`] naming the family and step that failed.
    pub async fn init(&self) -> Result<()> {
        for ctx in self.contexts() {
            info!("iptables for {} initiated", ctx.family());

            ctx.shut_down(&self.runner)
                .await
                .map_err(|e| bring_up(ctx.family(), Phase::Shutdown, e))?;

            ctx.check_and_create(&self.runner)
                .await
                .map_err(|e| bring_up(ctx.family(), Phase::Init, e))?;
        }
        Ok(())
    }

    /// Removes the chain rules, IPv4 first; IPv6 is not attempted if IPv4 fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BringUp`] for the first family whose rules could not
    /// be removed.
    pub async fn shutdown(&self) -> Result<()> {
        for ctx in self.contexts() {
            ctx.shut_down(&self.runner)
                .await
                .map_err(|e| bring_up(ctx.family(), Phase::Shutdown, e))?;
            info!("iptables for {} shut down", ctx.family());
        }
        Ok(())
    }

    /// Bans the decision's address in the matching family's deny set.
    ///
    /// Simulation decisions and IPv6 decisions with IPv6 disabled are
    /// skipped and reported as success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnrecognizedAddress`] if the value matches no family
    /// and [`Error::Ban`] if ipset fails.
    pub async fn add(&self, decision: &Decision) -> Result<()> {
        if decision.is_simulation() {
            debug!(
                "measure against '{}' is in simulation mode, skipping it",
                decision.value
            );
            return Ok(());
        }

        let Some(ctx) = self.route(&decision.value, "adding")? else {
            return Ok(());
        };

        ctx.add(&self.runner, &decision.value, decision.timeout_secs)
            .await
            .map_err(|e| Error::Ban {
                family: ctx.family(),
                value: decision.value.clone(),
                source: Box::new(e),
            })
    }

    /// Removes the decision's address from the matching family's deny set.
    ///
    /// Applied even to simulation decisions: deleting an address that was
    /// never inserted is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnrecognizedAddress`] if the value matches no family
    /// and [`Error::Unban`] if ipset fails.
    pub async fn delete(&self, decision: &Decision) -> Result<()> {
        let Some(ctx) = self.route(&decision.value, "deleting")? else {
            return Ok(());
        };

        ctx.delete(&self.runner, &decision.value)
            .await
            .map_err(|e| Error::Unban {
                family: ctx.family(),
                value: decision.value.clone(),
                source: Box::new(e),
            })
    }

    /// Picks the context for `value`; `Ok(None)` means IPv6 is disabled.
    fn route(&self, value: &str, action: &str) -> Result<Option<&ProtocolContext>> {
        match Family::classify(value) {
            Some(Family::V4) => Ok(Some(&self.v4)),
            Some(Family::V6) => {
                if self.v6.is_none() {
                    debug!("not {action} '{value}' because ipv6 is disabled");
                }
                Ok(self.v6.as_ref())
            }
            None => Err(Error::UnrecognizedAddress(value.to_string())),
        }
    }
}

fn resolve<R: CommandRunner>(runner: &R, name: &str) -> Result<std::path::PathBuf> {
    runner
        .resolve(name)
        .ok_or_else(|| Error::BinaryNotFound(name.to_string()))
}

fn bring_up(family: Family, phase: Phase, source: Error) -> Error {
    Error::BringUp {
        family,
        phase,
        source: Box::new(source),
    }
}
