//! banset - enforce IP ban decisions with ipset and iptables
//!
//! # Usage
//!
//! ```bash
//! banset init                              # create sets, attach drop rules
//! banset ban 203.0.113.5 --duration 3600   # ban for one hour
//! banset unban 203.0.113.5
//! banset apply decisions.jsonl             # JSON lines, '-' for stdin
//! banset shutdown                          # detach drop rules, keep sets
//! ```
//!
//! Kernel state outlives the process: bans keep being enforced between
//! `init` and `shutdown` regardless of whether banset is running.

use banset::audit::{self, AuditEvent, AuditLog, EventType};
use banset::batch::{self, Action};
use banset::config::{self, FirewallConfig};
use banset::core::error::KernelErrorPattern;
use banset::executor::SystemRunner;
use banset::{Decision, DualStackManager, Error, Result, validators};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::BufReader;
use tracing::{Level, info, warn};

#[derive(Parser)]
#[command(name = "banset")]
#[command(about = "Enforce IP ban decisions with ipset and iptables", long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/banset/config.json)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Chain to attach the drop rule to; repeat for several (overrides config)
    #[arg(long = "chain", global = true, value_name = "CHAIN")]
    chains: Vec<String>,

    /// Only manage IPv4
    #[arg(long, global = true)]
    disable_ipv6: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the deny sets and attach the drop rules (idempotent)
    Init,
    /// Detach the drop rules; the sets and their members are kept
    Shutdown,
    /// Add an address or range to its family's deny set
    Ban {
        value: String,
        /// Decision type; `simulation:` types are logged but not enforced
        #[arg(long = "type", default_value = "ban")]
        kind: String,
        /// Ban lifetime in seconds (default: until removed)
        #[arg(short, long, value_name = "SECONDS")]
        duration: Option<u64>,
    },
    /// Remove an address or range from its family's deny set
    Unban { value: String },
    /// Apply JSON-lines decisions from a file, or stdin when omitted or '-'
    Apply { file: Option<PathBuf> },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to create Tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

/// Prints the error with the matching troubleshooting hints
fn report(err: &Error) {
    eprintln!("Error: {err}");
    let translation = KernelErrorPattern::match_error(
        err.command_stderr()
            .map_or_else(|| err.to_string(), ToString::to_string)
            .as_str(),
    );
    eprintln!("{}", translation.user_message);
    for suggestion in &translation.suggestions {
        eprintln!("  - {suggestion}");
    }
}

async fn load(cli: &Cli) -> Result<FirewallConfig> {
    let mut config = match cli.config.clone().or_else(config::default_config_path) {
        Some(path) => config::load_config(&path).await?,
        None => FirewallConfig::default(),
    };

    if !cli.chains.is_empty() {
        config.iptables_chains.clone_from(&cli.chains);
    }
    if cli.disable_ipv6 {
        config.disable_ipv6 = true;
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load(&cli).await?;

    if !nix::unistd::getuid().is_root() {
        warn!("Not running as root; ipset and iptables will likely refuse changes");
    }

    let manager =
        DualStackManager::new(&config, SystemRunner::with_timeout(config.command_timeout()))?;

    let audit = if config.audit_log {
        match AuditLog::new() {
            Ok(log) => Some(log),
            Err(e) => {
                warn!("Audit log unavailable: {e}");
                None
            }
        }
    } else {
        None
    };
    let audit = audit.as_ref();

    match cli.command {
        Commands::Init => {
            let outcome = manager.init().await;
            audit::record(
                audit,
                AuditEvent::from_outcome(
                    EventType::Init,
                    serde_json::json!({ "chains": config.iptables_chains }),
                    &outcome,
                ),
            )
            .await;
            outcome?;
            info!("deny sets and drop rules are in place");
        }
        Commands::Shutdown => {
            let outcome = manager.shutdown().await;
            audit::record(
                audit,
                AuditEvent::from_outcome(
                    EventType::Shutdown,
                    serde_json::json!({ "chains": config.iptables_chains }),
                    &outcome,
                ),
            )
            .await;
            outcome?;
        }
        Commands::Ban {
            value,
            kind,
            duration,
        } => {
            let mut decision = Decision::new(kind, value);
            decision.timeout_secs = duration;
            warn_if_suspicious(&decision.value);
            batch::apply_decision(&manager, audit, Action::Add, &decision).await?;
        }
        Commands::Unban { value } => {
            batch::apply_decision(&manager, audit, Action::Delete, &Decision::ban(value)).await?;
        }
        Commands::Apply { file } => {
            apply_file(&manager, audit, file).await?;
        }
    }

    Ok(())
}

fn warn_if_suspicious(value: &str) {
    match validators::parse_address(value) {
        Ok(net) => {
            if let Some(note) = validators::check_reserved_ip(net) {
                warn!("{value}: {note}");
            }
        }
        Err(e) => warn!("{e}"),
    }
}

/// Applies a JSON-lines feed from `file`, or stdin when absent or `-`
async fn apply_file(
    manager: &DualStackManager,
    audit: Option<&AuditLog>,
    file: Option<PathBuf>,
) -> Result<()> {
    match file {
        Some(path) if path.as_os_str() != "-" => {
            let reader = BufReader::new(tokio::fs::File::open(path).await?);
            batch::apply_stream(manager, audit, reader).await?;
        }
        _ => {
            batch::apply_stream(manager, audit, BufReader::new(tokio::io::stdin())).await?;
        }
    }
    Ok(())
}
