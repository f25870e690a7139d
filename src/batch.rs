//! Applying decision feeds
//!
//! A feed is JSON lines, one decision per line:
//!
//! ```text
//! {"action":"add","type":"ban","value":"192.0.2.1","duration":3600}
//! {"action":"delete","value":"2001:db8::/32"}
//! ```
//!
//! A line that cannot be parsed or applied is logged and skipped; the rest of
//! the feed is still applied.

use crate::audit::{self, AuditEvent, AuditLog, EventType};
use crate::core::decision::Decision;
use crate::core::error::{Error, Result};
use crate::core::manager::DualStackManager;
use crate::executor::CommandRunner;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Add,
    Delete,
}

/// One line of a decision feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub action: Action,
    #[serde(flatten)]
    pub decision: Decision,
}

/// Counts for a fully applied feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub applied: usize,
    pub failed: usize,
}

/// Applies one decision and records the outcome in the audit log.
///
/// # Errors
///
/// Returns whatever [`DualStackManager::add`] or [`DualStackManager::delete`]
/// returned.
pub async fn apply_decision<R: CommandRunner>(
    manager: &DualStackManager<R>,
    audit: Option<&AuditLog>,
    action: Action,
    decision: &Decision,
) -> Result<()> {
    let (outcome, event_type) = match action {
        Action::Add => (manager.add(decision).await, EventType::Ban),
        Action::Delete => (manager.delete(decision).await, EventType::Unban),
    };
    audit::record(
        audit,
        AuditEvent::from_outcome(
            event_type,
            serde_json::json!({
                "type": decision.kind,
                "value": decision.value,
                "duration": decision.timeout_secs,
            }),
            &outcome,
        ),
    )
    .await;
    outcome
}

/// Applies every decision in `reader`.
///
/// # Errors
///
/// Returns [`Error::Io`] if the feed cannot be read and
/// [`Error::BatchFailed`] once the whole feed was processed if any line was
/// malformed or failed to apply.
pub async fn apply_stream<R, B>(
    manager: &DualStackManager<R>,
    audit: Option<&AuditLog>,
    reader: B,
) -> Result<BatchSummary>
where
    R: CommandRunner,
    B: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut summary = BatchSummary::default();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let event: DecisionEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!("line {line_no}: skipping malformed decision: {e}");
                summary.failed += 1;
                continue;
            }
        };

        match apply_decision(manager, audit, event.action, &event.decision).await {
            Ok(()) => summary.applied += 1,
            Err(e) => {
                error!("line {line_no}: {} error: {e}", e.category());
                summary.failed += 1;
            }
        }
    }

    info!(
        "applied {} decision(s), {} failed",
        summary.applied, summary.failed
    );
    if summary.failed > 0 {
        return Err(Error::BatchFailed {
            failed: summary.failed,
            total: summary.applied + summary.failed,
        });
    }
    Ok(summary)
}
