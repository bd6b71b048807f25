//! JSONL audit trail.
//!
//! Every run appends events to an audit file, one JSON object per line.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tradegate::OrderIntent;
use tradegate_broker::{AccountHandle, BrokerError, OrderResult, SessionId};

use crate::error::Result;

/// An audit event written to the JSONL trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: BufWriter<std::fs::File>,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }
}

fn intent_json(intent: &OrderIntent) -> serde_json::Value {
    json!({
        "symbol": intent.symbol.as_str(),
        "action": intent.action().as_str(),
        "shares": intent.shares(),
        "price_type": intent.price_type.as_str(),
        "limit": intent.limit_price.map(|p| p.as_dollars()),
        "stop": intent.stop_price.map(|p| p.as_dollars()),
        "term": intent.term.as_str(),
        "session": intent.market_session.as_str(),
    })
}

pub fn log_session_created(
    audit: &mut AuditLog,
    session: SessionId,
    backend: &str,
) -> Result<()> {
    audit.log(
        "session_created",
        json!({ "session": session.to_string(), "backend": backend }),
    )
}

pub fn log_handshake_completed(audit: &mut AuditLog, session: SessionId) -> Result<()> {
    audit.log(
        "handshake_completed",
        json!({ "session": session.to_string() }),
    )
}

pub fn log_account_selected(audit: &mut AuditLog, account: &AccountHandle) -> Result<()> {
    audit.log("account_selected", json!({ "account": account.account_id }))
}

/// `mode` is `"target"`, `"portfolio"` or `"order"`.
pub fn log_plan(
    audit: &mut AuditLog,
    mode: &str,
    source: &str,
    intents: &[OrderIntent],
) -> Result<()> {
    let orders: Vec<_> = intents.iter().map(intent_json).collect();
    audit.log(
        "plan_computed",
        json!({ "mode": mode, "source": source, "orders": orders }),
    )
}

pub fn log_order_placed(
    audit: &mut AuditLog,
    intent: &OrderIntent,
    result: &OrderResult,
) -> Result<()> {
    audit.log(
        "order_placed",
        json!({
            "order": intent_json(intent),
            "client_order_id": result.client_order_id.as_str(),
            "preview_id": result.preview_id,
            "confirmation": result.confirmation,
        }),
    )
}

pub fn log_order_failed(
    audit: &mut AuditLog,
    intent: &OrderIntent,
    error: &BrokerError,
) -> Result<()> {
    let client_order_id = match error {
        BrokerError::OrderPreviewFailed {
            client_order_id, ..
        }
        | BrokerError::OrderPlacementFailed {
            client_order_id, ..
        } => Some(client_order_id.as_str()),
        _ => None,
    };
    audit.log(
        "order_failed",
        json!({
            "order": intent_json(intent),
            "client_order_id": client_order_id,
            "error": error.to_string(),
            "retryable": error.is_retryable(),
        }),
    )
}

pub fn log_run_completed(
    audit: &mut AuditLog,
    planned: usize,
    placed: usize,
    failed: usize,
) -> Result<()> {
    audit.log(
        "run_completed",
        json!({ "planned": planned, "placed": placed, "failed": failed }),
    )
}
