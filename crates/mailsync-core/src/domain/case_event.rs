//! Append-only case audit log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single audit event recorded against a case.
///
/// Append-only: rows are never updated or deleted. `details` carries
/// event-specific structured context (e.g. the provider message id for a
/// `MESSAGE_ADDED` event).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseEvent {
    pub id: i64,
    pub case_id: i64,
    pub actor: String,
    pub source: String,
    pub event_type: CaseEventType,
    pub from_status_id: Option<i64>,
    pub to_status_id: Option<i64>,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

/// The kind of change a [`CaseEvent`] records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseEventType {
    /// A brand-new case was created from an unthreaded message.
    CaseCreated,
    /// A message was threaded onto an existing case.
    MessageAdded,
    /// The case status changed.
    StatusChanged,
}

impl CaseEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseEventType::CaseCreated => "CASE_CREATED",
            CaseEventType::MessageAdded => "MESSAGE_ADDED",
            CaseEventType::StatusChanged => "STATUS_CHANGED",
        }
    }
}

/// The actor recorded for events originated by this worker (as opposed to
/// a human operator acting through the admin HTTP surface).
pub const ACTOR_SYSTEM: &str = "system";

/// The source recorded for events originated by ingestion (webhook or
/// delta poller), as opposed to manual admin action.
pub const SOURCE_INGESTION: &str = "ingestion";
