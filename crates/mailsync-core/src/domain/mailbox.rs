//! Mailbox and folder entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A shared corporate mailbox monitored by the worker.
///
/// One worker instance operates on exactly one mailbox; `email` is the
/// address used both for Graph API paths and for substitution into the
/// subscription `resource` template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mailbox {
    pub id: i64,
    pub email: String,
    pub display_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A well-known mail folder monitored by the delta poller.
///
/// `provider_folder_id` is either an opaque provider identifier or one of
/// the well-known folder codes (`INBOX`, `DRAFTS`, `SENT`, `DELETED`,
/// `JUNK`); the provider client resolves well-known codes to the form the
/// provider's REST API expects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MailboxFolder {
    pub id: i64,
    pub mailbox_id: i64,
    pub provider_folder_id: String,
    pub display_name: Option<String>,
}
