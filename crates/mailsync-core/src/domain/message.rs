//! Message entity: the ingestion pipeline's normalized projection of a
//! provider message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized, persisted mail message.
///
/// Unique on `(mailbox_id, provider_message_id)` — this pair is the dedupe
/// anchor the ingestion pipeline checks before doing any other work.
/// Timestamps are stored as naive UTC (parsed from the provider's ISO 8601
/// `Z`-suffixed values and stripped of offset); conversions to a display
/// timezone happen only at presentation boundaries outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: i64,
    pub mailbox_id: i64,
    pub case_id: i64,
    pub provider_message_id: String,
    pub conversation_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub subject: String,
    pub from_address: Option<String>,
    pub from_name: Option<String>,
    /// Recipient addresses, joined with `;` (not `,` — see the original
    /// source's comma-joined variant, superseded here).
    pub to_recipients: String,
    pub received_at: DateTime<Utc>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub has_attachments: bool,
    pub created_at: DateTime<Utc>,
}

/// Default subject applied when the provider message has no `subject`
/// field or it is empty.
pub const DEFAULT_SUBJECT: &str = "(no subject)";

/// Delimiter used to join the recipient address list.
pub const RECIPIENT_DELIMITER: &str = ";";

/// Joins recipient addresses the way `Message::to_recipients` expects.
pub fn join_recipients<I, S>(addresses: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    addresses
        .into_iter()
        .map(|a| a.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(RECIPIENT_DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_recipients_with_semicolon() {
        let joined = join_recipients(["a@example.com", "b@example.com"]);
        assert_eq!(joined, "a@example.com;b@example.com");
    }

    #[test]
    fn joins_single_recipient_without_delimiter() {
        assert_eq!(join_recipients(["only@example.com"]), "only@example.com");
    }

    #[test]
    fn joins_empty_list_to_empty_string() {
        let empty: Vec<&str> = vec![];
        assert_eq!(join_recipients(empty), "");
    }
}
