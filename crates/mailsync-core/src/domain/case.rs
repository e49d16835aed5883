//! Case entity and the monotonic case-number sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A case created from an inbound message thread.
///
/// `case_number` follows `PREFIX-YYYY-NNNNNN` (six-digit, zero-padded,
/// monotonic per calendar year) and is assigned once, at creation, from the
/// locked `case_sequences` counter (see [`CaseSequence`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Case {
    pub id: i64,
    pub mailbox_id: i64,
    pub case_number: String,
    pub status_id: i64,
    pub subject: String,
    pub requester_email: String,
    pub requester_name: Option<String>,
    pub conversation_id: Option<String>,
    pub received_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub is_responded: bool,
    pub sla_state: String,
    pub created_at: DateTime<Utc>,
}

/// `sla_state` value assigned to every newly created case; the background
/// SLA tracker (out of scope here) is the only writer that ever changes it.
pub const DEFAULT_SLA_STATE: &str = "OK";

/// Per-year monotonic counter backing `case_number` generation.
///
/// Incremented inside the same write transaction that inserts the new
/// `Case` row, so two concurrent ingestions never observe the same
/// `last_value`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseSequence {
    pub year: i32,
    pub last_value: i64,
}

/// Formats a case number as `PREFIX-YYYY-NNNNNN`.
pub fn format_case_number(prefix: &str, year: i32, sequence: i64) -> String {
    format!("{prefix}-{year:04}-{sequence:06}")
}

/// A pre-seeded case status code (`NUEVO`, `EN_PROCESO`, `RESPONDIDO`,
/// `CERRADO`, ...). Looking one up by an unknown code is a fatal
/// configuration error, never a runtime retry path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseStatus {
    pub id: i64,
    pub code: String,
    pub is_initial: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_case_number_with_zero_padding() {
        assert_eq!(format_case_number("CASE", 2026, 7), "CASE-2026-000007");
        assert_eq!(format_case_number("CASE", 2026, 123456), "CASE-2026-123456");
    }
}
