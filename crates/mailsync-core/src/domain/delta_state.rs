//! Per-folder delta poller cursor state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted cursor state for one `(mailbox_id, folder_id)` pair.
///
/// At most one of `next_link`/`delta_link` is meaningfully "current" at a
/// time: `next_link` present means a prior run stopped mid-pagination and
/// must resume from it; `next_link` absent with `delta_link` present means
/// the folder is caught up and a fresh run starts from the delta cursor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeltaState {
    pub id: i64,
    pub mailbox_id: i64,
    pub folder_id: i64,
    pub delta_link: Option<String>,
    pub next_link: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_status_code: Option<i32>,
    pub last_error: Option<String>,
}

impl DeltaState {
    /// The URL a delta run should resume from, per the original's
    /// `url = next_link or delta_link` precedence: mid-pagination resume
    /// takes priority over a caught-up cursor.
    pub fn resume_url(&self) -> Option<&str> {
        self.next_link
            .as_deref()
            .or(self.delta_link.as_deref())
    }
}

/// Outcome of a single delta run against one folder, returned by the
/// poller and used to decide whether siblings should still be attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaRunOutcome {
    /// Ran to completion; the folder is caught up at `delta_link`.
    Caughtup { delta_link: String },
    /// Hit a page/message cap before catching up; resume from `next_link`
    /// on the next run.
    Paused { next_link: String },
    /// The provider returned 410 Gone; cursor state was reset and the next
    /// run starts fresh.
    Reset,
    /// A non-410 error occurred; the folder's prior cursor state is kept
    /// untouched beyond recording the failure.
    Failed { status_code: Option<i32>, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> DeltaState {
        DeltaState {
            id: 1,
            mailbox_id: 1,
            folder_id: 1,
            delta_link: None,
            next_link: None,
            last_sync_at: None,
            last_status_code: None,
            last_error: None,
        }
    }

    #[test]
    fn resume_prefers_next_link_over_delta_link() {
        let mut state = base();
        state.delta_link = Some("https://graph/delta?token=abc".into());
        state.next_link = Some("https://graph/delta?skip=xyz".into());
        assert_eq!(state.resume_url(), Some("https://graph/delta?skip=xyz"));
    }

    #[test]
    fn resume_falls_back_to_delta_link() {
        let mut state = base();
        state.delta_link = Some("https://graph/delta?token=abc".into());
        assert_eq!(state.resume_url(), Some("https://graph/delta?token=abc"));
    }

    #[test]
    fn resume_is_none_for_fresh_folder() {
        assert_eq!(base().resume_url(), None);
    }
}
