//! Mail repository port (driven/secondary port)
//!
//! This module defines the interface for persisting and querying mailbox,
//! case, message, attachment, subscription, and delta-state data. The
//! primary implementation is `mailsync-db`, backed by SQLite via `sqlx`.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific and
//!   don't need domain-level classification at this boundary; callers that
//!   care about a specific domain failure (e.g. an unknown status code)
//!   downcast to [`crate::domain::DomainError`].
//! - Implementations are responsible for wrapping each logical write (case
//!   creation, message insert + case touch, attachment insert) in its own
//!   transaction; this trait exposes each step as an atomic unit, not raw
//!   SQL access.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::{Attachment, Case, CaseEvent, DeltaState, GraphSubscription, Mailbox, MailboxFolder, Message};

/// Input to [`IMailRepository::create_case`].
#[derive(Debug, Clone)]
pub struct NewCase {
    pub mailbox_id: i64,
    pub subject: String,
    pub requester_email: String,
    pub requester_name: Option<String>,
    pub conversation_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Input to [`IMailRepository::insert_message`].
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub mailbox_id: i64,
    pub case_id: i64,
    pub provider_message_id: String,
    pub conversation_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub subject: String,
    pub from_address: Option<String>,
    pub from_name: Option<String>,
    pub to_recipients: String,
    pub received_at: DateTime<Utc>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub has_attachments: bool,
}

/// Input to [`IMailRepository::insert_attachments`].
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub provider_attachment_id: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub storage_path: String,
}

/// Outcome of [`IMailRepository::insert_message`], distinguishing a fresh
/// insert from a race lost to a concurrent writer for the same dedupe key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Port trait for the mail ingestion worker's persistent storage.
#[async_trait]
pub trait IMailRepository: Send + Sync {
    // --- Mailbox / folder ---

    async fn get_mailbox_by_email(&self, email: &str) -> anyhow::Result<Option<Mailbox>>;
    async fn list_monitored_folders(&self, mailbox_id: i64) -> anyhow::Result<Vec<MailboxFolder>>;

    // --- Case / message dedupe and threading ---

    /// Looks up a message by its dedupe anchor `(mailbox_id,
    /// provider_message_id)`.
    async fn find_message_by_provider_id(
        &self,
        mailbox_id: i64,
        provider_message_id: &str,
    ) -> anyhow::Result<Option<Message>>;

    /// Finds the most recently active case for a conversation, if any
    /// message in it has been seen before.
    async fn find_case_by_conversation(
        &self,
        mailbox_id: i64,
        conversation_id: &str,
    ) -> anyhow::Result<Option<Case>>;

    /// Looks up a status id by its pre-seeded code. Returns `Ok(None)` for
    /// an unknown code; the caller maps that to
    /// [`crate::domain::DomainError::UnknownStatus`].
    async fn get_status_id(&self, code: &str) -> anyhow::Result<Option<i64>>;

    /// Allocates the next case number for `year` from the locked
    /// `case_sequences` counter and inserts a new case row in the initial
    /// status, all within a single transaction.
    async fn create_case(&self, case: NewCase, prefix: &str, initial_status_id: i64) -> anyhow::Result<Case>;

    /// Inserts a message row and, in the same transaction, touches the
    /// parent case's `last_activity_at` and appends a [`CaseEvent`].
    /// Returns [`InsertOutcome::AlreadyExists`] instead of an error when a
    /// concurrent writer already inserted the same dedupe key.
    async fn insert_message(
        &self,
        message: NewMessage,
        event: NewCaseEvent,
    ) -> anyhow::Result<(InsertOutcome, Message)>;

    /// Returns `true` if any attachment rows already exist for `message_id`
    /// (used for the attachments-only recovery path).
    async fn has_attachments(&self, message_id: i64) -> anyhow::Result<bool>;

    /// Bulk-inserts attachment rows for `message_id` in a single
    /// transaction, executed strictly after all attachment bytes have been
    /// fetched and written to the content-addressed store.
    async fn insert_attachments(
        &self,
        message_id: i64,
        attachments: Vec<NewAttachment>,
    ) -> anyhow::Result<Vec<Attachment>>;

    async fn insert_case_event(&self, event: NewCaseEvent) -> anyhow::Result<CaseEvent>;

    // --- Subscriptions ---

    async fn get_subscription(
        &self,
        mailbox_id: i64,
        resource: &str,
    ) -> anyhow::Result<Option<GraphSubscription>>;

    /// Idempotent upsert keyed on `(mailbox_id, resource)`.
    async fn upsert_subscription(&self, subscription: GraphSubscription) -> anyhow::Result<GraphSubscription>;

    // --- Delta state ---

    async fn get_delta_state(&self, mailbox_id: i64, folder_id: i64) -> anyhow::Result<Option<DeltaState>>;

    /// Persists cursor state after every page, so an interrupted run
    /// resumes precisely where it left off.
    async fn save_delta_state(&self, state: DeltaState) -> anyhow::Result<DeltaState>;

    /// Clears `delta_link`/`next_link` for a folder after a `410 Gone`
    /// response, forcing the next run to start fresh.
    async fn reset_delta_state(&self, mailbox_id: i64, folder_id: i64) -> anyhow::Result<()>;
}

/// Input to [`IMailRepository::insert_case_event`] / threaded through
/// [`IMailRepository::insert_message`].
#[derive(Debug, Clone)]
pub struct NewCaseEvent {
    pub case_id: i64,
    pub actor: String,
    pub source: String,
    pub event_type: crate::domain::CaseEventType,
    pub from_status_id: Option<i64>,
    pub to_status_id: Option<i64>,
    pub details: Value,
}
