//! Mail provider port (driven/secondary port)
//!
//! This module defines the interface for interacting with the cloud mail
//! provider. The primary implementation targets Microsoft Graph
//! (`mailsync-graph`), but the trait is provider-agnostic the way
//! `ICloudProvider` is provider-agnostic in the filesystem-sync lineage
//! this crate is descended from.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are
//!   adapter-specific (HTTP status, transport failure) and don't need
//!   domain-level classification.
//! - Implementations own retry/backoff and token-refresh internally; a use
//!   case calling this trait never retries on its behalf.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// A downcastable error carrying the upstream HTTP status code, so callers
/// like the delta poller can distinguish `410 Gone` (reset cursor) from
/// other failures without depending on the HTTP client crate's own error
/// type.
#[derive(Debug, Error)]
#[error("provider request failed: {status} {message}")]
pub struct ProviderHttpError {
    pub status: u16,
    pub message: String,
}

impl ProviderHttpError {
    pub fn is_gone(&self) -> bool {
        self.status == 410
    }
}

/// A single raw attachment record as returned by the provider, before the
/// content-addressed store validates and persists it.
#[derive(Debug, Clone)]
pub struct ProviderAttachment {
    pub id: String,
    pub name: String,
    pub content_type: Option<String>,
    pub size: i64,
    /// Present when the provider inlined small attachment bytes; `None`
    /// means the caller must fetch the content separately via
    /// [`IMailProvider::get_attachment_bytes`].
    pub content_bytes_b64: Option<String>,
}

/// One page of a delta query response.
#[derive(Debug, Clone)]
pub struct DeltaPage {
    /// Message ids present on this page (`@removed` entries are excluded
    /// by the adapter before this struct is built).
    pub message_ids: Vec<String>,
    /// Present when more pages remain.
    pub next_link: Option<String>,
    /// Present only on the final page; the cursor to resume from next
    /// time the folder is caught up.
    pub delta_link: Option<String>,
}

/// Result of creating or renewing a push subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionReceipt {
    pub subscription_id: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// Port trait for all interactions with the cloud mail provider.
///
/// Implementations handle authentication, retry/backoff for transient
/// errors, and JSON-defense hardening for `list_attachments`; callers never
/// see a raw `reqwest::Error`.
#[async_trait]
pub trait IMailProvider: Send + Sync {
    /// Fetches a single message with the worker's fixed projection
    /// (subject, sender, recipients, timestamps, body, conversation id,
    /// internet message headers).
    async fn get_message(&self, mailbox_email: &str, message_id: &str) -> anyhow::Result<Value>;

    /// Lists an attachment's metadata (and inline bytes when small enough
    /// for the provider to embed them), with JSON-defense retry hardening.
    async fn list_attachments(
        &self,
        mailbox_email: &str,
        message_id: &str,
    ) -> anyhow::Result<Vec<ProviderAttachment>>;

    /// Fetches a single attachment's raw content bytes, for attachments the
    /// provider did not inline.
    async fn get_attachment_bytes(
        &self,
        mailbox_email: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> anyhow::Result<Vec<u8>>;

    /// Creates a push subscription for `resource`, valid until
    /// `lifetime_minutes` from now.
    async fn create_subscription(
        &self,
        resource: &str,
        notification_url: &str,
        client_state: &str,
        change_type: &str,
        lifetime_minutes: i64,
    ) -> anyhow::Result<SubscriptionReceipt>;

    /// Renews an existing subscription, extending `expiration_date_time` by
    /// `lifetime_minutes` from now.
    async fn renew_subscription(
        &self,
        subscription_id: &str,
        lifetime_minutes: i64,
    ) -> anyhow::Result<SubscriptionReceipt>;

    /// Fetches the initial delta page for a folder, or the page at an
    /// absolute `next_link`/`delta_link` URL when `resume_url` is `Some`.
    async fn messages_delta_page(
        &self,
        mailbox_email: &str,
        folder_id: &str,
        resume_url: Option<&str>,
        page_size: u32,
    ) -> anyhow::Result<DeltaPage>;

    /// Sends a new outbound message (contract-only; not orchestrated by
    /// the ingestion pipeline or delta poller).
    async fn send_mail(&self, mailbox_email: &str, message: Value) -> anyhow::Result<()>;
}
