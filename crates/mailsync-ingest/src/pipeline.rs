//! The message ingestion pipeline: `ingest(message_id)`.
//!
//! Invoked per notification by the webhook receiver and per extracted id
//! by the delta poller. Fetch and persist phases strictly interleave: no
//! DB transaction is held while an upstream HTTP request is in flight.

use std::sync::Arc;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::Value;

use mailsync_core::domain::{join_recipients, CaseEventType, DEFAULT_SUBJECT};
use mailsync_core::ports::{
    IMailProvider, IMailRepository, InsertOutcome, NewAttachment, NewCase, NewCaseEvent, NewMessage,
};

use crate::attachments::AttachmentStore;

/// Placeholder `requester_email` for the rare message whose `from` address
/// Graph omits entirely.
const UNKNOWN_REQUESTER: &str = "unknown@unknown";

/// Outcome of a single `ingest()` call, used by the delta poller's summary
/// logging and by tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new case and message were created.
    NewCase,
    /// The message was threaded onto an existing case.
    Threaded,
    /// The message was already present; attachments were missing and have
    /// now been fetched and stored (attachments-only recovery).
    AttachmentsBackfilled,
    /// The message (and its attachments, if any) were already fully
    /// persisted; nothing changed.
    AlreadyIngested,
}

/// Orchestrates one message's fetch-dedupe-thread-persist-attach sequence
/// against a provider and a repository, both reached through their ports.
pub struct IngestionPipeline {
    provider: Arc<dyn IMailProvider>,
    repo: Arc<dyn IMailRepository>,
    attachments: Arc<AttachmentStore>,
    case_number_prefix: String,
    mailbox_email: String,
}

impl IngestionPipeline {
    pub fn new(
        provider: Arc<dyn IMailProvider>,
        repo: Arc<dyn IMailRepository>,
        attachments: Arc<AttachmentStore>,
        case_number_prefix: String,
        mailbox_email: String,
    ) -> Self {
        Self {
            provider,
            repo,
            attachments,
            case_number_prefix,
            mailbox_email,
        }
    }

    /// Ingests a single message by its provider id.
    pub async fn ingest(&self, mailbox_id: i64, provider_message_id: &str) -> Result<IngestOutcome> {
        if let Some(existing) = self
            .repo
            .find_message_by_provider_id(mailbox_id, provider_message_id)
            .await?
        {
            if existing.has_attachments && !self.repo.has_attachments(existing.id).await? {
                self.ingest_attachments(existing.id, provider_message_id).await?;
                return Ok(IngestOutcome::AttachmentsBackfilled);
            }
            return Ok(IngestOutcome::AlreadyIngested);
        }

        let raw = self
            .provider
            .get_message(&self.mailbox_email, provider_message_id)
            .await
            .context("fetching message")?;
        let projected = project_message(&raw)?;

        let (case_id, is_new_case, initial_status_id) = self.resolve_case(mailbox_id, &projected).await?;

        let new_message = NewMessage {
            mailbox_id,
            case_id,
            provider_message_id: provider_message_id.to_string(),
            conversation_id: projected.conversation_id.clone(),
            in_reply_to: projected.in_reply_to.clone(),
            subject: projected.subject.clone(),
            from_address: projected.from_address.clone(),
            from_name: projected.from_name.clone(),
            to_recipients: projected.to_recipients.clone(),
            received_at: projected.received_at,
            body_text: projected.body_text.clone(),
            body_html: projected.body_html.clone(),
            has_attachments: projected.has_attachments,
        };

        let event = if is_new_case {
            NewCaseEvent {
                case_id,
                actor: mailsync_core::domain::ACTOR_SYSTEM.to_string(),
                source: mailsync_core::domain::SOURCE_INGESTION.to_string(),
                event_type: CaseEventType::CaseCreated,
                from_status_id: None,
                to_status_id: Some(initial_status_id),
                details: serde_json::json!({}),
            }
        } else {
            NewCaseEvent {
                case_id,
                actor: mailsync_core::domain::ACTOR_SYSTEM.to_string(),
                source: mailsync_core::domain::SOURCE_INGESTION.to_string(),
                event_type: CaseEventType::MessageAdded,
                from_status_id: None,
                to_status_id: None,
                details: serde_json::json!({ "provider_message_id": provider_message_id }),
            }
        };

        let (outcome, message) = self.repo.insert_message(new_message, event).await?;
        if outcome == InsertOutcome::AlreadyExists {
            if projected.has_attachments && !self.repo.has_attachments(message.id).await? {
                self.ingest_attachments(message.id, provider_message_id).await?;
                return Ok(IngestOutcome::AttachmentsBackfilled);
            }
            return Ok(IngestOutcome::AlreadyIngested);
        }

        if projected.has_attachments {
            self.ingest_attachments(message.id, provider_message_id).await?;
        }

        Ok(if is_new_case {
            IngestOutcome::NewCase
        } else {
            IngestOutcome::Threaded
        })
    }

    /// Resolves `(case_id, is_new, initial_status_id)` by conversation
    /// threading, creating a new case when no thread match exists.
    async fn resolve_case(&self, mailbox_id: i64, projected: &ProjectedMessage) -> Result<(i64, bool, i64)> {
        if let Some(conversation_id) = &projected.conversation_id {
            if let Some(existing) = self.repo.find_case_by_conversation(mailbox_id, conversation_id).await? {
                return Ok((existing.id, false, existing.status_id));
            }
        }

        let initial_status_id = self
            .repo
            .get_status_id("NUEVO")
            .await?
            .ok_or_else(|| anyhow::anyhow!(mailsync_core::domain::DomainError::UnknownStatus("NUEVO".to_string())))?;

        let case = self
            .repo
            .create_case(
                NewCase {
                    mailbox_id,
                    subject: projected.subject.clone(),
                    requester_email: projected
                        .from_address
                        .clone()
                        .unwrap_or_else(|| UNKNOWN_REQUESTER.to_string()),
                    requester_name: projected.from_name.clone(),
                    conversation_id: projected.conversation_id.clone(),
                    received_at: projected.received_at,
                },
                &self.case_number_prefix,
                initial_status_id,
            )
            .await?;

        Ok((case.id, true, initial_status_id))
    }

    /// Fetches, validates, and stores every attachment for a message,
    /// strictly after the message's own DB transaction has committed, then
    /// bulk-inserts the attachment rows in a second short transaction.
    async fn ingest_attachments(&self, message_id: i64, provider_message_id: &str) -> Result<()> {
        let provider_attachments = self
            .provider
            .list_attachments(&self.mailbox_email, provider_message_id)
            .await
            .context("listing attachments")?;

        let mut new_attachments = Vec::with_capacity(provider_attachments.len());
        for attachment in provider_attachments {
            let bytes = match attachment.content_bytes_b64 {
                Some(b64) => BASE64
                    .decode(b64.as_bytes())
                    .context("decoding inline attachment bytes")?,
                None => self
                    .provider
                    .get_attachment_bytes(&self.mailbox_email, provider_message_id, &attachment.id)
                    .await
                    .context("fetching attachment bytes")?,
            };

            match self
                .attachments
                .save(&attachment.name, attachment.content_type.as_deref(), &bytes)
                .await
            {
                Ok(stored) => new_attachments.push(NewAttachment {
                    provider_attachment_id: attachment.id,
                    filename: attachment.name,
                    content_type: stored.content_type,
                    size_bytes: stored.size_bytes,
                    sha256: stored.sha256,
                    storage_path: stored.storage_path,
                }),
                Err(e) => {
                    tracing::warn!(
                        provider_attachment_id = %attachment.id,
                        error = %e,
                        "attachment rejected by the content-addressed store; skipping"
                    );
                }
            }
        }

        if !new_attachments.is_empty() && !self.repo.has_attachments(message_id).await? {
            self.repo.insert_attachments(message_id, new_attachments).await?;
        }
        Ok(())
    }
}

/// The ingestion pipeline's normalized projection of a fetched message, as
/// specified by §4.5: subject default, recipients joined with `;`,
/// timestamps parsed as UTC, body selected by `contentType`.
struct ProjectedMessage {
    subject: String,
    conversation_id: Option<String>,
    in_reply_to: Option<String>,
    from_address: Option<String>,
    from_name: Option<String>,
    to_recipients: String,
    received_at: DateTime<Utc>,
    body_text: Option<String>,
    body_html: Option<String>,
    has_attachments: bool,
}

fn project_message(raw: &Value) -> Result<ProjectedMessage> {
    let subject = raw
        .get("subject")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SUBJECT)
        .to_string();

    let conversation_id = raw.get("conversationId").and_then(|v| v.as_str()).map(str::to_string);
    let in_reply_to = extract_in_reply_to(raw);

    let from_address = raw
        .pointer("/from/emailAddress/address")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let from_name = raw
        .pointer("/from/emailAddress/name")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let recipient_addresses: Vec<String> = raw
        .get("toRecipients")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|r| r.pointer("/emailAddress/address").and_then(|v| v.as_str()).map(str::to_string))
        .collect();
    let to_recipients = join_recipients(recipient_addresses);

    let received_at = raw
        .get("receivedDateTime")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("message missing receivedDateTime"))?
        .parse::<DateTime<Utc>>()
        .context("parsing receivedDateTime")?;

    let body_content_type = raw.pointer("/body/contentType").and_then(|v| v.as_str()).unwrap_or("");
    let body_content = raw.pointer("/body/content").and_then(|v| v.as_str()).map(str::to_string);
    let (body_text, body_html) = if body_content_type.eq_ignore_ascii_case("html") {
        (None, body_content)
    } else {
        (body_content, None)
    };

    let has_attachments = raw.get("hasAttachments").and_then(|v| v.as_bool()).unwrap_or(false);

    Ok(ProjectedMessage {
        subject,
        conversation_id,
        in_reply_to,
        from_address,
        from_name,
        to_recipients,
        received_at,
        body_text,
        body_html,
        has_attachments,
    })
}

/// Graph v1.0 has no top-level `inReplyTo`; recovers it from
/// `internetMessageHeaders` when the provider included that header.
fn extract_in_reply_to(raw: &Value) -> Option<String> {
    raw.get("internetMessageHeaders")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .find(|h| {
            h.get("name")
                .and_then(|n| n.as_str())
                .is_some_and(|n| n.eq_ignore_ascii_case("In-Reply-To"))
        })
        .and_then(|h| h.get("value"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}
