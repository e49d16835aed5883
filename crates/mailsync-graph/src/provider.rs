//! `GraphMailProvider` - [`IMailProvider`] implementation for Microsoft
//! Graph mail.
//!
//! Wraps [`GraphClient`] and delegates to [`crate::delta`] to fulfil the
//! port contract; folder codes (`INBOX`, `DRAFTS`, `SENT`, `DELETED`,
//! `JUNK`) are mapped to their Graph well-known folder names the way the
//! original worker's `FOLDER_CODE_TO_GRAPH` does, anything else is passed
//! through as an opaque provider folder id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};

use mailsync_core::ports::{DeltaPage, IMailProvider, ProviderAttachment, ProviderHttpError, SubscriptionReceipt};

use crate::client::{request_json_with_content_type_guard, GraphClient};
use crate::delta::{initial_delta_path, parse_delta_page};
use crate::GraphError;

/// Maps a [`GraphError`] to the port's transport-agnostic
/// [`ProviderHttpError`], so callers like the delta poller can check for
/// `410 Gone` without depending on this crate's own error type.
fn to_provider_error(e: GraphError) -> anyhow::Error {
    match e.status() {
        Some(status) => ProviderHttpError {
            status,
            message: e.to_string(),
        }
        .into(),
        None => e.into(),
    }
}

/// Graph's fixed `$select` projection for a message fetch. `inReplyTo`
/// does not exist in Graph v1.0; `In-Reply-To` is recovered from
/// `internetMessageHeaders` by the ingestion pipeline instead.
const MESSAGE_SELECT: &str = "id,subject,receivedDateTime,sentDateTime,from,toRecipients,ccRecipients,bccRecipients,replyTo,body,internetMessageId,internetMessageHeaders,conversationId,hasAttachments";

fn resolve_folder(folder_code: &str) -> String {
    match folder_code {
        "INBOX" => "Inbox".to_string(),
        "DRAFTS" => "Drafts".to_string(),
        "SENT" => "SentItems".to_string(),
        "DELETED" => "DeletedItems".to_string(),
        "JUNK" => "JunkEmail".to_string(),
        other => other.to_string(),
    }
}

pub struct GraphMailProvider {
    client: GraphClient,
}

impl GraphMailProvider {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IMailProvider for GraphMailProvider {
    async fn get_message(&self, mailbox_email: &str, message_id: &str) -> anyhow::Result<Value> {
        let path = format!(
            "/users/{mailbox_email}/messages/{message_id}?$select={MESSAGE_SELECT}"
        );
        Ok(self.client.request_json(Method::GET, &path, None).await.map_err(to_provider_error)?)
    }

    async fn list_attachments(
        &self,
        mailbox_email: &str,
        message_id: &str,
    ) -> anyhow::Result<Vec<ProviderAttachment>> {
        let path = format!("/users/{mailbox_email}/messages/{message_id}/attachments");
        let body = request_json_with_content_type_guard(&self.client, Method::GET, &path)
            .await
            .map_err(to_provider_error)?;

        let attachments = body
            .get("value")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| {
                let id = item.get("id")?.as_str()?.to_string();
                let name = item
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("attachment")
                    .to_string();
                let content_type = item
                    .get("contentType")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                let size = item.get("size").and_then(|v| v.as_i64()).unwrap_or(0);
                let content_bytes_b64 = item
                    .get("contentBytes")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                Some(ProviderAttachment {
                    id,
                    name,
                    content_type,
                    size,
                    content_bytes_b64,
                })
            })
            .collect();

        Ok(attachments)
    }

    async fn get_attachment_bytes(
        &self,
        mailbox_email: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> anyhow::Result<Vec<u8>> {
        let path = format!(
            "/users/{mailbox_email}/messages/{message_id}/attachments/{attachment_id}"
        );
        let body = self.client.request_json(Method::GET, &path, None).await.map_err(to_provider_error)?;
        let b64 = body
            .get("contentBytes")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("attachment response missing contentBytes"))?;
        Ok(base64::Engine::decode(&base64::engine::general_purpose::STANDARD, b64)?)
    }

    async fn create_subscription(
        &self,
        resource: &str,
        notification_url: &str,
        client_state: &str,
        change_type: &str,
        lifetime_minutes: i64,
    ) -> anyhow::Result<SubscriptionReceipt> {
        let expiration = Utc::now() + chrono::Duration::minutes(lifetime_minutes);
        let payload = json!({
            "changeType": change_type,
            "notificationUrl": notification_url,
            "resource": resource,
            "expirationDateTime": expiration.to_rfc3339(),
            "clientState": client_state,
        });
        let body = self
            .client
            .request_json(Method::POST, "/subscriptions", Some(payload))
            .await
            .map_err(to_provider_error)?;
        parse_subscription_receipt(&body)
    }

    async fn renew_subscription(
        &self,
        subscription_id: &str,
        lifetime_minutes: i64,
    ) -> anyhow::Result<SubscriptionReceipt> {
        let expiration = Utc::now() + chrono::Duration::minutes(lifetime_minutes);
        let payload = json!({ "expirationDateTime": expiration.to_rfc3339() });
        let path = format!("/subscriptions/{subscription_id}");
        let body = self
            .client
            .request_json(Method::PATCH, &path, Some(payload))
            .await
            .map_err(to_provider_error)?;
        parse_subscription_receipt(&body)
    }

    async fn messages_delta_page(
        &self,
        mailbox_email: &str,
        folder_id: &str,
        resume_url: Option<&str>,
        page_size: u32,
    ) -> anyhow::Result<DeltaPage> {
        let path = match resume_url {
            Some(url) => url.to_string(),
            None => {
                let folder = resolve_folder(folder_id);
                initial_delta_path(mailbox_email, &folder, page_size)
            }
        };
        let body = self.client.request_json(Method::GET, &path, None).await.map_err(to_provider_error)?;
        Ok(parse_delta_page(&body))
    }

    async fn send_mail(&self, mailbox_email: &str, message: Value) -> anyhow::Result<()> {
        let path = format!("/users/{mailbox_email}/sendMail");
        let payload = json!({ "message": message, "saveToSentItems": true });
        self.client
            .request_json(Method::POST, &path, Some(payload))
            .await
            .map_err(to_provider_error)?;
        Ok(())
    }
}

fn parse_subscription_receipt(body: &Value) -> anyhow::Result<SubscriptionReceipt> {
    let subscription_id = body
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("subscription response missing id"))?
        .to_string();
    let expires_at = body
        .get("expirationDateTime")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("subscription response missing expirationDateTime"))?;
    let expires_at = DateTime::parse_from_rfc3339(expires_at)?.with_timezone(&Utc);
    Ok(SubscriptionReceipt {
        subscription_id,
        expires_at,
    })
}
