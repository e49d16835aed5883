//! SQLite implementation of `IMailRepository`.
//!
//! This module provides the concrete SQLite-based implementation of the
//! mail repository port defined in mailsync-core. It handles domain type
//! (de)serialization and SQL query construction.
//!
//! ## Case-number locking
//!
//! SQLite has no `SELECT ... FOR UPDATE`. `create_case` instead opens a
//! `BEGIN IMMEDIATE` transaction on a dedicated connection before touching
//! `case_sequences`, which takes SQLite's single writer lock up front and
//! gives the same serialization the original's MySQL row lock did: two
//! concurrent ingestions racing to create the first case of the day cannot
//! both read the same `last_value`.

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use mailsync_core::domain::{
    format_case_number, Attachment, Case, CaseEvent, CaseEventType, DeltaState, GraphSubscription,
    Mailbox, MailboxFolder, Message, SubscriptionStatus,
};
use mailsync_core::ports::{
    IMailRepository, InsertOutcome, NewAttachment, NewCase, NewCaseEvent, NewMessage,
};

/// SQLite-based implementation of the mail repository port.
pub struct SqliteMailRepository {
    pool: SqlitePool,
}

impl SqliteMailRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn parse_dt(s: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| anyhow::anyhow!("failed to parse timestamp '{s}': {e}"))
}

fn parse_opt_dt(s: Option<String>) -> anyhow::Result<Option<DateTime<Utc>>> {
    match s {
        Some(ref v) if !v.is_empty() => parse_dt(v).map(Some),
        _ => Ok(None),
    }
}

fn mailbox_from_row(row: &SqliteRow) -> anyhow::Result<Mailbox> {
    Ok(Mailbox {
        id: row.get("id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        is_active: row.get::<i64, _>("is_active") != 0,
        created_at: parse_dt(&row.get::<String, _>("created_at"))?,
    })
}

fn folder_from_row(row: &SqliteRow) -> MailboxFolder {
    MailboxFolder {
        id: row.get("id"),
        mailbox_id: row.get("mailbox_id"),
        provider_folder_id: row.get("provider_folder_id"),
        display_name: row.get("display_name"),
    }
}

fn case_from_row(row: &SqliteRow) -> anyhow::Result<Case> {
    Ok(Case {
        id: row.get("id"),
        mailbox_id: row.get("mailbox_id"),
        case_number: row.get("case_number"),
        status_id: row.get("status_id"),
        subject: row.get("subject"),
        requester_email: row.get("requester_email"),
        requester_name: row.get("requester_name"),
        conversation_id: row.get("conversation_id"),
        received_at: parse_dt(&row.get::<String, _>("received_at"))?,
        last_activity_at: parse_dt(&row.get::<String, _>("last_activity_at"))?,
        is_responded: row.get::<i64, _>("is_responded") != 0,
        sla_state: row.get("sla_state"),
        created_at: parse_dt(&row.get::<String, _>("created_at"))?,
    })
}

fn message_from_row(row: &SqliteRow) -> anyhow::Result<Message> {
    Ok(Message {
        id: row.get("id"),
        mailbox_id: row.get("mailbox_id"),
        case_id: row.get("case_id"),
        provider_message_id: row.get("provider_message_id"),
        conversation_id: row.get("conversation_id"),
        in_reply_to: row.get("in_reply_to"),
        subject: row.get("subject"),
        from_address: row.get("from_address"),
        from_name: row.get("from_name"),
        to_recipients: row.get("to_recipients"),
        received_at: parse_dt(&row.get::<String, _>("received_at"))?,
        body_text: row.get("body_text"),
        body_html: row.get("body_html"),
        has_attachments: row.get::<i64, _>("has_attachments") != 0,
        created_at: parse_dt(&row.get::<String, _>("created_at"))?,
    })
}

fn attachment_from_row(row: &SqliteRow) -> Attachment {
    Attachment {
        id: row.get("id"),
        message_id: row.get("message_id"),
        provider_attachment_id: row.get("provider_attachment_id"),
        filename: row.get("filename"),
        content_type: row.get("content_type"),
        size_bytes: row.get("size_bytes"),
        sha256: row.get("sha256"),
        storage_path: row.get("storage_path"),
    }
}

fn case_event_from_row(row: &SqliteRow) -> anyhow::Result<CaseEvent> {
    let event_type_str: String = row.get("event_type");
    let event_type = match event_type_str.as_str() {
        "CASE_CREATED" => CaseEventType::CaseCreated,
        "MESSAGE_ADDED" => CaseEventType::MessageAdded,
        "STATUS_CHANGED" => CaseEventType::StatusChanged,
        other => anyhow::bail!("unknown case event type '{other}' in storage"),
    };
    let details_str: String = row.get("details");
    Ok(CaseEvent {
        id: row.get("id"),
        case_id: row.get("case_id"),
        actor: row.get("actor"),
        source: row.get("source"),
        event_type,
        from_status_id: row.get("from_status_id"),
        to_status_id: row.get("to_status_id"),
        details: serde_json::from_str(&details_str).unwrap_or(serde_json::Value::Null),
        created_at: parse_dt(&row.get::<String, _>("created_at"))?,
    })
}

fn subscription_from_row(row: &SqliteRow) -> anyhow::Result<GraphSubscription> {
    let status_str: String = row.get("status");
    let status = match status_str.as_str() {
        "ACTIVE" => SubscriptionStatus::Active,
        "EXPIRED" => SubscriptionStatus::Expired,
        "REVOKED" => SubscriptionStatus::Revoked,
        other => anyhow::bail!("unknown subscription status '{other}' in storage"),
    };
    Ok(GraphSubscription {
        id: row.get("id"),
        mailbox_id: row.get("mailbox_id"),
        subscription_id: row.get("subscription_id"),
        resource: row.get("resource"),
        change_type: row.get("change_type"),
        notification_url: row.get("notification_url"),
        expires_at: parse_dt(&row.get::<String, _>("expires_at"))?,
        status,
        created_at: parse_dt(&row.get::<String, _>("created_at"))?,
    })
}

fn delta_state_from_row(row: &SqliteRow) -> anyhow::Result<DeltaState> {
    Ok(DeltaState {
        id: row.get("id"),
        mailbox_id: row.get("mailbox_id"),
        folder_id: row.get("folder_id"),
        delta_link: row.get("delta_link"),
        next_link: row.get("next_link"),
        last_sync_at: parse_opt_dt(row.get("last_sync_at"))?,
        last_status_code: row.get("last_status_code"),
        last_error: row.get("last_error"),
    })
}

#[async_trait::async_trait]
impl IMailRepository for SqliteMailRepository {
    async fn get_mailbox_by_email(&self, email: &str) -> anyhow::Result<Option<Mailbox>> {
        let row = sqlx::query("SELECT * FROM mailboxes WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(mailbox_from_row).transpose()
    }

    async fn list_monitored_folders(&self, mailbox_id: i64) -> anyhow::Result<Vec<MailboxFolder>> {
        let rows = sqlx::query("SELECT * FROM mailbox_folders WHERE mailbox_id = ?")
            .bind(mailbox_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(folder_from_row).collect())
    }

    async fn find_message_by_provider_id(
        &self,
        mailbox_id: i64,
        provider_message_id: &str,
    ) -> anyhow::Result<Option<Message>> {
        let row = sqlx::query(
            "SELECT * FROM messages WHERE mailbox_id = ? AND provider_message_id = ?",
        )
        .bind(mailbox_id)
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(message_from_row).transpose()
    }

    async fn find_case_by_conversation(
        &self,
        mailbox_id: i64,
        conversation_id: &str,
    ) -> anyhow::Result<Option<Case>> {
        let row = sqlx::query(
            "SELECT * FROM cases WHERE mailbox_id = ? AND conversation_id = ? \
             ORDER BY last_activity_at DESC LIMIT 1",
        )
        .bind(mailbox_id)
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(case_from_row).transpose()
    }

    async fn get_status_id(&self, code: &str) -> anyhow::Result<Option<i64>> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM case_statuses WHERE code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn create_case(
        &self,
        case: NewCase,
        prefix: &str,
        initial_status_id: i64,
    ) -> anyhow::Result<Case> {
        let year = case.received_at.format("%Y").to_string().parse::<i32>()?;

        let mut conn = self.pool.acquire().await?;
        sqlx::raw_sql("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result = async {
            sqlx::query(
                "INSERT INTO case_sequences (year, last_value) VALUES (?, 0) \
                 ON CONFLICT(year) DO NOTHING",
            )
            .bind(year)
            .execute(&mut *conn)
            .await?;

            sqlx::query("UPDATE case_sequences SET last_value = last_value + 1 WHERE year = ?")
                .bind(year)
                .execute(&mut *conn)
                .await?;

            let sequence: i64 =
                sqlx::query_scalar("SELECT last_value FROM case_sequences WHERE year = ?")
                    .bind(year)
                    .fetch_one(&mut *conn)
                    .await?;

            let case_number = format_case_number(prefix, year, sequence);
            let received_at = case.received_at.to_rfc3339();

            let id: i64 = sqlx::query_scalar(
                "INSERT INTO cases \
                 (mailbox_id, case_number, status_id, subject, requester_email, requester_name, \
                  conversation_id, received_at, last_activity_at, is_responded, sla_state) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?) RETURNING id",
            )
            .bind(case.mailbox_id)
            .bind(&case_number)
            .bind(initial_status_id)
            .bind(&case.subject)
            .bind(&case.requester_email)
            .bind(&case.requester_name)
            .bind(&case.conversation_id)
            .bind(&received_at)
            .bind(&received_at)
            .bind(mailsync_core::domain::DEFAULT_SLA_STATE)
            .fetch_one(&mut *conn)
            .await?;

            let row = sqlx::query("SELECT * FROM cases WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *conn)
                .await?;
            case_from_row(&row)
        }
        .await;

        match result {
            Ok(new_case) => {
                sqlx::raw_sql("COMMIT").execute(&mut *conn).await?;
                tracing::info!(case_number = %new_case.case_number, "created case");
                Ok(new_case)
            }
            Err(err) => {
                let _ = sqlx::raw_sql("ROLLBACK").execute(&mut *conn).await;
                Err(err)
            }
        }
    }

    async fn insert_message(
        &self,
        message: NewMessage,
        event: NewCaseEvent,
    ) -> anyhow::Result<(InsertOutcome, Message)> {
        let mut tx = self.pool.begin().await?;

        if let Some(existing) = sqlx::query(
            "SELECT * FROM messages WHERE mailbox_id = ? AND provider_message_id = ?",
        )
        .bind(message.mailbox_id)
        .bind(&message.provider_message_id)
        .fetch_optional(&mut *tx)
        .await?
        {
            tx.commit().await?;
            return Ok((InsertOutcome::AlreadyExists, message_from_row(&existing)?));
        }

        let received_at = message.received_at.to_rfc3339();
        let insert_result = sqlx::query(
            "INSERT INTO messages \
             (mailbox_id, case_id, provider_message_id, conversation_id, in_reply_to, subject, \
              from_address, from_name, to_recipients, received_at, body_text, body_html, has_attachments) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(message.mailbox_id)
        .bind(message.case_id)
        .bind(&message.provider_message_id)
        .bind(&message.conversation_id)
        .bind(&message.in_reply_to)
        .bind(&message.subject)
        .bind(&message.from_address)
        .bind(&message.from_name)
        .bind(&message.to_recipients)
        .bind(&received_at)
        .bind(&message.body_text)
        .bind(&message.body_html)
        .bind(message.has_attachments as i64)
        .execute(&mut *tx)
        .await;

        // A unique-constraint violation here means a concurrent writer won
        // the same dedupe key between our check above and this insert.
        let message_id = match insert_result {
            Ok(result) => result.last_insert_rowid(),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                let existing = sqlx::query(
                    "SELECT * FROM messages WHERE mailbox_id = ? AND provider_message_id = ?",
                )
                .bind(message.mailbox_id)
                .bind(&message.provider_message_id)
                .fetch_one(&mut *tx)
                .await?;
                tx.commit().await?;
                return Ok((InsertOutcome::AlreadyExists, message_from_row(&existing)?));
            }
            Err(e) => return Err(e.into()),
        };

        sqlx::query("UPDATE cases SET last_activity_at = ? WHERE id = ?")
            .bind(&received_at)
            .bind(message.case_id)
            .execute(&mut *tx)
            .await?;

        let details = serde_json::to_string(&event.details)?;
        sqlx::query(
            "INSERT INTO case_events (case_id, actor, source, event_type, from_status_id, to_status_id, details) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.case_id)
        .bind(&event.actor)
        .bind(&event.source)
        .bind(event.event_type.as_str())
        .bind(event.from_status_id)
        .bind(event.to_status_id)
        .bind(&details)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query("SELECT * FROM messages WHERE id = ?")
            .bind(message_id)
            .fetch_one(&mut *tx)
            .await?;
        let inserted = message_from_row(&row)?;

        tx.commit().await?;
        tracing::info!(message_id, provider_message_id = %inserted.provider_message_id, "inserted message");
        Ok((InsertOutcome::Inserted, inserted))
    }

    async fn has_attachments(&self, message_id: i64) -> anyhow::Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attachments WHERE message_id = ?")
            .bind(message_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn insert_attachments(
        &self,
        message_id: i64,
        attachments: Vec<NewAttachment>,
    ) -> anyhow::Result<Vec<Attachment>> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(attachments.len());

        for attachment in attachments {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO attachments \
                 (message_id, provider_attachment_id, filename, content_type, size_bytes, sha256, storage_path) \
                 VALUES (?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(message_id, provider_attachment_id) DO UPDATE SET filename = excluded.filename \
                 RETURNING id",
            )
            .bind(message_id)
            .bind(&attachment.provider_attachment_id)
            .bind(&attachment.filename)
            .bind(&attachment.content_type)
            .bind(attachment.size_bytes)
            .bind(&attachment.sha256)
            .bind(&attachment.storage_path)
            .fetch_one(&mut *tx)
            .await?;

            let row = sqlx::query("SELECT * FROM attachments WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
            inserted.push(attachment_from_row(&row));
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn insert_case_event(&self, event: NewCaseEvent) -> anyhow::Result<CaseEvent> {
        let details = serde_json::to_string(&event.details)?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO case_events (case_id, actor, source, event_type, from_status_id, to_status_id, details) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(event.case_id)
        .bind(&event.actor)
        .bind(&event.source)
        .bind(event.event_type.as_str())
        .bind(event.from_status_id)
        .bind(event.to_status_id)
        .bind(&details)
        .fetch_one(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM case_events WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        case_event_from_row(&row)
    }

    async fn get_subscription(
        &self,
        mailbox_id: i64,
        resource: &str,
    ) -> anyhow::Result<Option<GraphSubscription>> {
        let row = sqlx::query("SELECT * FROM graph_subscriptions WHERE mailbox_id = ? AND resource = ?")
            .bind(mailbox_id)
            .bind(resource)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn upsert_subscription(
        &self,
        subscription: GraphSubscription,
    ) -> anyhow::Result<GraphSubscription> {
        let expires_at = subscription.expires_at.to_rfc3339();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO graph_subscriptions \
             (mailbox_id, subscription_id, resource, change_type, notification_url, expires_at, status) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(mailbox_id, resource) DO UPDATE SET \
               subscription_id = excluded.subscription_id, \
               change_type = excluded.change_type, \
               notification_url = excluded.notification_url, \
               expires_at = excluded.expires_at, \
               status = excluded.status \
             RETURNING id",
        )
        .bind(subscription.mailbox_id)
        .bind(&subscription.subscription_id)
        .bind(&subscription.resource)
        .bind(&subscription.change_type)
        .bind(&subscription.notification_url)
        .bind(&expires_at)
        .bind(subscription.status.as_str())
        .fetch_one(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM graph_subscriptions WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        subscription_from_row(&row)
    }

    async fn get_delta_state(
        &self,
        mailbox_id: i64,
        folder_id: i64,
    ) -> anyhow::Result<Option<DeltaState>> {
        let row = sqlx::query("SELECT * FROM delta_state WHERE mailbox_id = ? AND folder_id = ?")
            .bind(mailbox_id)
            .bind(folder_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(delta_state_from_row).transpose()
    }

    async fn save_delta_state(&self, state: DeltaState) -> anyhow::Result<DeltaState> {
        let last_sync_at = state.last_sync_at.map(|dt| dt.to_rfc3339());
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO delta_state \
             (mailbox_id, folder_id, delta_link, next_link, last_sync_at, last_status_code, last_error) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(mailbox_id, folder_id) DO UPDATE SET \
               delta_link = excluded.delta_link, \
               next_link = excluded.next_link, \
               last_sync_at = excluded.last_sync_at, \
               last_status_code = excluded.last_status_code, \
               last_error = excluded.last_error \
             RETURNING id",
        )
        .bind(state.mailbox_id)
        .bind(state.folder_id)
        .bind(&state.delta_link)
        .bind(&state.next_link)
        .bind(&last_sync_at)
        .bind(state.last_status_code)
        .bind(&state.last_error)
        .fetch_one(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM delta_state WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        delta_state_from_row(&row)
    }

    async fn reset_delta_state(&self, mailbox_id: i64, folder_id: i64) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE delta_state SET delta_link = NULL, next_link = NULL \
             WHERE mailbox_id = ? AND folder_id = ?",
        )
        .bind(mailbox_id)
        .bind(folder_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
