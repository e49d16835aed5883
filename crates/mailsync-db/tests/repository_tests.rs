//! Integration tests for `SqliteMailRepository`
//!
//! Each test creates a fresh in-memory database so tests stay isolated from
//! each other.

use chrono::Utc;
use serde_json::json;

use mailsync_db::{DatabasePool, SqliteMailRepository};
use mailsync_core::domain::{CaseEventType, GraphSubscription, SubscriptionStatus};
use mailsync_core::ports::{IMailRepository, InsertOutcome, NewAttachment, NewCase, NewCaseEvent, NewMessage};

fn new_case_input(mailbox_id: i64) -> NewCase {
    NewCase {
        mailbox_id,
        subject: "Need help with my account".to_string(),
        requester_email: "citizen@example.com".to_string(),
        requester_name: Some("Jane Citizen".to_string()),
        conversation_id: Some("conv-1".to_string()),
        received_at: Utc::now(),
    }
}

fn new_case_event(case_id: i64, to_status_id: i64) -> NewCaseEvent {
    NewCaseEvent {
        case_id,
        actor: "system".to_string(),
        source: "ingestion".to_string(),
        event_type: CaseEventType::CaseCreated,
        from_status_id: None,
        to_status_id: Some(to_status_id),
        details: json!({}),
    }
}

struct Fixture {
    repo: SqliteMailRepository,
    mailbox_id: i64,
    folder_id: i64,
    initial_status_id: i64,
}

async fn fixture() -> Fixture {
    let db = DatabasePool::in_memory()
        .await
        .expect("failed to create in-memory database");
    let pool = db.pool().clone();
    let repo = SqliteMailRepository::new(pool.clone());

    sqlx::query("INSERT INTO mailboxes (email, display_name) VALUES (?, ?)")
        .bind("cases@example.com")
        .bind("Case Intake")
        .execute(&pool)
        .await
        .unwrap();
    let mailbox_id = repo
        .get_mailbox_by_email("cases@example.com")
        .await
        .unwrap()
        .unwrap()
        .id;

    sqlx::query(
        "INSERT INTO mailbox_folders (mailbox_id, provider_folder_id, display_name) VALUES (?, ?, ?)",
    )
    .bind(mailbox_id)
    .bind("INBOX")
    .bind("Inbox")
    .execute(&pool)
    .await
    .unwrap();
    let folder_id = repo.list_monitored_folders(mailbox_id).await.unwrap()[0].id;

    let initial_status_id = repo.get_status_id("NUEVO").await.unwrap().unwrap();

    Fixture {
        repo,
        mailbox_id,
        folder_id,
        initial_status_id,
    }
}

#[tokio::test]
async fn creates_case_with_formatted_case_number() {
    let f = fixture().await;
    let case = f
        .repo
        .create_case(new_case_input(f.mailbox_id), "CASE", f.initial_status_id)
        .await
        .unwrap();

    let year = Utc::now().format("%Y").to_string();
    assert_eq!(case.case_number, format!("CASE-{year}-000001"));
    assert_eq!(case.status_id, f.initial_status_id);
}

#[tokio::test]
async fn case_sequence_increments_monotonically_within_a_year() {
    let f = fixture().await;
    let case1 = f
        .repo
        .create_case(new_case_input(f.mailbox_id), "CASE", f.initial_status_id)
        .await
        .unwrap();
    let case2 = f
        .repo
        .create_case(new_case_input(f.mailbox_id), "CASE", f.initial_status_id)
        .await
        .unwrap();

    assert_ne!(case1.case_number, case2.case_number);
    assert!(case2.case_number > case1.case_number);
}

#[tokio::test]
async fn inserts_message_and_touches_case() {
    let f = fixture().await;
    let case = f
        .repo
        .create_case(new_case_input(f.mailbox_id), "CASE", f.initial_status_id)
        .await
        .unwrap();

    let message = NewMessage {
        mailbox_id: f.mailbox_id,
        case_id: case.id,
        provider_message_id: "graph-msg-1".to_string(),
        conversation_id: Some("conv-1".to_string()),
        in_reply_to: None,
        subject: "Need help with my account".to_string(),
        from_address: Some("citizen@example.com".to_string()),
        from_name: Some("Jane Citizen".to_string()),
        to_recipients: "cases@example.com".to_string(),
        received_at: Utc::now(),
        body_text: Some("please help".to_string()),
        body_html: None,
        has_attachments: false,
    };
    let event = new_case_event(case.id, f.initial_status_id);

    let (outcome, inserted) = f.repo.insert_message(message, event).await.unwrap();
    assert_eq!(outcome, InsertOutcome::Inserted);
    assert_eq!(inserted.provider_message_id, "graph-msg-1");
    assert_eq!(inserted.to_recipients, "cases@example.com");
}

#[tokio::test]
async fn inserting_the_same_message_twice_is_idempotent() {
    let f = fixture().await;
    let case = f
        .repo
        .create_case(new_case_input(f.mailbox_id), "CASE", f.initial_status_id)
        .await
        .unwrap();

    let message = || NewMessage {
        mailbox_id: f.mailbox_id,
        case_id: case.id,
        provider_message_id: "graph-msg-dup".to_string(),
        conversation_id: Some("conv-1".to_string()),
        in_reply_to: None,
        subject: "Need help".to_string(),
        from_address: Some("citizen@example.com".to_string()),
        from_name: None,
        to_recipients: "cases@example.com".to_string(),
        received_at: Utc::now(),
        body_text: None,
        body_html: None,
        has_attachments: false,
    };

    let (first_outcome, first) = f
        .repo
        .insert_message(message(), new_case_event(case.id, f.initial_status_id))
        .await
        .unwrap();
    let (second_outcome, second) = f
        .repo
        .insert_message(message(), new_case_event(case.id, f.initial_status_id))
        .await
        .unwrap();

    assert_eq!(first_outcome, InsertOutcome::Inserted);
    assert_eq!(second_outcome, InsertOutcome::AlreadyExists);
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn find_message_by_provider_id_returns_none_when_absent() {
    let f = fixture().await;
    let found = f
        .repo
        .find_message_by_provider_id(f.mailbox_id, "does-not-exist")
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn finds_most_recently_active_case_for_a_conversation() {
    let f = fixture().await;
    let older = f
        .repo
        .create_case(new_case_input(f.mailbox_id), "CASE", f.initial_status_id)
        .await
        .unwrap();

    let mut newer_input = new_case_input(f.mailbox_id);
    newer_input.conversation_id = Some("conv-1".to_string());
    let newer = f
        .repo
        .create_case(newer_input, "CASE", f.initial_status_id)
        .await
        .unwrap();

    // Both cases share conversation_id "conv-1"; the one with the most
    // recent last_activity_at (newer, just created) should win.
    let found = f
        .repo
        .find_case_by_conversation(f.mailbox_id, "conv-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, newer.id);
    assert_ne!(found.id, older.id);
}

#[tokio::test]
async fn unknown_status_code_returns_none() {
    let f = fixture().await;
    assert!(f.repo.get_status_id("NOT_A_REAL_STATUS").await.unwrap().is_none());
}

#[tokio::test]
async fn inserts_and_retrieves_attachments_after_message() {
    let f = fixture().await;
    let case = f
        .repo
        .create_case(new_case_input(f.mailbox_id), "CASE", f.initial_status_id)
        .await
        .unwrap();
    let message = NewMessage {
        mailbox_id: f.mailbox_id,
        case_id: case.id,
        provider_message_id: "graph-msg-att".to_string(),
        conversation_id: None,
        in_reply_to: None,
        subject: "With attachment".to_string(),
        from_address: None,
        from_name: None,
        to_recipients: "cases@example.com".to_string(),
        received_at: Utc::now(),
        body_text: None,
        body_html: None,
        has_attachments: true,
    };
    let (_, inserted) = f
        .repo
        .insert_message(message, new_case_event(case.id, f.initial_status_id))
        .await
        .unwrap();

    assert!(!f.repo.has_attachments(inserted.id).await.unwrap());

    let attachment = NewAttachment {
        provider_attachment_id: "att-1".to_string(),
        filename: "invoice.pdf".to_string(),
        content_type: "application/pdf".to_string(),
        size_bytes: 4096,
        sha256: "a".repeat(64),
        storage_path: "aa/bb/hash_invoice.pdf".to_string(),
    };
    let inserted_attachments = f
        .repo
        .insert_attachments(inserted.id, vec![attachment])
        .await
        .unwrap();

    assert_eq!(inserted_attachments.len(), 1);
    assert!(f.repo.has_attachments(inserted.id).await.unwrap());
}

#[tokio::test]
async fn subscription_upsert_is_idempotent_on_mailbox_and_resource() {
    let f = fixture().await;
    let resource = "users/cases@example.com/mailFolders/Inbox/messages".to_string();

    let first = f
        .repo
        .upsert_subscription(GraphSubscription {
            id: 0,
            mailbox_id: f.mailbox_id,
            subscription_id: "sub-1".to_string(),
            resource: resource.clone(),
            change_type: "created,updated".to_string(),
            notification_url: "https://worker/graph/webhook".to_string(),
            expires_at: Utc::now(),
            status: SubscriptionStatus::Active,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let mut second = first.clone();
    second.subscription_id = "sub-1-renewed".to_string();
    second.expires_at = Utc::now() + chrono::Duration::hours(1);
    let renewed = f.repo.upsert_subscription(second).await.unwrap();

    assert_eq!(first.id, renewed.id);
    assert_eq!(renewed.subscription_id, "sub-1-renewed");

    let fetched = f
        .repo
        .get_subscription(f.mailbox_id, &resource)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.subscription_id, "sub-1-renewed");
}

#[tokio::test]
async fn delta_state_round_trips_and_resets() {
    let f = fixture().await;

    assert!(f
        .repo
        .get_delta_state(f.mailbox_id, f.folder_id)
        .await
        .unwrap()
        .is_none());

    let saved = f
        .repo
        .save_delta_state(mailsync_core::domain::DeltaState {
            id: 0,
            mailbox_id: f.mailbox_id,
            folder_id: f.folder_id,
            delta_link: Some("https://graph/delta?token=abc".to_string()),
            next_link: None,
            last_sync_at: Some(Utc::now()),
            last_status_code: Some(200),
            last_error: None,
        })
        .await
        .unwrap();

    assert!(saved.delta_link.is_some());

    f.repo
        .reset_delta_state(f.mailbox_id, f.folder_id)
        .await
        .unwrap();

    let after_reset = f
        .repo
        .get_delta_state(f.mailbox_id, f.folder_id)
        .await
        .unwrap()
        .unwrap();
    assert!(after_reset.delta_link.is_none());
    assert!(after_reset.next_link.is_none());
}

#[tokio::test]
async fn in_memory_pool_creation_succeeds() {
    let pool = DatabasePool::in_memory().await;
    assert!(pool.is_ok());
}

#[tokio::test]
async fn file_based_pool_creation_succeeds() {
    let temp_dir = std::env::temp_dir().join(format!("mailsync_test_{}", uuid::Uuid::new_v4()));
    let db_path = temp_dir.join("test.db");

    let pool = DatabasePool::new(&db_path).await;
    assert!(pool.is_ok());

    let _ = std::fs::remove_dir_all(&temp_dir);
}
