//! CaseEventLogger - high-level case-event logging service
//!
//! Wraps `IMailRepository::insert_case_event()` with convenience methods for
//! each type of auditable case change. All methods are non-fatal: errors in
//! event persistence are logged via `tracing::warn!` but never propagated,
//! so a logging failure never breaks message ingestion.

use std::sync::Arc;

use mailsync_core::domain::{CaseEventType, ACTOR_SYSTEM, SOURCE_INGESTION};
use mailsync_core::ports::{IMailRepository, NewCaseEvent};
use serde_json::json;

/// High-level case-event logger that wraps the mail repository's event
/// persistence.
///
/// All methods silently swallow errors (logging a warning) to ensure
/// audit failures never break ingestion.
pub struct CaseEventLogger {
    repo: Arc<dyn IMailRepository>,
}

impl CaseEventLogger {
    /// Creates a new `CaseEventLogger` backed by the given mail repository.
    pub fn new(repo: Arc<dyn IMailRepository>) -> Self {
        Self { repo }
    }

    /// Persist a case event, swallowing errors with a tracing warning.
    async fn save(&self, event: NewCaseEvent) {
        if let Err(e) = self.repo.insert_case_event(event).await {
            tracing::warn!(error = %e, "failed to save case event");
        }
    }

    /// Log that a brand-new case was created from an unthreaded message.
    pub async fn log_case_created(&self, case_id: i64, initial_status_id: i64) {
        self.save(NewCaseEvent {
            case_id,
            actor: ACTOR_SYSTEM.to_string(),
            source: SOURCE_INGESTION.to_string(),
            event_type: CaseEventType::CaseCreated,
            from_status_id: None,
            to_status_id: Some(initial_status_id),
            details: json!({}),
        })
        .await;
    }

    /// Log that a message was threaded onto an existing case.
    pub async fn log_message_added(&self, case_id: i64, provider_message_id: &str) {
        self.save(NewCaseEvent {
            case_id,
            actor: ACTOR_SYSTEM.to_string(),
            source: SOURCE_INGESTION.to_string(),
            event_type: CaseEventType::MessageAdded,
            from_status_id: None,
            to_status_id: None,
            details: json!({ "provider_message_id": provider_message_id }),
        })
        .await;
    }

    /// Log a case status change, recorded by an admin actor rather than
    /// ingestion.
    pub async fn log_status_changed(
        &self,
        case_id: i64,
        actor: &str,
        from_status_id: i64,
        to_status_id: i64,
    ) {
        self.save(NewCaseEvent {
            case_id,
            actor: actor.to_string(),
            source: "admin".to_string(),
            event_type: CaseEventType::StatusChanged,
            from_status_id: Some(from_status_id),
            to_status_id: Some(to_status_id),
            details: json!({}),
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use mailsync_core::domain::{Attachment, Case, CaseEvent, DeltaState, GraphSubscription, Mailbox, MailboxFolder, Message};
    use mailsync_core::ports::{InsertOutcome, NewAttachment, NewCase, NewMessage};
    use std::sync::Mutex;

    /// Records every event passed to `insert_case_event`; all other
    /// `IMailRepository` methods are unreachable from these tests.
    struct RecordingRepo {
        events: Mutex<Vec<NewCaseEvent>>,
    }

    impl RecordingRepo {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl IMailRepository for RecordingRepo {
        async fn get_mailbox_by_email(&self, _email: &str) -> anyhow::Result<Option<Mailbox>> {
            unreachable!("not exercised by these tests")
        }
        async fn list_monitored_folders(&self, _mailbox_id: i64) -> anyhow::Result<Vec<MailboxFolder>> {
            unreachable!("not exercised by these tests")
        }
        async fn find_message_by_provider_id(
            &self,
            _mailbox_id: i64,
            _provider_message_id: &str,
        ) -> anyhow::Result<Option<Message>> {
            unreachable!("not exercised by these tests")
        }
        async fn find_case_by_conversation(
            &self,
            _mailbox_id: i64,
            _conversation_id: &str,
        ) -> anyhow::Result<Option<Case>> {
            unreachable!("not exercised by these tests")
        }
        async fn get_status_id(&self, _code: &str) -> anyhow::Result<Option<i64>> {
            unreachable!("not exercised by these tests")
        }
        async fn create_case(&self, _case: NewCase, _prefix: &str, _initial_status_id: i64) -> anyhow::Result<Case> {
            unreachable!("not exercised by these tests")
        }
        async fn insert_message(
            &self,
            _message: NewMessage,
            _event: NewCaseEvent,
        ) -> anyhow::Result<(InsertOutcome, Message)> {
            unreachable!("not exercised by these tests")
        }
        async fn has_attachments(&self, _message_id: i64) -> anyhow::Result<bool> {
            unreachable!("not exercised by these tests")
        }
        async fn insert_attachments(
            &self,
            _message_id: i64,
            _attachments: Vec<NewAttachment>,
        ) -> anyhow::Result<Vec<Attachment>> {
            unreachable!("not exercised by these tests")
        }
        async fn insert_case_event(&self, event: NewCaseEvent) -> anyhow::Result<CaseEvent> {
            self.events.lock().unwrap().push(event.clone());
            Ok(CaseEvent {
                id: 1,
                case_id: event.case_id,
                actor: event.actor,
                source: event.source,
                event_type: event.event_type,
                from_status_id: event.from_status_id,
                to_status_id: event.to_status_id,
                details: event.details,
                created_at: Utc::now(),
            })
        }
        async fn get_subscription(
            &self,
            _mailbox_id: i64,
            _resource: &str,
        ) -> anyhow::Result<Option<GraphSubscription>> {
            unreachable!("not exercised by these tests")
        }
        async fn upsert_subscription(&self, _subscription: GraphSubscription) -> anyhow::Result<GraphSubscription> {
            unreachable!("not exercised by these tests")
        }
        async fn get_delta_state(&self, _mailbox_id: i64, _folder_id: i64) -> anyhow::Result<Option<DeltaState>> {
            unreachable!("not exercised by these tests")
        }
        async fn save_delta_state(&self, _state: DeltaState) -> anyhow::Result<DeltaState> {
            unreachable!("not exercised by these tests")
        }
        async fn reset_delta_state(&self, _mailbox_id: i64, _folder_id: i64) -> anyhow::Result<()> {
            unreachable!("not exercised by these tests")
        }
    }

    /// Always fails `insert_case_event`, to verify logging failures never
    /// propagate to the caller.
    struct FailingRepo;

    #[async_trait]
    impl IMailRepository for FailingRepo {
        async fn get_mailbox_by_email(&self, _email: &str) -> anyhow::Result<Option<Mailbox>> {
            unreachable!("not exercised by these tests")
        }
        async fn list_monitored_folders(&self, _mailbox_id: i64) -> anyhow::Result<Vec<MailboxFolder>> {
            unreachable!("not exercised by these tests")
        }
        async fn find_message_by_provider_id(
            &self,
            _mailbox_id: i64,
            _provider_message_id: &str,
        ) -> anyhow::Result<Option<Message>> {
            unreachable!("not exercised by these tests")
        }
        async fn find_case_by_conversation(
            &self,
            _mailbox_id: i64,
            _conversation_id: &str,
        ) -> anyhow::Result<Option<Case>> {
            unreachable!("not exercised by these tests")
        }
        async fn get_status_id(&self, _code: &str) -> anyhow::Result<Option<i64>> {
            unreachable!("not exercised by these tests")
        }
        async fn create_case(&self, _case: NewCase, _prefix: &str, _initial_status_id: i64) -> anyhow::Result<Case> {
            unreachable!("not exercised by these tests")
        }
        async fn insert_message(
            &self,
            _message: NewMessage,
            _event: NewCaseEvent,
        ) -> anyhow::Result<(InsertOutcome, Message)> {
            unreachable!("not exercised by these tests")
        }
        async fn has_attachments(&self, _message_id: i64) -> anyhow::Result<bool> {
            unreachable!("not exercised by these tests")
        }
        async fn insert_attachments(
            &self,
            _message_id: i64,
            _attachments: Vec<NewAttachment>,
        ) -> anyhow::Result<Vec<Attachment>> {
            unreachable!("not exercised by these tests")
        }
        async fn insert_case_event(&self, _event: NewCaseEvent) -> anyhow::Result<CaseEvent> {
            Err(anyhow::anyhow!("simulated storage failure"))
        }
        async fn get_subscription(
            &self,
            _mailbox_id: i64,
            _resource: &str,
        ) -> anyhow::Result<Option<GraphSubscription>> {
            unreachable!("not exercised by these tests")
        }
        async fn upsert_subscription(&self, _subscription: GraphSubscription) -> anyhow::Result<GraphSubscription> {
            unreachable!("not exercised by these tests")
        }
        async fn get_delta_state(&self, _mailbox_id: i64, _folder_id: i64) -> anyhow::Result<Option<DeltaState>> {
            unreachable!("not exercised by these tests")
        }
        async fn save_delta_state(&self, _state: DeltaState) -> anyhow::Result<DeltaState> {
            unreachable!("not exercised by these tests")
        }
        async fn reset_delta_state(&self, _mailbox_id: i64, _folder_id: i64) -> anyhow::Result<()> {
            unreachable!("not exercised by these tests")
        }
    }

    #[tokio::test]
    async fn log_case_created_records_initial_status_transition() {
        let repo = Arc::new(RecordingRepo::new());
        let logger = CaseEventLogger::new(repo.clone());

        logger.log_case_created(42, 1).await;

        let events = repo.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].case_id, 42);
        assert_eq!(events[0].event_type, CaseEventType::CaseCreated);
        assert_eq!(events[0].from_status_id, None);
        assert_eq!(events[0].to_status_id, Some(1));
        assert_eq!(events[0].actor, ACTOR_SYSTEM);
        assert_eq!(events[0].source, SOURCE_INGESTION);
    }

    #[tokio::test]
    async fn log_message_added_records_provider_message_id() {
        let repo = Arc::new(RecordingRepo::new());
        let logger = CaseEventLogger::new(repo.clone());

        logger.log_message_added(7, "graph-msg-99").await;

        let events = repo.events.lock().unwrap();
        assert_eq!(events[0].event_type, CaseEventType::MessageAdded);
        assert_eq!(events[0].details["provider_message_id"], "graph-msg-99");
    }

    #[tokio::test]
    async fn log_status_changed_records_actor_and_transition() {
        let repo = Arc::new(RecordingRepo::new());
        let logger = CaseEventLogger::new(repo.clone());

        logger.log_status_changed(7, "operator@example.com", 1, 2).await;

        let events = repo.events.lock().unwrap();
        assert_eq!(events[0].event_type, CaseEventType::StatusChanged);
        assert_eq!(events[0].actor, "operator@example.com");
        assert_eq!(events[0].source, "admin");
        assert_eq!(events[0].from_status_id, Some(1));
        assert_eq!(events[0].to_status_id, Some(2));
    }

    #[tokio::test]
    async fn logging_failure_is_swallowed_not_propagated() {
        let logger = CaseEventLogger::new(Arc::new(FailingRepo));

        // No panic and no Result to unwrap: failures are logged, not returned.
        logger.log_case_created(1, 1).await;
        logger.log_message_added(1, "graph-msg-1").await;
        logger.log_status_changed(1, "system", 1, 2).await;
    }
}
