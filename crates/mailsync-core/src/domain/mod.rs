//! Domain entities and business logic
//!
//! This module contains the core domain types for the mail ingestion
//! worker:
//! - Mailbox / folder identity
//! - Case and its monotonic case-number sequence
//! - Message, the ingestion pipeline's normalized projection
//! - Attachment and filename sanitization for the content-addressed store
//! - Append-only case event audit log entries
//! - Graph push subscription lifecycle
//! - Per-folder delta poller cursor state
//! - Domain-specific error types

pub mod attachment;
pub mod case;
pub mod case_event;
pub mod delta_state;
pub mod errors;
pub mod mailbox;
pub mod message;
pub mod subscription;

pub use attachment::{sanitize_filename, Attachment, MAX_SANITIZED_FILENAME_LEN};
pub use case::{format_case_number, Case, CaseSequence, CaseStatus, DEFAULT_SLA_STATE};
pub use case_event::{CaseEvent, CaseEventType, ACTOR_SYSTEM, SOURCE_INGESTION};
pub use delta_state::{DeltaRunOutcome, DeltaState};
pub use errors::DomainError;
pub use mailbox::{Mailbox, MailboxFolder};
pub use message::{join_recipients, Message, DEFAULT_SUBJECT, RECIPIENT_DELIMITER};
pub use subscription::{GraphSubscription, SubscriptionEnsureOutcome, SubscriptionStatus};
