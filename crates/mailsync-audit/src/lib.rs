//! Mailsync Audit - case-event logging for the mail ingestion worker
//!
//! Wraps [`mailsync_core::ports::IMailRepository::insert_case_event`] with
//! convenience methods for each event the ingestion pipeline and admin
//! surface record against a case: creation, message threading, and status
//! changes.

pub mod logger;

pub use logger::CaseEventLogger;
