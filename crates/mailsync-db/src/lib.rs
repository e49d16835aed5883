//! Mailsync DB - SQLite-backed persistence for the mail ingestion worker
//!
//! SQLite-based storage for:
//! - Mailboxes and their monitored folders
//! - Cases and the monotonic case-number sequence
//! - Messages and attachments
//! - Case audit events
//! - Graph push subscriptions
//! - Delta poller cursor state

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteMailRepository;

/// Errors raised by this crate's own plumbing (connection, migration); all
/// query-level failures surface as `anyhow::Error` through
/// [`mailsync_core::ports::IMailRepository`].
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("database connection failed: {0}")]
    ConnectionFailed(String),
    #[error("schema migration failed: {0}")]
    MigrationFailed(String),
}
