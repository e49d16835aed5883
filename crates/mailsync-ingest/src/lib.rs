//! Mailsync Ingest - message ingestion pipeline and background workers
//!
//! Orchestrates the ports defined in `mailsync-core` against whatever
//! adapters the caller wires in (`mailsync-graph` for `IMailProvider`,
//! `mailsync-db` for `IMailRepository`):
//! - [`attachments`] - content-addressed attachment store
//! - [`pipeline`] - `ingest(message_id)`, the dedupe/thread/persist sequence
//! - [`delta`] - per-folder delta poller with bounded fan-out
//! - [`subscription`] - push-subscription `ensure()` state machine
//! - [`scheduler`] - the two background loops that drive `delta`/`subscription`

pub mod attachments;
pub mod delta;
pub mod pipeline;
pub mod scheduler;
pub mod subscription;
