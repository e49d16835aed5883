//! Mailsync Core - Domain logic and business rules for the mail ingestion worker
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Mailbox`, `Case`, `Message`, `Attachment`, `CaseEvent`,
//!   `GraphSubscription`, `DeltaState`, `MailboxFolder`
//! - **Port definitions** - Traits for adapters: `IMailProvider`, `IMailRepository`
//! - **Configuration** - Env-driven `Config` for the worker process
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no external dependencies.
//! Ports define trait interfaces that adapter crates (`mailsync-graph`,
//! `mailsync-db`) implement; orchestration lives in `mailsync-ingest`.

pub mod config;
pub mod domain;
pub mod ports;
