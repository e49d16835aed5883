//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IMailProvider`] - Cloud mail provider operations (Microsoft Graph)
//! - [`IMailRepository`] - Persistent storage for mailboxes, cases,
//!   messages, attachments, subscriptions, and delta state

pub mod mail_provider;
pub mod mail_repository;

pub use mail_provider::{DeltaPage, IMailProvider, ProviderAttachment, ProviderHttpError, SubscriptionReceipt};
pub use mail_repository::{
    IMailRepository, InsertOutcome, NewAttachment, NewCase, NewCaseEvent, NewMessage,
};
