//! Domain error types
//!
//! This module defines error types specific to domain operations: validation
//! failures, unknown configuration lookups, and invalid state transitions.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid email address format
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    /// A case status code is not present in `case_statuses`
    #[error("Unknown case status: {0}")]
    UnknownStatus(String),

    /// Invalid case-number format
    #[error("Invalid case number: {0}")]
    InvalidCaseNumber(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Attachment rejected by the content-addressed store's validation rules
    #[error("Attachment rejected: {0}")]
    AttachmentRejected(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },
}
