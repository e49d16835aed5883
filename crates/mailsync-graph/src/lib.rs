//! Mailsync Graph - Microsoft Graph API client
//!
//! Provides an async client for the subset of the Microsoft Graph mail API
//! this worker needs:
//! - OAuth2 client-credentials authentication (shared secret or
//!   certificate + thumbprint), with a single-flight in-memory token cache
//! - Message, attachment, subscription, and delta operations
//! - A retry policy shared by every call (transient 5xx/429, JSON-defense
//!   hardening for `list_attachments`)
//!
//! ## Modules
//!
//! - [`auth`] - OAuth2 client-credentials token cache
//! - [`client`] - the low-level HTTP client and retry policy
//! - [`delta`] - delta-page parsing helpers
//! - [`provider`] - [`mailsync_core::ports::IMailProvider`] implementation

pub mod auth;
pub mod client;
pub mod delta;
pub mod provider;

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when communicating with the Microsoft Graph API.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Authentication credentials are invalid, missing, or the token
    /// endpoint rejected the request.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions for the requested operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The delta cursor has expired; the caller must reset and resync.
    #[error("Delta cursor expired (410 Gone)")]
    DeltaExpired,

    /// Rate limit exceeded after exhausting retries.
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests { retry_after: Duration },

    /// A server-side error occurred (5xx) after exhausting retries.
    #[error("Server error: {status}: {body}")]
    ServerError { status: u16, body: String },

    /// A network-level error occurred.
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The response body wasn't the JSON the caller expected, even after
    /// the JSON-defense retries.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GraphError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GraphError::NotFound(_) => Some(404),
            GraphError::Unauthorized(_) => Some(401),
            GraphError::Forbidden(_) => Some(403),
            GraphError::DeltaExpired => Some(410),
            GraphError::TooManyRequests { .. } => Some(429),
            GraphError::ServerError { status, .. } => Some(*status),
            _ => None,
        }
    }
}
