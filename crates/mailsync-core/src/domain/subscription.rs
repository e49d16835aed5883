//! Graph push-subscription entity and the `ensure()` state machine's
//! inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A provider push (webhook) subscription for one `(mailbox, resource)`
/// pair.
///
/// Unique on `subscription_id` (the provider-assigned id) and on
/// `(mailbox_id, resource)` (this worker's own uniqueness constraint,
/// enforced so `ensure()` never creates a second live subscription for the
/// same resource).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphSubscription {
    pub id: i64,
    pub mailbox_id: i64,
    pub subscription_id: String,
    pub resource: String,
    pub change_type: String,
    pub notification_url: String,
    pub expires_at: DateTime<Utc>,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of a [`GraphSubscription`] as tracked by this worker.
///
/// Distinct from the provider's own notion of subscription validity: a row
/// can be `Active` here while already expired upstream, until the next
/// `ensure()` pass discovers and renews or recreates it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    /// Torn down before its natural expiry, e.g. by a provider-side admin
    /// action. This worker never sets it itself; `ensure()` treats a row
    /// found in this state the same as `Expired` (recreate).
    Revoked,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::Expired => "EXPIRED",
            SubscriptionStatus::Revoked => "REVOKED",
        }
    }
}

/// The outcome of one `ensure()` call, returned to the admin HTTP surface
/// and logged by the background scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SubscriptionEnsureOutcome {
    /// No existing row; a new subscription was created (or would be, in
    /// `dry_run`).
    Created { subscription_id: String },
    /// An active subscription was within the renew threshold and was
    /// renewed (or would be, in `dry_run`).
    Renewed { subscription_id: String },
    /// An active subscription was outside the renew threshold; nothing to
    /// do.
    NoOp { subscription_id: String },
}
