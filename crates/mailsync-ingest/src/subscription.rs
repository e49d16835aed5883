//! Push-subscription `ensure()` state machine.
//!
//! Idempotent for a single `(mailbox, resource)` pair: no row creates a
//! subscription, an active one close to expiry renews, and anything else
//! is a no-op.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};

use mailsync_core::domain::{GraphSubscription, SubscriptionEnsureOutcome, SubscriptionStatus};
use mailsync_core::ports::{IMailProvider, IMailRepository};

pub struct SubscriptionManager {
    provider: Arc<dyn IMailProvider>,
    repo: Arc<dyn IMailRepository>,
    change_type: String,
    notification_url: String,
    client_state: String,
    lifetime_minutes: i64,
    renew_threshold_minutes: i64,
}

impl SubscriptionManager {
    pub fn new(
        provider: Arc<dyn IMailProvider>,
        repo: Arc<dyn IMailRepository>,
        change_type: String,
        notification_url: String,
        client_state: String,
        lifetime_minutes: i64,
        renew_threshold_minutes: i64,
    ) -> Self {
        Self {
            provider,
            repo,
            change_type,
            notification_url,
            client_state,
            lifetime_minutes,
            renew_threshold_minutes,
        }
    }

    /// Ensures a live subscription exists for `(mailbox_id, resource)`. In
    /// `dry_run`, computes and returns the action that would be taken
    /// without calling the provider or writing to storage.
    pub async fn ensure(&self, mailbox_id: i64, resource: &str, dry_run: bool) -> Result<SubscriptionEnsureOutcome> {
        match self.repo.get_subscription(mailbox_id, resource).await? {
            None => {
                if dry_run {
                    return Ok(SubscriptionEnsureOutcome::Created {
                        subscription_id: "(dry-run)".to_string(),
                    });
                }
                let receipt = self
                    .provider
                    .create_subscription(
                        resource,
                        &self.notification_url,
                        &self.client_state,
                        &self.change_type,
                        self.lifetime_minutes,
                    )
                    .await?;
                self.repo
                    .upsert_subscription(GraphSubscription {
                        id: 0,
                        mailbox_id,
                        subscription_id: receipt.subscription_id.clone(),
                        resource: resource.to_string(),
                        change_type: self.change_type.clone(),
                        notification_url: self.notification_url.clone(),
                        expires_at: receipt.expires_at,
                        status: SubscriptionStatus::Active,
                        created_at: Utc::now(),
                    })
                    .await?;
                Ok(SubscriptionEnsureOutcome::Created {
                    subscription_id: receipt.subscription_id,
                })
            }
            Some(existing) if self.needs_renewal(&existing) => {
                if dry_run {
                    return Ok(SubscriptionEnsureOutcome::Renewed {
                        subscription_id: existing.subscription_id,
                    });
                }
                let receipt = self
                    .provider
                    .renew_subscription(&existing.subscription_id, self.lifetime_minutes)
                    .await?;
                let mut renewed = existing;
                renewed.expires_at = receipt.expires_at;
                renewed.status = SubscriptionStatus::Active;
                self.repo.upsert_subscription(renewed.clone()).await?;
                Ok(SubscriptionEnsureOutcome::Renewed {
                    subscription_id: renewed.subscription_id,
                })
            }
            Some(existing) => Ok(SubscriptionEnsureOutcome::NoOp {
                subscription_id: existing.subscription_id,
            }),
        }
    }

    fn needs_renewal(&self, subscription: &GraphSubscription) -> bool {
        subscription.status == SubscriptionStatus::Active
            && subscription.expires_at - Utc::now() <= Duration::minutes(self.renew_threshold_minutes)
    }
}
