//! Background scheduler - two independent periodic loops driving the
//! subscription `ensure()` state machine and the delta backstop poller.
//!
//! Each loop sleeps for its configured interval plus a random jitter, then
//! runs one pass and logs the outcome; a failed pass never stops the loop,
//! it just retries after the next sleep. Both loops observe a shared
//! [`CancellationToken`] so the daemon can shut them down alongside the
//! HTTP server.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::delta::DeltaPoller;
use crate::subscription::SubscriptionManager;

fn jittered(interval: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return interval;
    }
    let extra_ms = rand::thread_rng().gen_range(0..=jitter.as_millis() as u64);
    interval + Duration::from_millis(extra_ms)
}

/// Sleeps for `duration`, returning early (with `false`) if `token` is
/// cancelled first. Returns `true` if the sleep ran to completion.
async fn cancellable_sleep(duration: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = token.cancelled() => false,
    }
}

/// Runs the subscription-renewal loop until `token` is cancelled.
pub async fn run_subscription_loop(
    manager: Arc<SubscriptionManager>,
    mailbox_id: i64,
    resource: String,
    interval: Duration,
    jitter: Duration,
    token: CancellationToken,
) {
    info!("subscription loop starting");
    loop {
        if !cancellable_sleep(jittered(interval, jitter), &token).await {
            break;
        }
        match manager.ensure(mailbox_id, &resource, false).await {
            Ok(outcome) => info!(outcome = ?outcome, "subscription ensure completed"),
            Err(e) => warn!(error = %e, "subscription ensure failed, will retry next tick"),
        }
    }
    info!("subscription loop stopped");
}

/// Runs the delta-poller loop until `token` is cancelled.
pub async fn run_delta_loop(
    poller: Arc<DeltaPoller>,
    mailbox_id: i64,
    mailbox_email: String,
    interval: Duration,
    jitter: Duration,
    token: CancellationToken,
) {
    info!("delta loop starting");
    loop {
        if !cancellable_sleep(jittered(interval, jitter), &token).await {
            break;
        }
        let results = poller.run_for_mailbox(mailbox_id, &mailbox_email).await;
        for (folder, outcome) in results {
            info!(folder_id = %folder.provider_folder_id, outcome = ?outcome, "delta run completed");
        }
    }
    info!("delta loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jittered_interval_never_shrinks_below_base() {
        let base = Duration::from_secs(120);
        let jitter = Duration::from_secs(15);
        for _ in 0..50 {
            let d = jittered(base, jitter);
            assert!(d >= base);
            assert!(d <= base + jitter);
        }
    }

    #[test]
    fn zero_jitter_is_a_no_op() {
        let base = Duration::from_secs(300);
        assert_eq!(jittered(base, Duration::ZERO), base);
    }

    #[tokio::test]
    async fn cancellable_sleep_returns_false_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let completed = cancellable_sleep(Duration::from_secs(30), &token).await;
        assert!(!completed);
    }

    #[tokio::test]
    async fn cancellable_sleep_returns_true_when_duration_elapses_first() {
        let token = CancellationToken::new();
        let completed = cancellable_sleep(Duration::from_millis(1), &token).await;
        assert!(completed);
    }
}
