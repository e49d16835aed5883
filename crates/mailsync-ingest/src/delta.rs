//! Delta backstop poller.
//!
//! Per monitored folder: resumes from persisted cursor state, pages
//! through the provider's delta query, and fans extracted message ids out
//! through the ingestion pipeline behind a semaphore. Runs independently
//! per folder; a sibling folder's failure never stops the others.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::Semaphore;

use mailsync_core::domain::{DeltaRunOutcome, MailboxFolder};
use mailsync_core::ports::{IMailProvider, IMailRepository, ProviderHttpError};

use crate::pipeline::IngestionPipeline;

/// Per-run limits, grounded in [`mailsync_core::config::DeltaConfig`].
#[derive(Debug, Clone, Copy)]
pub struct DeltaLimits {
    pub page_size: u32,
    pub max_pages_per_run: u32,
    pub max_messages: u32,
    pub concurrency: usize,
}

pub struct DeltaPoller {
    provider: Arc<dyn IMailProvider>,
    repo: Arc<dyn IMailRepository>,
    pipeline: Arc<IngestionPipeline>,
    limits: DeltaLimits,
}

impl DeltaPoller {
    pub fn new(
        provider: Arc<dyn IMailProvider>,
        repo: Arc<dyn IMailRepository>,
        pipeline: Arc<IngestionPipeline>,
        limits: DeltaLimits,
    ) -> Self {
        Self {
            provider,
            repo,
            pipeline,
            limits,
        }
    }

    /// Runs a delta pass across every monitored folder for a mailbox.
    /// Returns one outcome per folder; a folder that fails does not
    /// prevent the others from running.
    pub async fn run_for_mailbox(&self, mailbox_id: i64, mailbox_email: &str) -> Vec<(MailboxFolder, DeltaRunOutcome)> {
        let folders = match self.repo.list_monitored_folders(mailbox_id).await {
            Ok(folders) => folders,
            Err(e) => {
                tracing::error!(error = %e, "failed to list monitored folders");
                return Vec::new();
            }
        };

        let mut results = Vec::with_capacity(folders.len());
        for folder in folders {
            let outcome = self.run_for_folder(mailbox_id, mailbox_email, &folder).await;
            if let DeltaRunOutcome::Failed { status_code, error } = &outcome {
                tracing::warn!(folder_id = %folder.provider_folder_id, status_code = ?status_code, error = %error, "delta run failed for folder");
            }
            results.push((folder, outcome));
        }
        results
    }

    async fn run_for_folder(&self, mailbox_id: i64, mailbox_email: &str, folder: &MailboxFolder) -> DeltaRunOutcome {
        let state = match self.repo.get_delta_state(mailbox_id, folder.id).await {
            Ok(state) => state,
            Err(e) => return DeltaRunOutcome::Failed { status_code: None, error: e.to_string() },
        };
        let mut resume_url = state.as_ref().and_then(|s| s.resume_url().map(str::to_string));

        let semaphore = Arc::new(Semaphore::new(self.limits.concurrency.max(1)));
        let mut pages = 0u32;
        let mut processed = 0u32;

        loop {
            if pages >= self.limits.max_pages_per_run {
                return self.persist_paused(mailbox_id, folder.id, resume_url).await;
            }

            let page = self
                .provider
                .messages_delta_page(mailbox_email, &folder.provider_folder_id, resume_url.as_deref(), self.limits.page_size)
                .await;

            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    if e.downcast_ref::<ProviderHttpError>().is_some_and(|h| h.is_gone()) {
                        return self.persist_reset(mailbox_id, folder.id).await;
                    }
                    let status = e.downcast_ref::<ProviderHttpError>().map(|h| h.status as i32);
                    return self.persist_failure(mailbox_id, folder.id, resume_url, status, e.to_string()).await;
                }
            };
            pages += 1;

            let mut handles = Vec::with_capacity(page.message_ids.len());
            for message_id in page.message_ids {
                processed += 1;
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
                let pipeline = self.pipeline.clone();
                let mailbox_email = mailbox_email.to_string();
                handles.push(tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = pipeline.ingest(mailbox_id, &message_id).await {
                        tracing::error!(message_id = %message_id, error = %e, "ingestion failed during delta run");
                    }
                    let _ = mailbox_email;
                }));
            }
            for handle in handles {
                let _ = handle.await;
            }

            if page.next_link.is_some() {
                resume_url = page.next_link;
                self.persist_progress(mailbox_id, folder.id, resume_url.clone(), None).await;
                if processed >= self.limits.max_messages {
                    return self.persist_paused(mailbox_id, folder.id, resume_url).await;
                }
                continue;
            }

            if let Some(delta_link) = page.delta_link {
                self.persist_progress(mailbox_id, folder.id, None, Some(delta_link.clone())).await;
                return DeltaRunOutcome::Caughtup { delta_link };
            }

            // Neither link present: treat as caught up with an empty cursor
            // rather than looping forever.
            return DeltaRunOutcome::Caughtup { delta_link: String::new() };
        }
    }

    async fn persist_progress(&self, mailbox_id: i64, folder_id: i64, next_link: Option<String>, delta_link: Option<String>) {
        let state = mailsync_core::domain::DeltaState {
            id: 0,
            mailbox_id,
            folder_id,
            delta_link,
            next_link,
            last_sync_at: Some(Utc::now()),
            last_status_code: Some(200),
            last_error: None,
        };
        if let Err(e) = self.repo.save_delta_state(state).await {
            tracing::warn!(error = %e, "failed to persist delta cursor");
        }
    }

    async fn persist_paused(&self, mailbox_id: i64, folder_id: i64, next_link: Option<String>) -> DeltaRunOutcome {
        match next_link {
            Some(next_link) => {
                self.persist_progress(mailbox_id, folder_id, Some(next_link.clone()), None).await;
                DeltaRunOutcome::Paused { next_link }
            }
            None => DeltaRunOutcome::Caughtup { delta_link: String::new() },
        }
    }

    async fn persist_reset(&self, mailbox_id: i64, folder_id: i64) -> DeltaRunOutcome {
        if let Err(e) = self.repo.reset_delta_state(mailbox_id, folder_id).await {
            tracing::warn!(error = %e, "failed to reset delta cursor after 410");
        }
        DeltaRunOutcome::Reset
    }

    async fn persist_failure(
        &self,
        mailbox_id: i64,
        folder_id: i64,
        resume_url: Option<String>,
        status_code: Option<i32>,
        error: String,
    ) -> DeltaRunOutcome {
        let state = mailsync_core::domain::DeltaState {
            id: 0,
            mailbox_id,
            folder_id,
            delta_link: None,
            next_link: resume_url,
            last_sync_at: Some(Utc::now()),
            last_status_code: status_code,
            last_error: Some(error.clone()),
        };
        if let Err(e) = self.repo.save_delta_state(state).await {
            tracing::warn!(error = %e, "failed to persist delta failure state");
        }
        DeltaRunOutcome::Failed { status_code, error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_carry_through_unchanged() {
        let limits = DeltaLimits {
            page_size: 50,
            max_pages_per_run: 20,
            max_messages: 500,
            concurrency: 3,
        };
        assert_eq!(limits.page_size, 50);
        assert_eq!(limits.concurrency, 3);
    }
}
