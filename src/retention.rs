//! Periodic purge of documents deleted longer ago than their collection's
//! retention period.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, FixedOffset};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::{
    clock::Clock,
    config::RetentionRule,
    error::SoftDeleteError,
    soft_delete::{
        filter::{DeletedAtFilter, DocumentFilter},
        SoftDeleteStore,
    },
    store::{DeleteOutcome, DocumentStore},
    BackgroundTask,
};

pub struct RetentionJob<S, C> {
    rule: RetentionRule,
    documents: Arc<SoftDeleteStore<S, C>>,
}

impl<S, C> RetentionJob<S, C>
where
    S: DocumentStore,
    C: Clock,
{
    pub fn new(rule: RetentionRule, documents: Arc<SoftDeleteStore<S, C>>) -> Self {
        Self { rule, documents }
    }

    pub fn rule(&self) -> &RetentionRule {
        &self.rule
    }

    /// Documents deleted before this instant are due.
    pub fn cutoff(&self, now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        now - chrono::Duration::days(self.rule.days.into())
    }

    pub async fn run_once(&self) -> Result<DeleteOutcome, SoftDeleteError> {
        let cutoff = self.cutoff(self.documents.clock().now());
        debug!(
            parent: self.documents.span(),
            "Purging {} documents deleted before {}", self.rule.collection, cutoff
        );
        self.documents
            .hard_delete_many(
                DocumentFilter::new().with_deleted_at(DeletedAtFilter::Before(cutoff)),
                None,
            )
            .await
    }
}

/// Runs every job once. A failing job does not keep the others from running.
/// Returns the number of purged documents.
pub async fn run_retention<S, C>(jobs: &[RetentionJob<S, C>]) -> u64
where
    S: DocumentStore,
    C: Clock,
{
    let mut purged = 0;
    for job in jobs {
        match job.run_once().await {
            Ok(outcome) => {
                if outcome.deleted_count > 0 {
                    info!(
                        parent: job.documents.span(),
                        "Purged {} documents of {}",
                        outcome.deleted_count, job.rule.collection
                    );
                }
                purged += outcome.deleted_count;
            }
            Err(e) => error!(
                parent: job.documents.span(),
                "Retention purge of {} failed: {}",
                job.rule.collection,
                e
            ),
        }
    }
    purged
}

pub fn setup_retention<S, C>(jobs: Vec<RetentionJob<S, C>>, every: Duration) -> BackgroundTask
where
    S: DocumentStore + 'static,
    C: Clock + 'static,
{
    let mut interval = tokio::time::interval(every);
    debug!("retention interval: {:?}", every);
    let (shutdown_signal, mut shutdown_recv) = oneshot::channel::<()>();
    let join_handle = tokio::spawn(async move {
        debug!("Retention started");
        loop {
            tokio::select! {
                _ = &mut shutdown_recv => {
                    debug!("Retention shutdown signal received");
                    break;
                }
                _ = interval.tick() => {
                    debug!("Retention tick");
                    run_retention(&jobs).await;
                }
            }
        }
        debug!("Retention exited");
    });
    BackgroundTask::new("retention", join_handle, shutdown_signal)
}
