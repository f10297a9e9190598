//! Periodic re-evaluation of the hot tier.
//!
//! Change-triggered archival only looks at a record when it changes; a record
//! written once and never touched again would stay hot forever. The sweeper
//! pages through the hot tier and feeds every document through the same
//! pipeline, so all ordering and idempotence guarantees still hold.

use crate::error::{TierKind, TierResult};
use crate::pipeline::{ArchivalPipeline, BatchReport};
use crate::resilience::{with_timeout, RetryPolicy};
use crate::storage::HotStore;
use crate::types::ChangeEvent;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

pub struct Sweeper {
    hot: Arc<dyn HotStore>,
    pipeline: Arc<ArchivalPipeline>,
    page_size: usize,
    tier_timeout: Duration,
    retry: RetryPolicy,
}

impl Sweeper {
    pub fn new(
        hot: Arc<dyn HotStore>,
        pipeline: Arc<ArchivalPipeline>,
        page_size: usize,
        tier_timeout: Duration,
    ) -> Self {
        Self {
            hot,
            pipeline,
            page_size: page_size.max(1),
            tier_timeout,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn run_once(&self) -> TierResult<BatchReport> {
        self.run_once_at(Utc::now()).await
    }

    /// One full pass over the hot tier. A scan failure that survives retries
    /// aborts the pass; the next pass starts over.
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> TierResult<BatchReport> {
        let mut total = BatchReport::default();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let after = cursor.clone();
            let page = self
                .retry
                .run("hot_scan", after.as_deref().unwrap_or(""), || {
                    with_timeout(
                        TierKind::Hot,
                        "scan",
                        self.tier_timeout,
                        self.hot.scan(after.as_deref(), self.page_size),
                    )
                })
                .await?;
            if page.is_empty() {
                break;
            }
            pages += 1;
            let full_page = page.len() == self.page_size;
            cursor = page.last().map(|(id, _)| id.clone());

            let batch: Vec<ChangeEvent> = page.into_iter().map(|(_, doc)| ChangeEvent::upsert(doc)).collect();
            total.merge(self.pipeline.process_at(&batch, now).await);

            if !full_page {
                break;
            }
        }

        info!(
            pages,
            scanned = total.len(),
            archived = total.archived(),
            failures = total.failure_count(),
            "hot tier sweep finished"
        );
        Ok(total)
    }

    /// Sweep every `interval` until `shutdown` flips to true.
    pub async fn run_periodic(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "hot tier sweep failed");
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierStoreConfig;
    use crate::storage_backends::{InMemoryColdStore, InMemoryHotStore, InMemoryLocationIndex};
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    #[tokio::test]
    async fn test_sweep_archives_only_aged_records_across_pages() {
        let hot = Arc::new(InMemoryHotStore::new());
        let cold = Arc::new(InMemoryColdStore::new());
        let index = Arc::new(InMemoryLocationIndex::new());
        let now = Utc::now();
        for i in 0..7 {
            let age = if i % 2 == 0 { 200 } else { 5 };
            let id = format!("rec-{}", i);
            let created = now - ChronoDuration::days(age);
            hot.upsert(&id, json!({ "id": id, "createdAt": created.to_rfc3339() }))
                .await
                .unwrap();
        }

        let pipeline = Arc::new(ArchivalPipeline::new(
            hot.clone(),
            cold.clone(),
            index.clone(),
            &TierStoreConfig::default(),
        ));
        let sweeper = Sweeper::new(hot.clone(), pipeline, 3, Duration::from_secs(1));

        let report = sweeper.run_once_at(now).await.unwrap();
        assert_eq!(report.archived(), 4);
        assert_eq!(report.kept_hot(), 3);
        assert_eq!(hot.len(), 3);
        assert_eq!(cold.len(), 4);
        assert_eq!(index.len(), 4);

        let again = sweeper.run_once_at(now).await.unwrap();
        assert_eq!(again.archived(), 0);
        assert_eq!(again.kept_hot(), 3);
    }
}
