//! Change stream consumption.
//!
//! A [`ChangeFeed`] hands out batches of change events with at-least-once
//! semantics. [`ChangeFeedConsumer`] drives them through the archival
//! pipeline, commits a batch only once every item is resolved, and hands
//! unresolved items back for redelivery until their delivery budget runs
//! out, at which point they are dead-lettered.

use crate::error::{TierError, TierResult};
use crate::pipeline::{ArchivalPipeline, BatchReport, ItemOutcome};
use crate::types::ChangeEvent;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

#[async_trait]
pub trait ChangeFeed: Send {
    /// Next batch of at most `max` events, waiting for at least one.
    /// `None` once the feed is closed and drained.
    async fn next_batch(&mut self, max: usize) -> TierResult<Option<Vec<ChangeEvent>>>;

    /// Acknowledge the last delivered batch.
    async fn commit(&mut self) -> TierResult<()>;

    /// Return events for later redelivery.
    async fn release(&mut self, events: Vec<ChangeEvent>) -> TierResult<()>;
}

/// Producer half of an in-process change feed.
#[derive(Debug, Clone)]
pub struct ChangeFeedSender {
    tx: mpsc::Sender<ChangeEvent>,
}

impl ChangeFeedSender {
    pub async fn publish(&self, event: ChangeEvent) -> TierResult<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| TierError::Config("change feed consumer has shut down".to_string()))
    }
}

/// In-process change feed backed by a bounded tokio channel.
#[derive(Debug)]
pub struct ChannelChangeFeed {
    rx: mpsc::Receiver<ChangeEvent>,
    redelivery: VecDeque<ChangeEvent>,
    in_flight: usize,
    committed: u64,
}

pub fn channel(capacity: usize) -> (ChangeFeedSender, ChannelChangeFeed) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChangeFeedSender { tx },
        ChannelChangeFeed {
            rx,
            redelivery: VecDeque::new(),
            in_flight: 0,
            committed: 0,
        },
    )
}

impl ChannelChangeFeed {
    /// Number of events acknowledged so far.
    pub fn committed(&self) -> u64 {
        self.committed
    }

    pub fn pending_redelivery(&self) -> usize {
        self.redelivery.len()
    }

    fn deliver(&mut self, mut batch: Vec<ChangeEvent>) -> Option<Vec<ChangeEvent>> {
        for event in batch.iter_mut() {
            event.delivery_count += 1;
        }
        self.in_flight = batch.len();
        Some(batch)
    }
}

#[async_trait]
impl ChangeFeed for ChannelChangeFeed {
    async fn next_batch(&mut self, max: usize) -> TierResult<Option<Vec<ChangeEvent>>> {
        let max = max.max(1);
        let mut batch = Vec::with_capacity(max);
        while batch.len() < max {
            match self.redelivery.pop_front() {
                Some(event) => batch.push(event),
                None => break,
            }
        }

        if batch.is_empty() {
            match self.rx.recv().await {
                Some(event) => batch.push(event),
                None => return Ok(None),
            }
        }
        while batch.len() < max {
            match self.rx.try_recv() {
                Ok(event) => batch.push(event),
                Err(_) => break,
            }
        }
        Ok(self.deliver(batch))
    }

    async fn commit(&mut self) -> TierResult<()> {
        self.committed += self.in_flight as u64;
        self.in_flight = 0;
        Ok(())
    }

    async fn release(&mut self, events: Vec<ChangeEvent>) -> TierResult<()> {
        self.redelivery.extend(events);
        Ok(())
    }
}

/// Running totals of a consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub batches: u64,
    pub events: u64,
    pub archived: u64,
    pub kept_hot: u64,
    pub ignored: u64,
    pub invalid: u64,
    pub redelivered: u64,
    pub dead_lettered: u64,
}

/// A change event that exhausted its delivery budget.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub event: ChangeEvent,
    pub error: String,
}

pub struct ChangeFeedConsumer {
    pipeline: Arc<ArchivalPipeline>,
    batch_size: usize,
    max_redeliveries: u32,
    stats: ConsumerStats,
    dead_letters: Vec<DeadLetter>,
}

impl ChangeFeedConsumer {
    pub fn new(pipeline: Arc<ArchivalPipeline>, batch_size: usize, max_redeliveries: u32) -> Self {
        Self {
            pipeline,
            batch_size: batch_size.max(1),
            max_redeliveries,
            stats: ConsumerStats::default(),
            dead_letters: Vec::new(),
        }
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    pub fn dead_letters(&self) -> &[DeadLetter] {
        &self.dead_letters
    }

    /// Consume until the feed closes or `shutdown` flips to true.
    pub async fn run<F: ChangeFeed>(
        &mut self,
        feed: &mut F,
        mut shutdown: watch::Receiver<bool>,
    ) -> TierResult<ConsumerStats> {
        info!(batch_size = self.batch_size, "change feed consumer started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let next = tokio::select! {
                _ = shutdown.changed() => break,
                next = feed.next_batch(self.batch_size) => next?,
            };
            let Some(batch) = next else {
                info!("change feed closed");
                break;
            };
            self.handle_batch(feed, batch).await?;
        }
        info!(stats = ?self.stats, "change feed consumer stopped");
        Ok(self.stats.clone())
    }

    /// Pull and resolve a single batch. `None` when the feed is closed.
    pub async fn run_once<F: ChangeFeed>(&mut self, feed: &mut F) -> TierResult<Option<BatchReport>> {
        match feed.next_batch(self.batch_size).await? {
            Some(batch) => Ok(Some(self.handle_batch(feed, batch).await?)),
            None => Ok(None),
        }
    }

    async fn handle_batch<F: ChangeFeed>(
        &mut self,
        feed: &mut F,
        batch: Vec<ChangeEvent>,
    ) -> TierResult<BatchReport> {
        let report = self.pipeline.process(&batch).await;

        // Released events keep their batch order, so a deferred snapshot is
        // redelivered behind the failed one it waits on.
        let mut retry = Vec::new();
        for (event, outcome) in batch.into_iter().zip(report.outcomes.iter()) {
            let (id, stage, error) = match outcome {
                ItemOutcome::Failed { id, stage, error } => (id, stage, error),
                ItemOutcome::Deferred { id } => {
                    debug!(record_id = %id, "change event deferred behind an earlier failure");
                    // a deferral is not an attempt; keep the delivery budget intact
                    let mut event = event;
                    event.delivery_count = event.delivery_count.saturating_sub(1);
                    retry.push(event);
                    continue;
                }
                _ => continue,
            };
            if event.delivery_count > self.max_redeliveries {
                error!(
                    record_id = %id,
                    stage = %stage,
                    deliveries = event.delivery_count,
                    error = %error,
                    "change event dead-lettered"
                );
                self.dead_letters.push(DeadLetter {
                    event,
                    error: error.to_string(),
                });
                self.stats.dead_lettered += 1;
            } else {
                warn!(
                    record_id = %id,
                    stage = %stage,
                    deliveries = event.delivery_count,
                    "change event released for redelivery"
                );
                retry.push(event);
            }
        }

        self.stats.batches += 1;
        self.stats.events += report.len() as u64;
        self.stats.archived += report.archived() as u64;
        self.stats.kept_hot += report.kept_hot() as u64;
        self.stats.ignored += report.ignored() as u64;
        self.stats.invalid += report.validation_failures() as u64;
        self.stats.redelivered += retry.len() as u64;

        if !retry.is_empty() {
            feed.release(retry).await?;
        }
        feed.commit().await?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_channel_feed_batches_and_counts_deliveries() {
        let (tx, mut feed) = channel(16);
        for i in 0..5 {
            tx.publish(ChangeEvent::new(json!({ "id": format!("r{}", i) }), ChangeKind::Insert))
                .await
                .unwrap();
        }

        let batch = feed.next_batch(3).await.unwrap().unwrap();
        assert_eq!(batch.len(), 3);
        assert!(batch.iter().all(|e| e.delivery_count == 1));
        feed.commit().await.unwrap();
        assert_eq!(feed.committed(), 3);

        feed.release(vec![batch[0].clone()]).await.unwrap();
        let next = feed.next_batch(10).await.unwrap().unwrap();
        assert_eq!(next.len(), 3);
        assert_eq!(next[0].document["id"], "r0");
        assert_eq!(next[0].delivery_count, 2);
    }

    #[tokio::test]
    async fn test_closed_feed_drains_then_ends() {
        let (tx, mut feed) = channel(4);
        tx.publish(ChangeEvent::upsert(json!({"id": "a"}))).await.unwrap();
        drop(tx);
        assert_eq!(feed.next_batch(10).await.unwrap().unwrap().len(), 1);
        assert!(feed.next_batch(10).await.unwrap().is_none());
    }
}
