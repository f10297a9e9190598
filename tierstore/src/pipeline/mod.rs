//! Archival pipeline: moves aged records from the hot tier to the cold tier.
//!
//! Each archived record goes through three ordered steps:
//! 1. write the document snapshot to the cold store at its deterministic path,
//! 2. upsert the location index to `COLD` (the commit point),
//! 3. delete the hot copy.
//!
//! A step only starts once the previous one is confirmed, so an interruption
//! at any point leaves the record readable through the retrieval
//! coordinator. Every step is idempotent, which makes at-least-once delivery
//! safe.

pub mod partition;
pub mod report;

use crate::cold_path::ColdPathTemplate;
use crate::config::TierStoreConfig;
use crate::decider::{ArchivalDecider, Decision};
use crate::error::{TierError, TierKind, TierResult};
use crate::resilience::{with_timeout, RetryPolicy};
use crate::storage::{ColdStore, DeleteOutcome, HotStore, LocationIndex};
use crate::types::{document_id_hint, ChangeEvent, ChangeKind, Document, LocationEntry, Record};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub use partition::{assign_lanes, partition_of};
pub use report::{ArchivalStage, BatchReport, ItemOutcome};

pub struct ArchivalPipeline {
    hot: Arc<dyn HotStore>,
    cold: Arc<dyn ColdStore>,
    index: Arc<dyn LocationIndex>,
    decider: ArchivalDecider,
    template: ColdPathTemplate,
    retry: RetryPolicy,
    tier_timeout: Duration,
    /// One lock per identifier-hash lane, shared by concurrent batches.
    partitions: Vec<Mutex<()>>,
}

impl ArchivalPipeline {
    pub fn new(
        hot: Arc<dyn HotStore>,
        cold: Arc<dyn ColdStore>,
        index: Arc<dyn LocationIndex>,
        config: &TierStoreConfig,
    ) -> Self {
        let lanes = config.pipeline.concurrency.max(1);
        Self {
            hot,
            cold,
            index,
            decider: ArchivalDecider::new(config.archival_threshold()),
            template: config.cold_path.clone(),
            retry: RetryPolicy::from_config(&config.retry),
            tier_timeout: config.tier_timeout(),
            partitions: (0..lanes).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn decider(&self) -> &ArchivalDecider {
        &self.decider
    }

    pub fn lanes(&self) -> usize {
        self.partitions.len()
    }

    /// Process a batch of change events against the current time.
    pub async fn process(&self, batch: &[ChangeEvent]) -> BatchReport {
        self.process_at(batch, Utc::now()).await
    }

    /// Process a batch deciding ages against `now`.
    ///
    /// Items are independent: a failure is recorded in the report and never
    /// aborts the rest of the batch. Items sharing an identifier run
    /// sequentially in delivery order.
    pub async fn process_at(&self, batch: &[ChangeEvent], now: DateTime<Utc>) -> BatchReport {
        if batch.is_empty() {
            return BatchReport::default();
        }
        info!(items = batch.len(), "processing change batch");

        let hints: Vec<Option<String>> = batch.iter().map(|e| document_id_hint(&e.document)).collect();
        let lanes = assign_lanes(hints.iter().map(|h| h.as_deref()), self.partitions.len());

        let hints = &hints;
        let lane_runs = lanes
            .into_iter()
            .enumerate()
            .filter(|(_, positions)| !positions.is_empty())
            .map(|(lane, positions)| async move {
                let _guard = self.partitions[lane].lock().await;
                let mut done = Vec::with_capacity(positions.len());
                // ids whose earlier item failed; later snapshots must wait for it
                let mut blocked: HashSet<&str> = HashSet::new();
                for pos in positions {
                    let outcome = match hints[pos].as_deref() {
                        Some(id) if blocked.contains(id) => {
                            debug!(record_id = id, "deferring item behind an earlier failure");
                            ItemOutcome::Deferred { id: id.to_string() }
                        }
                        hint => {
                            let outcome = self.process_event(&batch[pos], now).await;
                            if let (ItemOutcome::Failed { .. }, Some(id)) = (&outcome, hint) {
                                blocked.insert(id);
                            }
                            outcome
                        }
                    };
                    done.push((pos, outcome));
                }
                done
            });

        let mut slots: Vec<Option<ItemOutcome>> = vec![None; batch.len()];
        for (pos, outcome) in join_all(lane_runs).await.into_iter().flatten() {
            slots[pos] = Some(outcome);
        }
        let report = BatchReport {
            outcomes: slots
                .into_iter()
                .map(|o| {
                    o.unwrap_or(ItemOutcome::Invalid {
                        id: None,
                        reason: "item was not processed".to_string(),
                    })
                })
                .collect(),
        };

        info!(
            items = report.len(),
            archived = report.archived(),
            kept_hot = report.kept_hot(),
            ignored = report.ignored(),
            invalid = report.validation_failures(),
            failed = report.failed(),
            deferred = report.deferred(),
            "change batch processed"
        );
        report
    }

    /// Convenience for callers holding bare documents (sweeps, backfills).
    pub async fn process_documents(&self, documents: Vec<Document>) -> BatchReport {
        let batch: Vec<ChangeEvent> = documents.into_iter().map(ChangeEvent::upsert).collect();
        self.process(&batch).await
    }

    async fn process_event(&self, event: &ChangeEvent, now: DateTime<Utc>) -> ItemOutcome {
        if event.kind == ChangeKind::Delete {
            let id = document_id_hint(&event.document);
            debug!(record_id = ?id, "ignoring delete notification");
            return ItemOutcome::Ignored { id };
        }

        let record = match Record::from_document(event.document.clone()) {
            Ok(record) => record,
            Err(e) => {
                let id = document_id_hint(&event.document);
                warn!(record_id = ?id, error = %e, "skipping record that failed validation");
                return ItemOutcome::Invalid {
                    id,
                    reason: e.to_string(),
                };
            }
        };

        match self.decider.decide(record.created_at, now) {
            Decision::KeepHot => {
                debug!(record_id = %record.id, "record is recent, no archival needed");
                ItemOutcome::KeptHot { id: record.id }
            }
            Decision::Archive => self.archive_record(&record).await,
        }
    }

    /// Run the cold write → index upsert → hot delete sequence for one record
    /// regardless of its age.
    pub async fn archive_record(&self, record: &Record) -> ItemOutcome {
        let id = record.id.as_str();
        let cold_path = match self.template.render(id, record.created_at) {
            Ok(path) => path,
            Err(e) => {
                return ItemOutcome::Invalid {
                    id: Some(record.id.clone()),
                    reason: e.to_string(),
                }
            }
        };
        info!(record_id = id, cold_path = %cold_path, "archiving record to cold tier");

        if let Err(error) = self.write_cold(id, &cold_path, &record.document).await {
            return self.failed(id, ArchivalStage::ColdWrite, error);
        }

        let entry = LocationEntry::cold(cold_path.clone(), Utc::now());
        if let Err(error) = self.commit_index(id, entry).await {
            return self.failed(id, ArchivalStage::IndexUpdate, error);
        }
        info!(record_id = id, cold_path = %cold_path, "record archived");

        match self.delete_hot(id).await {
            Ok(outcome) => {
                let hot_deleted = outcome == DeleteOutcome::Deleted;
                if hot_deleted {
                    info!(record_id = id, "record deleted from hot tier");
                } else {
                    debug!(record_id = id, "hot copy already gone");
                }
                ItemOutcome::Archived {
                    id: record.id.clone(),
                    cold_path,
                    hot_deleted,
                }
            }
            Err(error) => self.failed(id, ArchivalStage::HotDelete, error),
        }
    }

    async fn write_cold(&self, id: &str, cold_path: &str, document: &Document) -> TierResult<()> {
        let bytes = serde_json::to_vec_pretty(document)
            .map_err(|e| TierError::backend(TierKind::Cold, format!("serialize snapshot: {}", e)))?;
        self.retry
            .run("cold_put", id, || {
                with_timeout(
                    TierKind::Cold,
                    "put",
                    self.tier_timeout,
                    self.cold.put(cold_path, bytes.clone()),
                )
            })
            .await
    }

    async fn commit_index(&self, id: &str, entry: LocationEntry) -> TierResult<()> {
        self.retry
            .run("index_upsert", id, || {
                with_timeout(
                    TierKind::Index,
                    "upsert",
                    self.tier_timeout,
                    self.index.upsert(id, entry.clone()),
                )
            })
            .await
    }

    async fn delete_hot(&self, id: &str) -> TierResult<DeleteOutcome> {
        self.retry
            .run("hot_delete", id, || {
                with_timeout(TierKind::Hot, "delete", self.tier_timeout, self.hot.delete(id))
            })
            .await
    }

    fn failed(&self, id: &str, stage: ArchivalStage, error: TierError) -> ItemOutcome {
        if stage.is_committed() {
            warn!(
                record_id = id,
                stage = %stage,
                error = %error,
                "record archived but hot copy could not be deleted"
            );
        } else {
            error!(record_id = id, stage = %stage, error = %error, "archival failed");
        }
        ItemOutcome::Failed {
            id: id.to_string(),
            stage,
            error,
        }
    }
}
