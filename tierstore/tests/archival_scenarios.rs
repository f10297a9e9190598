mod common;

use common::{billing_doc, harness, no_retry_config};
use pretty_assertions::assert_eq;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tierstore::pipeline::{ArchivalStage, ItemOutcome};
use tierstore::storage::{ColdStore, HotStore, LocationIndex};
use tierstore::storage_backends::{FileColdStore, SqliteHotStore, SqliteLocationIndex};
use tierstore::{ChangeEvent, Lookup, Tier, TierError, TierStore, TierStoreConfig};

fn served_from(lookup: &Lookup) -> Option<Tier> {
    match lookup {
        Lookup::Found(retrieved) => Some(retrieved.served_from),
        Lookup::NotFound => None,
    }
}

#[tokio::test]
async fn test_aged_record_moves_to_cold_and_stays_readable() {
    let h = harness(no_retry_config());
    let doc = billing_doc("R1", 95);
    h.hot.upsert("R1", doc.clone()).await.unwrap();

    let report = h.store.process(&[ChangeEvent::upsert(doc.clone())]).await;
    assert_eq!(report.archived(), 1);
    assert!(!h.hot.inner.contains("R1"));

    let entry = h.index.get("R1").await.unwrap().unwrap();
    assert_eq!(entry.tier, Tier::Cold);
    let path = entry.cold_path.unwrap();
    assert!(path.starts_with("billing/"));
    assert!(path.ends_with("/R1.json"));

    match h.store.get("R1").await.unwrap() {
        Lookup::Found(retrieved) => {
            assert_eq!(retrieved.served_from, Tier::Cold);
            assert_eq!(retrieved.document, doc);
        }
        Lookup::NotFound => panic!("archived record must stay readable"),
    }
}

#[tokio::test]
async fn test_recent_record_served_from_hot_without_index_entry() {
    let h = harness(no_retry_config());
    let doc = billing_doc("R2", 10);
    h.hot.upsert("R2", doc.clone()).await.unwrap();

    let report = h.store.process(&[ChangeEvent::upsert(doc)]).await;
    assert_eq!(report.kept_hot(), 1);
    assert!(h.index.inner.is_empty());
    assert!(h.cold.inner.is_empty());

    let lookup = h.store.get("R2").await.unwrap();
    assert_eq!(served_from(&lookup), Some(Tier::Hot));
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let h = harness(no_retry_config());
    assert_eq!(h.store.get("never-written").await.unwrap(), Lookup::NotFound);
}

#[tokio::test]
async fn test_index_failure_leaves_hot_copy_and_retry_converges() {
    let h = harness(no_retry_config());
    let doc = billing_doc("R3", 180);
    h.hot.upsert("R3", doc.clone()).await.unwrap();
    h.index.failing_upserts.store(1, Ordering::SeqCst);

    let event = ChangeEvent::upsert(doc);
    let report = h.store.process(&[event.clone()]).await;
    assert_eq!(report.failed(), 1);
    assert!(matches!(
        report.outcomes[0],
        ItemOutcome::Failed {
            stage: ArchivalStage::IndexUpdate,
            ..
        }
    ));

    // blob written, not yet committed: the hot copy is still authoritative
    assert_eq!(h.cold.inner.len(), 1);
    assert!(h.hot.inner.contains("R3"));
    let lookup = h.store.get("R3").await.unwrap();
    assert_eq!(served_from(&lookup), Some(Tier::Hot));

    let retried = h.store.process(&[event]).await;
    assert_eq!(retried.archived(), 1);
    assert_eq!(h.cold.inner.len(), 1);
    assert_eq!(h.cold.puts.load(Ordering::SeqCst), 2);
    let lookup = h.store.get("R3").await.unwrap();
    assert_eq!(served_from(&lookup), Some(Tier::Cold));
}

#[tokio::test]
async fn test_cold_blob_without_index_entry_or_hot_copy_is_not_found() {
    let h = harness(no_retry_config());
    // cold write landed, then the process died before the index update and
    // the hot copy was removed by someone else
    h.cold
        .put("billing/2024/01/10/R10.json", br#"{"id":"R10"}"#.to_vec())
        .await
        .unwrap();
    assert!(h.index.inner.is_empty());
    assert!(h.hot.inner.is_empty());

    assert_eq!(h.store.get("R10").await.unwrap(), Lookup::NotFound);
}

#[tokio::test]
async fn test_failed_item_defers_later_snapshot_of_same_id() {
    let mut config = no_retry_config();
    // one lane, so the single injected failure hits the first item
    config.pipeline.concurrency = 1;
    let h = harness(config);
    h.cold.failing_puts.store(1, Ordering::SeqCst);
    let mut v1 = billing_doc("R11", 150);
    v1["v"] = 1.into();
    let mut v2 = v1.clone();
    v2["v"] = 2.into();
    h.hot.upsert("R11", v2.clone()).await.unwrap();

    let report = h
        .store
        .process(&[
            ChangeEvent::upsert(v1),
            ChangeEvent::upsert(billing_doc("R12", 150)),
            ChangeEvent::upsert(v2),
        ])
        .await;

    assert!(matches!(
        report.outcomes[0],
        ItemOutcome::Failed {
            stage: ArchivalStage::ColdWrite,
            ..
        }
    ));
    assert!(matches!(report.outcomes[1], ItemOutcome::Archived { .. }));
    assert!(matches!(report.outcomes[2], ItemOutcome::Deferred { .. }));
    assert_eq!(report.unresolved_positions(), vec![0, 2]);
    assert!(h.hot.inner.contains("R11"));
    assert_eq!(h.index.get("R11").await.unwrap(), None);
}

#[tokio::test]
async fn test_hot_delete_failure_is_committed_and_reads_stay_correct() {
    let h = harness(no_retry_config());
    let doc = billing_doc("R4", 400);
    h.hot.upsert("R4", doc.clone()).await.unwrap();
    h.hot.failing_deletes.store(1, Ordering::SeqCst);

    let event = ChangeEvent::upsert(doc.clone());
    let report = h.store.process(&[event.clone()]).await;
    match &report.outcomes[0] {
        ItemOutcome::Failed { stage, error, .. } => {
            assert_eq!(*stage, ArchivalStage::HotDelete);
            assert!(stage.is_committed());
            assert!(error.is_retryable());
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    // stale duplicate in hot wins while it exists
    let lookup = h.store.get("R4").await.unwrap();
    assert_eq!(served_from(&lookup), Some(Tier::Hot));

    let retried = h.store.process(&[event]).await;
    assert_eq!(retried.archived(), 1);
    assert!(!h.hot.inner.contains("R4"));
    let lookup = h.store.get("R4").await.unwrap();
    assert_eq!(served_from(&lookup), Some(Tier::Cold));
}

#[tokio::test]
async fn test_retry_policy_absorbs_transient_cold_failures() {
    let mut config = no_retry_config();
    config.retry.max_attempts = 3;
    config.retry.base_backoff_ms = 1;
    config.retry.max_backoff_ms = 2;
    let h = harness(config);
    h.cold.failing_puts.store(2, Ordering::SeqCst);

    let report = h.store.process(&[ChangeEvent::upsert(billing_doc("R5", 365))]).await;
    assert_eq!(report.archived(), 1);
    assert_eq!(h.cold.puts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_hot_outage_falls_through_to_cold() {
    let h = harness(no_retry_config());
    let doc = billing_doc("R6", 120);
    h.hot.upsert("R6", doc.clone()).await.unwrap();
    h.store.process(&[ChangeEvent::upsert(doc)]).await;

    h.hot.reads_down.store(true, Ordering::SeqCst);
    let lookup = h.store.get("R6").await.unwrap();
    assert_eq!(served_from(&lookup), Some(Tier::Cold));
}

#[tokio::test]
async fn test_missing_cold_blob_is_consistency_error() {
    let h = harness(no_retry_config());
    let report = h
        .store
        .process(&[ChangeEvent::upsert(billing_doc("R7", 120))])
        .await;
    let ItemOutcome::Archived { cold_path, .. } = &report.outcomes[0] else {
        panic!("expected archival");
    };
    assert!(h.cold.inner.purge(cold_path));

    let err = h.store.get("R7").await.unwrap_err();
    assert!(matches!(err, TierError::Consistency { .. }));
    assert_eq!(err.code(), "consistency_error");
}

#[tokio::test]
async fn test_concurrent_batches_with_same_id_archive_once() {
    let h = harness(no_retry_config());
    let doc = billing_doc("R8", 200);
    h.hot.upsert("R8", doc.clone()).await.unwrap();
    let batch = vec![ChangeEvent::upsert(doc)];

    let pipeline = h.store.pipeline();
    let runs = (0..8).map(|_| {
        let pipeline = pipeline.clone();
        let batch = batch.clone();
        async move { pipeline.process(&batch).await }
    });
    let reports = futures::future::join_all(runs).await;

    assert!(reports.iter().all(|r| r.archived() == 1));
    let deleted = reports
        .iter()
        .filter(|r| {
            matches!(
                r.outcomes[0],
                ItemOutcome::Archived {
                    hot_deleted: true,
                    ..
                }
            )
        })
        .count();
    assert_eq!(deleted, 1);
    assert_eq!(h.cold.inner.len(), 1);
    assert_eq!(h.index.inner.len(), 1);
}

#[tokio::test]
async fn test_sqlite_and_file_backends_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let hot = Arc::new(SqliteHotStore::new(dir.path().join("hot.db")).unwrap());
    let index = Arc::new(SqliteLocationIndex::new(dir.path().join("index.db")).unwrap());
    let cold = Arc::new(FileColdStore::new(dir.path().join("cold")).unwrap());

    let mut config = TierStoreConfig::default();
    config.sweep.page_size = 2;
    let store = TierStore::new(hot.clone(), cold.clone(), index.clone(), config).unwrap();

    for (id, age) in [("a", 100), ("b", 3), ("c", 91), ("d", 1), ("e", 500)] {
        hot.upsert(id, billing_doc(id, age)).await.unwrap();
    }

    let report = store.sweeper().run_once().await.unwrap();
    assert_eq!(report.archived(), 3);
    assert_eq!(report.kept_hot(), 2);

    let remaining = hot.scan(None, 10).await.unwrap();
    let ids: Vec<&str> = remaining.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["b", "d"]);

    for id in ["a", "c", "e"] {
        let lookup = store.get(id).await.unwrap();
        assert_eq!(served_from(&lookup), Some(Tier::Cold), "record {}", id);
    }
    let entry = index.get("e").await.unwrap().unwrap();
    let path = entry.cold_path.unwrap();
    assert!(dir.path().join("cold").join(&path).exists());
}
