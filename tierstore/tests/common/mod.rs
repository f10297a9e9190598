//! Shared fixtures: fault-injecting adapter wrappers around the in-memory
//! backends.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tierstore::error::{TierError, TierKind, TierResult};
use tierstore::storage::{ColdStore, DeleteOutcome, HotStore, LocationIndex};
use tierstore::storage_backends::{InMemoryColdStore, InMemoryHotStore, InMemoryLocationIndex};
use tierstore::{Document, LocationEntry, TierStore, TierStoreConfig};

pub fn billing_doc(id: &str, age_days: i64) -> Value {
    let created = Utc::now() - Duration::days(age_days);
    json!({ "id": id, "createdAt": created.to_rfc3339(), "amount": 120, "currency": "EUR" })
}

/// Config with a single attempt per call so failures surface immediately.
pub fn no_retry_config() -> TierStoreConfig {
    let mut config = TierStoreConfig::default();
    config.retry.max_attempts = 1;
    config.retry.base_backoff_ms = 0;
    config.tier_timeout_ms = 1000;
    config
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Default)]
pub struct FlakyHotStore {
    pub inner: InMemoryHotStore,
    pub failing_deletes: AtomicU32,
    pub reads_down: AtomicBool,
}

#[async_trait]
impl HotStore for FlakyHotStore {
    async fn read(&self, id: &str) -> TierResult<Option<Document>> {
        if self.reads_down.load(Ordering::SeqCst) {
            return Err(TierError::transient(TierKind::Hot, "read", "hot tier unavailable"));
        }
        self.inner.read(id).await
    }

    async fn delete(&self, id: &str) -> TierResult<DeleteOutcome> {
        if take_failure(&self.failing_deletes) {
            return Err(TierError::transient(TierKind::Hot, "delete", "connection reset"));
        }
        self.inner.delete(id).await
    }

    async fn upsert(&self, id: &str, document: Document) -> TierResult<()> {
        self.inner.upsert(id, document).await
    }

    async fn scan(&self, after: Option<&str>, limit: usize) -> TierResult<Vec<(String, Document)>> {
        self.inner.scan(after, limit).await
    }
}

#[derive(Default)]
pub struct FlakyColdStore {
    pub inner: InMemoryColdStore,
    pub failing_puts: AtomicU32,
    pub puts: AtomicU32,
}

#[async_trait]
impl ColdStore for FlakyColdStore {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> TierResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_puts) {
            return Err(TierError::transient(TierKind::Cold, "put", "503 from blob service"));
        }
        self.inner.put(path, bytes).await
    }

    async fn get(&self, path: &str) -> TierResult<Option<Vec<u8>>> {
        self.inner.get(path).await
    }
}

#[derive(Default)]
pub struct FlakyLocationIndex {
    pub inner: InMemoryLocationIndex,
    pub failing_upserts: AtomicU32,
}

#[async_trait]
impl LocationIndex for FlakyLocationIndex {
    async fn get(&self, id: &str) -> TierResult<Option<LocationEntry>> {
        self.inner.get(id).await
    }

    async fn upsert(&self, id: &str, entry: LocationEntry) -> TierResult<()> {
        if take_failure(&self.failing_upserts) {
            return Err(TierError::transient(TierKind::Index, "upsert", "write conflict"));
        }
        self.inner.upsert(id, entry).await
    }
}

pub struct Harness {
    pub hot: Arc<FlakyHotStore>,
    pub cold: Arc<FlakyColdStore>,
    pub index: Arc<FlakyLocationIndex>,
    pub store: TierStore,
}

pub fn harness(config: TierStoreConfig) -> Harness {
    let hot = Arc::new(FlakyHotStore::default());
    let cold = Arc::new(FlakyColdStore::default());
    let index = Arc::new(FlakyLocationIndex::default());
    let store = TierStore::new(hot.clone(), cold.clone(), index.clone(), config)
        .expect("valid config");
    Harness {
        hot,
        cold,
        index,
        store,
    }
}
