//! Adapter traits for the hot tier, the cold tier and the location index.
//!
//! Adapters are constructed once at process start and shared behind `Arc`s
//! by the pipeline, the retrieval coordinator and the HTTP layer.
//! Definitive absence is `Ok(None)`; errors follow [`TierError`].

use crate::error::TierResult;
use crate::types::{Document, LocationEntry};
use async_trait::async_trait;

/// Outcome of a hot-tier delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Low-latency store holding recent records keyed by identifier.
#[async_trait]
pub trait HotStore: Send + Sync {
    async fn read(&self, id: &str) -> TierResult<Option<Document>>;

    async fn delete(&self, id: &str) -> TierResult<DeleteOutcome>;

    /// Insert or replace a record. Used by the external write path, never by
    /// the archival pipeline.
    async fn upsert(&self, id: &str, document: Document) -> TierResult<()>;

    /// Page through stored documents in identifier order, starting strictly
    /// after `after`.
    async fn scan(&self, after: Option<&str>, limit: usize) -> TierResult<Vec<(String, Document)>>;
}

/// Durable blob store addressed by relative path.
#[async_trait]
pub trait ColdStore: Send + Sync {
    /// Write `bytes` at `path`, overwriting any previous blob.
    async fn put(&self, path: &str, bytes: Vec<u8>) -> TierResult<()>;

    async fn get(&self, path: &str) -> TierResult<Option<Vec<u8>>>;
}

/// Durable identifier → location mapping; the archival commit point.
#[async_trait]
pub trait LocationIndex: Send + Sync {
    async fn get(&self, id: &str) -> TierResult<Option<LocationEntry>>;

    async fn upsert(&self, id: &str, entry: LocationEntry) -> TierResult<()>;
}
