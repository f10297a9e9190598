//! In-memory adapters for tests, demos and single-process deployments.

use crate::error::TierResult;
use crate::storage::{ColdStore, DeleteOutcome, HotStore, LocationIndex};
use crate::types::{Document, LocationEntry};
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct InMemoryHotStore {
    records: DashMap<String, Document>,
}

impl InMemoryHotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }
}

#[async_trait]
impl HotStore for InMemoryHotStore {
    async fn read(&self, id: &str) -> TierResult<Option<Document>> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    async fn delete(&self, id: &str) -> TierResult<DeleteOutcome> {
        Ok(match self.records.remove(id) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }

    async fn upsert(&self, id: &str, document: Document) -> TierResult<()> {
        self.records.insert(id.to_string(), document);
        Ok(())
    }

    async fn scan(&self, after: Option<&str>, limit: usize) -> TierResult<Vec<(String, Document)>> {
        let mut page: Vec<(String, Document)> = self
            .records
            .iter()
            .filter(|r| after.map_or(true, |a| r.key().as_str() > a))
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        page.sort_by(|a, b| a.0.cmp(&b.0));
        page.truncate(limit);
        Ok(page)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryColdStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl InMemoryColdStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Sorted list of stored paths.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.blobs.iter().map(|b| b.key().clone()).collect();
        paths.sort();
        paths
    }

    /// Drop a blob, as an external lifecycle policy would.
    pub fn purge(&self, path: &str) -> bool {
        self.blobs.remove(path).is_some()
    }
}

#[async_trait]
impl ColdStore for InMemoryColdStore {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> TierResult<()> {
        self.blobs.insert(path.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, path: &str) -> TierResult<Option<Vec<u8>>> {
        Ok(self.blobs.get(path).map(|b| b.value().clone()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLocationIndex {
    entries: DashMap<String, LocationEntry>,
}

impl InMemoryLocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl LocationIndex for InMemoryLocationIndex {
    async fn get(&self, id: &str) -> TierResult<Option<LocationEntry>> {
        Ok(self.entries.get(id).map(|e| e.value().clone()))
    }

    async fn upsert(&self, id: &str, entry: LocationEntry) -> TierResult<()> {
        self.entries.insert(id.to_string(), entry);
        Ok(())
    }
}
