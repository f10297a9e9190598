//! Wiring of adapters into the pipeline, coordinator and sweeper.

use crate::change_feed::ChangeFeedConsumer;
use crate::config::TierStoreConfig;
use crate::error::TierResult;
use crate::pipeline::ArchivalPipeline;
use crate::retrieval::{Lookup, RetrievalCoordinator};
use crate::storage::{ColdStore, HotStore, LocationIndex};
use crate::sweep::Sweeper;
use crate::types::ChangeEvent;
use std::sync::Arc;

/// Adapters are built once at process start and shared by reference with
/// every component that needs them.
pub struct TierStore {
    config: TierStoreConfig,
    hot: Arc<dyn HotStore>,
    pipeline: Arc<ArchivalPipeline>,
    coordinator: Arc<RetrievalCoordinator>,
}

impl TierStore {
    pub fn new(
        hot: Arc<dyn HotStore>,
        cold: Arc<dyn ColdStore>,
        index: Arc<dyn LocationIndex>,
        config: TierStoreConfig,
    ) -> TierResult<Self> {
        config.validate()?;
        let pipeline = Arc::new(ArchivalPipeline::new(
            hot.clone(),
            cold.clone(),
            index.clone(),
            &config,
        ));
        let coordinator = Arc::new(RetrievalCoordinator::new(
            hot.clone(),
            cold,
            index,
            config.tier_timeout(),
        ));
        Ok(Self {
            config,
            hot,
            pipeline,
            coordinator,
        })
    }

    pub fn config(&self) -> &TierStoreConfig {
        &self.config
    }

    pub fn pipeline(&self) -> Arc<ArchivalPipeline> {
        self.pipeline.clone()
    }

    pub fn coordinator(&self) -> Arc<RetrievalCoordinator> {
        self.coordinator.clone()
    }

    pub async fn get(&self, id: &str) -> TierResult<Lookup> {
        self.coordinator.get(id).await
    }

    pub async fn process(&self, batch: &[ChangeEvent]) -> crate::pipeline::BatchReport {
        self.pipeline.process(batch).await
    }

    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(
            self.hot.clone(),
            self.pipeline.clone(),
            self.config.sweep.page_size,
            self.config.tier_timeout(),
        )
        .with_retry_policy(crate::resilience::RetryPolicy::from_config(&self.config.retry))
    }

    pub fn consumer(&self) -> ChangeFeedConsumer {
        ChangeFeedConsumer::new(
            self.pipeline.clone(),
            self.config.pipeline.batch_size,
            self.config.pipeline.max_redeliveries,
        )
    }

    #[cfg(feature = "server")]
    pub fn router(&self) -> axum::Router {
        crate::http::router(self.coordinator.clone())
    }
}
