//! Tier-transparent reads: hot tier first, then the location index, then the
//! cold tier.
//!
//! The coordinator never retries. A failing hot tier is logged and the read
//! falls through to the index, so cold data stays available during a hot
//! outage.

use crate::error::{TierError, TierKind, TierResult};
use crate::resilience::with_timeout;
use crate::storage::{ColdStore, HotStore, LocationIndex};
use crate::types::{validate_record_id, Document, Retrieved, Tier};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Retrieved),
    NotFound,
}

pub struct RetrievalCoordinator {
    hot: Arc<dyn HotStore>,
    cold: Arc<dyn ColdStore>,
    index: Arc<dyn LocationIndex>,
    tier_timeout: Duration,
}

impl RetrievalCoordinator {
    pub fn new(
        hot: Arc<dyn HotStore>,
        cold: Arc<dyn ColdStore>,
        index: Arc<dyn LocationIndex>,
        tier_timeout: Duration,
    ) -> Self {
        Self {
            hot,
            cold,
            index,
            tier_timeout,
        }
    }

    pub async fn get(&self, id: &str) -> TierResult<Lookup> {
        validate_record_id(id)?;

        let hot_error = match with_timeout(TierKind::Hot, "read", self.tier_timeout, self.hot.read(id)).await {
            Ok(Some(document)) => {
                info!(record_id = id, "record found in hot tier");
                return Ok(Lookup::Found(Retrieved {
                    document,
                    served_from: Tier::Hot,
                }));
            }
            Ok(None) => {
                debug!(record_id = id, "hot tier miss, checking location index");
                None
            }
            Err(e) => {
                warn!(record_id = id, error = %e, "hot tier read failed, checking location index");
                Some(e)
            }
        };

        let entry = with_timeout(TierKind::Index, "get", self.tier_timeout, self.index.get(id)).await?;
        let Some(entry) = entry else {
            warn!(record_id = id, "no location entry for record");
            return Ok(Lookup::NotFound);
        };

        match entry.tier {
            Tier::Hot => match hot_error {
                // The index says the record lives in the hot tier, which failed.
                Some(e) => Err(e),
                None => Ok(Lookup::NotFound),
            },
            Tier::Cold => {
                let path = entry.resolvable_cold_path().ok_or_else(|| TierError::Consistency {
                    id: id.to_string(),
                    path: String::new(),
                })?;
                self.read_cold(id, path).await
            }
        }
    }

    async fn read_cold(&self, id: &str, path: &str) -> TierResult<Lookup> {
        let bytes = with_timeout(TierKind::Cold, "get", self.tier_timeout, self.cold.get(path)).await?;
        let Some(bytes) = bytes else {
            warn!(record_id = id, cold_path = path, "indexed cold blob is missing");
            return Err(TierError::Consistency {
                id: id.to_string(),
                path: path.to_string(),
            });
        };
        let document: Document = serde_json::from_slice(&bytes).map_err(|e| {
            TierError::backend(
                TierKind::Cold,
                format!("corrupt blob at '{}' for record '{}': {}", path, id, e),
            )
        })?;
        info!(record_id = id, cold_path = path, "record found in cold tier");
        Ok(Lookup::Found(Retrieved {
            document,
            served_from: Tier::Cold,
        }))
    }
}
