// tierstore library
// Two-tier record store: hot tier for recent records, cold tier for aged-out
// records, change-driven archival between them and tier-transparent reads.

pub mod change_feed;
pub mod cold_path;
pub mod config;
pub mod decider;
pub mod error;
#[cfg(feature = "server")]
pub mod http;
pub mod pipeline;
pub mod resilience;
pub mod retrieval;
pub mod storage;
pub mod storage_backends;
pub mod sweep;
pub mod tier_store;
pub mod types;

pub use crate::config::TierStoreConfig;
pub use crate::error::{TierError, TierKind, TierResult};
pub use crate::retrieval::{Lookup, RetrievalCoordinator};
pub use crate::tier_store::TierStore;
pub use crate::types::{ChangeEvent, ChangeKind, Document, LocationEntry, Record, Retrieved, Tier};
