//! Configuration for the tiered store.
//!
//! Values come from a TOML file (`TierStoreConfig::from_file`) or from
//! `TIERSTORE_*` environment variables overlaid on the defaults.

pub mod types;

pub use types::*;
