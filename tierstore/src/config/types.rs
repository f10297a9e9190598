use crate::cold_path::ColdPathTemplate;
use crate::error::{TierError, TierResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for archival and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierStoreConfig {
    /// Records strictly older than this many days are archived.
    pub archival_threshold_days: u32,
    pub cold_path: ColdPathTemplate,
    /// Bound applied to every individual adapter call.
    pub tier_timeout_ms: u64,
    pub pipeline: PipelineConfig,
    pub retry: RetryConfig,
    pub sweep: SweepConfig,
}

impl Default for TierStoreConfig {
    fn default() -> Self {
        Self {
            archival_threshold_days: 90,
            cold_path: ColdPathTemplate::default(),
            tier_timeout_ms: 5_000,
            pipeline: PipelineConfig::default(),
            retry: RetryConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum change events pulled from the feed per batch.
    pub batch_size: usize,
    /// Number of identifier-hash partitions processed in parallel.
    pub concurrency: usize,
    /// Deliveries after which a failing change event is dead-lettered.
    pub max_redeliveries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            concurrency: 4,
            max_redeliveries: 5,
        }
    }
}

/// Exponential backoff for transient adapter failures in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per adapter call, including the first.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 100,
            max_backoff_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub page_size: usize,
    /// Period of the background sweep; `None` disables it.
    pub interval_secs: Option<u64>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            page_size: 500,
            interval_secs: None,
        }
    }
}

impl TierStoreConfig {
    /// Load from a TOML file; missing keys keep their defaults.
    pub fn from_file(path: &str) -> TierResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TierError::Config(format!("failed to read '{}': {}", path, e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> TierResult<Self> {
        let config: TierStoreConfig = toml::from_str(content)
            .map_err(|e| TierError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `TIERSTORE_*` environment variables.
    pub fn from_env() -> TierResult<Self> {
        Self::default().overlay_env(|key| std::env::var(key).ok())
    }

    /// Overlay values from a variable lookup. Split out so tests need not
    /// touch the process environment.
    pub fn overlay_env<F>(mut self, lookup: F) -> TierResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: String) -> TierResult<T> {
            raw.trim()
                .parse()
                .map_err(|_| TierError::Config(format!("invalid value '{}' for {}", raw, key)))
        }

        if let Some(v) = lookup("TIERSTORE_ARCHIVAL_THRESHOLD_DAYS") {
            self.archival_threshold_days = parse("TIERSTORE_ARCHIVAL_THRESHOLD_DAYS", v)?;
        }
        if let Some(v) = lookup("TIERSTORE_COLD_CATEGORY") {
            self.cold_path.category = v;
        }
        if let Some(v) = lookup("TIERSTORE_COLD_EXTENSION") {
            self.cold_path.extension = v;
        }
        if let Some(v) = lookup("TIERSTORE_TIER_TIMEOUT_MS") {
            self.tier_timeout_ms = parse("TIERSTORE_TIER_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("TIERSTORE_BATCH_SIZE") {
            self.pipeline.batch_size = parse("TIERSTORE_BATCH_SIZE", v)?;
        }
        if let Some(v) = lookup("TIERSTORE_CONCURRENCY") {
            self.pipeline.concurrency = parse("TIERSTORE_CONCURRENCY", v)?;
        }
        if let Some(v) = lookup("TIERSTORE_MAX_REDELIVERIES") {
            self.pipeline.max_redeliveries = parse("TIERSTORE_MAX_REDELIVERIES", v)?;
        }
        if let Some(v) = lookup("TIERSTORE_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse("TIERSTORE_RETRY_MAX_ATTEMPTS", v)?;
        }
        if let Some(v) = lookup("TIERSTORE_RETRY_BASE_BACKOFF_MS") {
            self.retry.base_backoff_ms = parse("TIERSTORE_RETRY_BASE_BACKOFF_MS", v)?;
        }
        if let Some(v) = lookup("TIERSTORE_RETRY_MAX_BACKOFF_MS") {
            self.retry.max_backoff_ms = parse("TIERSTORE_RETRY_MAX_BACKOFF_MS", v)?;
        }
        if let Some(v) = lookup("TIERSTORE_SWEEP_PAGE_SIZE") {
            self.sweep.page_size = parse("TIERSTORE_SWEEP_PAGE_SIZE", v)?;
        }
        if let Some(v) = lookup("TIERSTORE_SWEEP_INTERVAL_SECS") {
            self.sweep.interval_secs = Some(parse("TIERSTORE_SWEEP_INTERVAL_SECS", v)?);
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> TierResult<()> {
        self.cold_path.validate()?;
        if self.tier_timeout_ms == 0 {
            return Err(TierError::Config("tier_timeout_ms must be > 0".to_string()));
        }
        if self.pipeline.batch_size == 0 {
            return Err(TierError::Config("pipeline.batch_size must be > 0".to_string()));
        }
        if self.pipeline.concurrency == 0 {
            return Err(TierError::Config("pipeline.concurrency must be > 0".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(TierError::Config("retry.max_attempts must be > 0".to_string()));
        }
        if self.retry.base_backoff_ms > self.retry.max_backoff_ms {
            return Err(TierError::Config(
                "retry.base_backoff_ms must not exceed retry.max_backoff_ms".to_string(),
            ));
        }
        if self.sweep.page_size == 0 {
            return Err(TierError::Config("sweep.page_size must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn archival_threshold(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.archival_threshold_days))
    }

    pub fn tier_timeout(&self) -> Duration {
        Duration::from_millis(self.tier_timeout_ms)
    }
}
