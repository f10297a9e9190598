//! Error taxonomy shared by the adapters, the archival pipeline and the
//! retrieval coordinator.
//!
//! Definitive absence is never an error: adapters report it as `Ok(None)`.

use std::fmt;
use thiserror::Error;

/// Which side of the system produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierKind {
    Hot,
    Cold,
    Index,
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierKind::Hot => write!(f, "hot"),
            TierKind::Cold => write!(f, "cold"),
            TierKind::Index => write!(f, "index"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum TierError {
    /// Missing or unparseable identifier/timestamp. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Timeout or availability failure on one tier. Safe to retry.
    #[error("transient {tier} error during {op}: {message}")]
    Transient {
        tier: TierKind,
        op: &'static str,
        message: String,
    },

    /// The index points at cold data that cannot be found.
    #[error("consistency error: index maps '{id}' to cold path '{path}' but no blob exists there")]
    Consistency { id: String, path: String },

    /// Non-retryable adapter failure (disk full, corrupt blob, bad schema...).
    #[error("{tier} backend error: {message}")]
    Backend { tier: TierKind, message: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl TierError {
    pub fn transient(tier: TierKind, op: &'static str, message: impl Into<String>) -> Self {
        TierError::Transient {
            tier,
            op,
            message: message.into(),
        }
    }

    pub fn backend(tier: TierKind, message: impl Into<String>) -> Self {
        TierError::Backend {
            tier,
            message: message.into(),
        }
    }

    /// Whether the pipeline may retry the failed call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TierError::Transient { .. })
    }

    /// Short machine-readable code used by the HTTP layer and reports.
    pub fn code(&self) -> &'static str {
        match self {
            TierError::Validation(_) => "validation_error",
            TierError::Transient { .. } => "transient_error",
            TierError::Consistency { .. } => "consistency_error",
            TierError::Backend { .. } => "backend_error",
            TierError::Config(_) => "config_error",
        }
    }

    /// Classify an I/O error raised by a tier adapter.
    pub fn from_io(tier: TierKind, op: &'static str, e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::TimedOut
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionRefused
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe => TierError::transient(tier, op, e.to_string()),
            _ => TierError::backend(tier, format!("{}: {}", op, e)),
        }
    }

    /// Classify a SQLite error. Busy/locked databases are retryable.
    pub fn from_sqlite(tier: TierKind, op: &'static str, e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match &e {
            rusqlite::Error::SqliteFailure(inner, _)
                if matches!(
                    inner.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) =>
            {
                TierError::transient(tier, op, e.to_string())
            }
            _ => TierError::backend(tier, format!("{}: {}", op, e)),
        }
    }
}

pub type TierResult<T> = Result<T, TierError>;
