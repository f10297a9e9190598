use crate::error::{TierError, TierKind, TierResult};
use crate::storage::LocationIndex;
use crate::types::{LocationEntry, Tier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// SQLite-backed location index. One row per record identifier; rows are
/// overwritten on re-archival and never deleted.
#[derive(Debug, Clone)]
pub struct SqliteLocationIndex {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl SqliteLocationIndex {
    pub fn new<P: Into<PathBuf>>(path: P) -> TierResult<Self> {
        let db_path = path.into();
        let conn = Connection::open(&db_path)
            .map_err(|e| TierError::from_sqlite(TierKind::Index, "open", e))?;
        Self::init(conn, db_path)
    }

    pub fn in_memory() -> TierResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| TierError::from_sqlite(TierKind::Index, "open", e))?;
        Self::init(conn, PathBuf::from(":memory:"))
    }

    fn init(conn: Connection, db_path: PathBuf) -> TierResult<Self> {
        conn.execute_batch(
            "BEGIN;CREATE TABLE IF NOT EXISTS locations(
                record_id TEXT PRIMARY KEY,
                tier TEXT NOT NULL,
                cold_path TEXT,
                updated_at TEXT NOT NULL
            );COMMIT;",
        )
        .map_err(|e| TierError::from_sqlite(TierKind::Index, "create schema", e))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> TierResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TierError::backend(TierKind::Index, "connection lock poisoned"))
    }
}

#[async_trait]
impl LocationIndex for SqliteLocationIndex {
    async fn get(&self, id: &str) -> TierResult<Option<LocationEntry>> {
        let conn = self.lock()?;
        let row: Option<(String, Option<String>, String)> = conn
            .query_row(
                "SELECT tier, cold_path, updated_at FROM locations WHERE record_id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|e| TierError::from_sqlite(TierKind::Index, "get", e))?;

        let Some((tier, cold_path, updated_at)) = row else {
            return Ok(None);
        };
        let tier = Tier::parse(&tier).ok_or_else(|| {
            TierError::backend(
                TierKind::Index,
                format!("unknown tier '{}' for record '{}'", tier, id),
            )
        })?;
        let updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .map_err(|e| {
                TierError::backend(
                    TierKind::Index,
                    format!("bad updated_at for record '{}': {}", id, e),
                )
            })?
            .with_timezone(&Utc);

        Ok(Some(LocationEntry {
            tier,
            cold_path,
            updated_at,
        }))
    }

    async fn upsert(&self, id: &str, entry: LocationEntry) -> TierResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO locations(record_id, tier, cold_path, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(record_id) DO UPDATE SET
                tier = excluded.tier,
                cold_path = excluded.cold_path,
                updated_at = excluded.updated_at",
            params![
                id,
                entry.tier.as_str(),
                entry.cold_path,
                entry.updated_at.to_rfc3339()
            ],
        )
        .map_err(|e| TierError::from_sqlite(TierKind::Index, "upsert", e))?;
        Ok(())
    }
}
