use crate::error::{TierError, TierKind, TierResult};
use crate::storage::{DeleteOutcome, HotStore};
use crate::types::Document;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// SQLite-backed hot tier storing each record as a JSON document row.
#[derive(Debug, Clone)]
pub struct SqliteHotStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHotStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> TierResult<Self> {
        let db_path = path.into();
        let conn = Connection::open(&db_path)
            .map_err(|e| TierError::from_sqlite(TierKind::Hot, "open", e))?;
        Self::init(conn)
    }

    pub fn in_memory() -> TierResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| TierError::from_sqlite(TierKind::Hot, "open", e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> TierResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records(
                record_id TEXT PRIMARY KEY,
                document TEXT NOT NULL
             );",
        )
        .map_err(|e| TierError::from_sqlite(TierKind::Hot, "create schema", e))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> TierResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TierError::backend(TierKind::Hot, "connection lock poisoned"))
    }

    fn decode(id: &str, payload: &str) -> TierResult<Document> {
        serde_json::from_str(payload).map_err(|e| {
            TierError::backend(
                TierKind::Hot,
                format!("corrupt document for record '{}': {}", id, e),
            )
        })
    }
}

#[async_trait]
impl HotStore for SqliteHotStore {
    async fn read(&self, id: &str) -> TierResult<Option<Document>> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT document FROM records WHERE record_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| TierError::from_sqlite(TierKind::Hot, "read", e))?;
        payload.map(|p| Self::decode(id, &p)).transpose()
    }

    async fn delete(&self, id: &str) -> TierResult<DeleteOutcome> {
        let conn = self.lock()?;
        let changed = conn
            .execute("DELETE FROM records WHERE record_id = ?1", params![id])
            .map_err(|e| TierError::from_sqlite(TierKind::Hot, "delete", e))?;
        Ok(if changed > 0 {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotFound
        })
    }

    async fn upsert(&self, id: &str, document: Document) -> TierResult<()> {
        let payload = serde_json::to_string(&document)
            .map_err(|e| TierError::backend(TierKind::Hot, e.to_string()))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO records(record_id, document) VALUES (?1, ?2)
             ON CONFLICT(record_id) DO UPDATE SET document = excluded.document",
            params![id, payload],
        )
        .map_err(|e| TierError::from_sqlite(TierKind::Hot, "upsert", e))?;
        Ok(())
    }

    async fn scan(&self, after: Option<&str>, limit: usize) -> TierResult<Vec<(String, Document)>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT record_id, document FROM records
                 WHERE record_id > ?1 ORDER BY record_id LIMIT ?2",
            )
            .map_err(|e| TierError::from_sqlite(TierKind::Hot, "scan", e))?;
        let rows = stmt
            .query_map(params![after.unwrap_or(""), limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| TierError::from_sqlite(TierKind::Hot, "scan", e))?;

        let mut out = Vec::new();
        for row in rows {
            let (id, payload) = row.map_err(|e| TierError::from_sqlite(TierKind::Hot, "scan", e))?;
            let document = Self::decode(&id, &payload)?;
            out.push((id, document));
        }
        Ok(out)
    }
}
