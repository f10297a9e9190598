use crate::error::{TierError, TierKind, TierResult};
use crate::storage::ColdStore;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Filesystem cold tier: each blob is a file under `base_dir` at its
/// relative cold path (e.g. `billing/2024/01/15/R1.json`).
#[derive(Debug, Clone)]
pub struct FileColdStore {
    base_dir: PathBuf,
}

impl FileColdStore {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> TierResult<Self> {
        let dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| TierError::from_io(TierKind::Cold, "create base dir", e))?;
        Ok(Self { base_dir: dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve a relative cold path, refusing anything that would leave
    /// `base_dir`.
    fn resolve(&self, rel: &str) -> TierResult<PathBuf> {
        let rel_path = Path::new(rel);
        if rel.is_empty() {
            return Err(TierError::backend(TierKind::Cold, "empty cold path"));
        }
        for component in rel_path.components() {
            match component {
                Component::Normal(_) => {}
                _ => {
                    return Err(TierError::backend(
                        TierKind::Cold,
                        format!("cold path '{}' escapes the store root", rel),
                    ))
                }
            }
        }
        Ok(self.base_dir.join(rel_path))
    }

    /// Write to a temp file in the target directory, fsync, then rename over
    /// the destination so readers never observe a partial blob.
    ///
    /// Runs to completion on the blocking pool even if the calling future is
    /// dropped (e.g. by a timeout), so the temp file is always either renamed
    /// or removed.
    async fn atomic_write(path: PathBuf, data: Vec<u8>) -> TierResult<()> {
        tokio::task::spawn_blocking(move || Self::atomic_write_blocking(&path, &data))
            .await
            .map_err(|e| TierError::backend(TierKind::Cold, format!("write task failed: {}", e)))?
    }

    fn atomic_write_blocking(path: &Path, data: &[u8]) -> TierResult<()> {
        let dir = path
            .parent()
            .ok_or_else(|| TierError::backend(TierKind::Cold, "cold path has no parent"))?;
        std::fs::create_dir_all(dir)
            .map_err(|e| TierError::from_io(TierKind::Cold, "create dir", e))?;

        let tmp = dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        let write_result = (|| {
            let mut f = std::fs::File::create(&tmp)?;
            f.write_all(data)?;
            f.sync_all()?;
            std::fs::rename(&tmp, path)
        })();

        if let Err(e) = write_result {
            let _ = std::fs::remove_file(&tmp);
            return Err(TierError::from_io(TierKind::Cold, "put", e));
        }

        // Flush the directory entry so the rename survives a crash.
        if let Ok(dir_file) = std::fs::File::open(dir) {
            let _ = dir_file.sync_all();
        }
        Ok(())
    }
}

#[async_trait]
impl ColdStore for FileColdStore {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> TierResult<()> {
        let target = self.resolve(path)?;
        Self::atomic_write(target, bytes).await
    }

    async fn get(&self, path: &str) -> TierResult<Option<Vec<u8>>> {
        let target = self.resolve(path)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TierError::from_io(TierKind::Cold, "get", e)),
        }
    }
}
