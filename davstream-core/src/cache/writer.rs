//! Temp-file-then-rename writes.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;

use super::{CacheError, CacheKey, CacheResult};

/// Prefix of in-progress entries; the janitor removes stale ones.
pub const TEMP_PREFIX: &str = ".tmp-";

/// Streaming writer for one cache entry.
///
/// Nothing is visible under the final path until [`commit`](Self::commit).
/// A writer dropped without committing removes its temporary file.
#[derive(Debug)]
pub struct CacheWriter {
    key: CacheKey,
    final_path: PathBuf,
    temp_path: PathBuf,
    file: Option<tokio::fs::File>,
    written: u64,
    finished: bool,
}

impl CacheWriter {
    pub(crate) fn new(key: CacheKey, final_path: PathBuf, temp_path: PathBuf) -> Self {
        Self {
            key,
            final_path,
            temp_path,
            file: None,
            written: 0,
            finished: false,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    async fn file(&mut self) -> CacheResult<&mut tokio::fs::File> {
        let file = match self.file.take() {
            Some(file) => file,
            None => tokio::fs::File::create(&self.temp_path)
                .await
                .map_err(|e| CacheError::io("create temp file", &self.temp_path, e))?,
        };
        Ok(self.file.insert(file))
    }

    /// Appends a chunk to the temporary file.
    pub async fn write(&mut self, chunk: &[u8]) -> CacheResult<()> {
        let temp_path = self.temp_path.clone();
        let file = self.file().await?;
        file.write_all(chunk)
            .await
            .map_err(|e| CacheError::io("write", &temp_path, e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flushes and atomically moves the entry into place.
    ///
    /// Returns the entry size.
    pub async fn commit(mut self) -> CacheResult<u64> {
        let temp_path = self.temp_path.clone();
        let file = self.file().await?;
        file.flush()
            .await
            .map_err(|e| CacheError::io("flush", &temp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| CacheError::io("sync", &temp_path, e))?;
        self.file = None;

        tokio::fs::rename(&self.temp_path, &self.final_path)
            .await
            .map_err(|e| CacheError::io("rename", &self.final_path, e))?;
        self.finished = true;

        tracing::debug!(key = self.key.digest(), size = self.written, "Cache entry committed");
        Ok(self.written)
    }

    /// Discards everything written so far.
    pub async fn abandon(mut self) {
        self.file = None;
        if let Err(e) = tokio::fs::remove_file(&self.temp_path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.temp_path.display(), error = %e, "Failed to remove temp cache file");
        }
        self.finished = true;
        tracing::debug!(key = self.key.digest(), written = self.written, "Cache write abandoned");
    }
}

impl Drop for CacheWriter {
    fn drop(&mut self) {
        if !self.finished {
            self.file = None;
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}
