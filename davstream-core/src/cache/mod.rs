//! Content-addressed disk cache for transformed media.
//!
//! Entries live at `<root>/<kind>/<sha1-hex>` and hold the transformed bytes
//! with no framing. Every write goes to a temporary file in the same
//! directory and is renamed into place, so readers only ever see complete
//! entries and concurrent writers of one key end up last-writer-wins.

pub mod janitor;
pub mod sink;
pub mod writer;

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use futures::Stream;
pub use janitor::{PruneReport, spawn_janitor};
use sha1::{Digest, Sha1};
pub use sink::spawn_tee_sink;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
pub use writer::CacheWriter;

use crate::config::CacheConfig;
use crate::streaming::ByteRange;

/// Errors raised by cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache I/O error during {operation} on {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    pub(crate) fn io(operation: &'static str, path: &Path, source: std::io::Error) -> Self {
        CacheError::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Transform family an entry belongs to; one sub-directory each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Image,
    Video,
    Text,
}

impl CacheKind {
    pub const ALL: [CacheKind; 3] = [CacheKind::Image, CacheKind::Video, CacheKind::Text];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Image => "image",
            CacheKind::Video => "video",
            CacheKind::Text => "text",
        }
    }
}

/// Stable cache key derived from the source path and transform parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: CacheKind,
    digest: String,
}

impl CacheKey {
    /// Hashes `(path, kind, params)` with SHA-1.
    ///
    /// `params` must encode every parameter that changes the output bytes.
    pub fn new(kind: CacheKind, path: &str, params: &str) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(kind.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(params.as_bytes());

        Self {
            kind,
            digest: hex::encode(hasher.finalize()),
        }
    }

    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

/// Counters exposed through the health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub write_failures: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

/// Open handle on a cached entry.
#[derive(Debug)]
pub struct CachedEntry {
    file: tokio::fs::File,
    pub size: u64,
}

impl CachedEntry {
    /// Streams `range` of the entry, or all of it when `None`.
    pub async fn into_stream(
        mut self,
        range: Option<ByteRange>,
    ) -> std::io::Result<impl Stream<Item = std::io::Result<Bytes>> + Send> {
        let (start, length) = match range {
            Some(range) => (range.start, range.length()),
            None => (0, self.size),
        };
        if start > 0 {
            self.file.seek(SeekFrom::Start(start)).await?;
        }
        Ok(ReaderStream::with_capacity(self.file.take(length), 64 * 1024))
    }
}

/// Disk cache for transform output.
pub struct CacheStore {
    root: PathBuf,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
}

impl CacheStore {
    /// Creates the per-kind directories under the configured root.
    ///
    /// # Errors
    ///
    /// - `CacheError::Io` - A directory could not be created
    pub async fn open(config: CacheConfig) -> CacheResult<Self> {
        for kind in CacheKind::ALL {
            let dir = config.root.join(kind.as_str());
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| CacheError::io("create directory", &dir, e))?;
        }

        tracing::info!(root = %config.root.display(), "Cache store ready");

        Ok(Self {
            root: config.root.clone(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn dir_for(&self, kind: CacheKind) -> PathBuf {
        self.root.join(kind.as_str())
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir_for(key.kind()).join(key.digest())
    }

    /// Reads a whole entry. Any failure counts as a miss.
    pub async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(data) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = key.digest(), size = data.len(), "Cache hit");
                Some(Bytes::from(data))
            }
            Err(e) => {
                self.record_miss(key, e);
                None
            }
        }
    }

    /// Opens an entry for streaming. Any failure counts as a miss.
    pub async fn open_entry(&self, key: &CacheKey) -> Option<CachedEntry> {
        let path = self.path_for(key);
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) => {
                self.record_miss(key, e);
                return None;
            }
        };
        match file.metadata().await {
            Ok(metadata) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = key.digest(), size = metadata.len(), "Cache hit");
                Some(CachedEntry {
                    file,
                    size: metadata.len(),
                })
            }
            Err(e) => {
                self.record_miss(key, e);
                None
            }
        }
    }

    fn record_miss(&self, key: &CacheKey, error: std::io::Error) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        if error.kind() == std::io::ErrorKind::NotFound {
            tracing::debug!(key = key.digest(), "Cache miss");
        } else {
            tracing::warn!(key = key.digest(), error = %error, "Cache read failed, treating as miss");
        }
    }

    /// Stores a complete entry. Best-effort: failures are logged, not returned.
    pub async fn put(&self, key: &CacheKey, data: Bytes) {
        let mut writer = self.writer(key);
        let result = match writer.write(&data).await {
            Ok(()) => writer.commit().await.map(|_| ()),
            Err(e) => {
                writer.abandon().await;
                Err(e)
            }
        };
        self.record_write(result.is_ok());
        if let Err(e) = result {
            tracing::warn!(key = key.digest(), error = %e, "Cache write failed");
        }
    }

    /// Starts a streaming write of `key`.
    pub fn writer(&self, key: &CacheKey) -> CacheWriter {
        let dir = self.dir_for(key.kind());
        let temp_path = dir.join(format!("{}{}", writer::TEMP_PREFIX, uuid::Uuid::new_v4()));
        CacheWriter::new(key.clone(), self.path_for(key), temp_path)
    }

    pub(crate) fn record_write(&self, committed: bool) {
        if committed {
            self.writes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use tempfile::tempdir;

    use super::*;

    async fn store(root: &Path) -> CacheStore {
        CacheStore::open(CacheConfig {
            root: root.to_path_buf(),
            enable_cleanup: false,
            ..CacheConfig::default()
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_key_is_stable_and_parameter_sensitive() {
        let a = CacheKey::new(CacheKind::Image, "photos/a.jpg", "w=640;h=640;q=60;fmt=jpeg");
        let b = CacheKey::new(CacheKind::Image, "photos/a.jpg", "w=640;h=640;q=60;fmt=jpeg");
        let c = CacheKey::new(CacheKind::Image, "photos/a.jpg", "w=1280;h=1280;q=75;fmt=jpeg");
        let d = CacheKey::new(CacheKind::Video, "photos/a.jpg", "w=640;h=640;q=60;fmt=jpeg");

        assert_eq!(a, b);
        assert_ne!(a.digest(), c.digest());
        assert_ne!(a.digest(), d.digest());
        assert_eq!(a.digest().len(), 40);
        assert!(a.digest().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_open_creates_kind_directories() {
        let dir = tempdir().unwrap();
        let cache = store(dir.path()).await;

        for kind in CacheKind::ALL {
            assert!(cache.dir_for(kind).is_dir());
        }
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let dir = tempdir().unwrap();
        let cache = store(dir.path()).await;
        let key = CacheKey::new(CacheKind::Text, "docs/a.txt", "max=10");

        assert!(cache.get(&key).await.is_none());
        cache.put(&key, Bytes::from_static(b"preview")).await;

        assert_eq!(cache.get(&key).await.unwrap(), Bytes::from_static(b"preview"));
        assert_eq!(
            cache.path_for(&key),
            dir.path().join("text").join(key.digest())
        );

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.writes), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_zero_length_entries_round_trip() {
        let dir = tempdir().unwrap();
        let cache = store(dir.path()).await;
        let key = CacheKey::new(CacheKind::Text, "docs/empty.txt", "max=10");

        cache.put(&key, Bytes::new()).await;

        assert_eq!(cache.get(&key).await, Some(Bytes::new()));
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let dir = tempdir().unwrap();
        let cache = store(dir.path()).await;
        let key = CacheKey::new(CacheKind::Image, "a.png", "q=60");

        cache.put(&key, Bytes::from_static(b"first")).await;
        cache.put(&key, Bytes::from_static(b"second")).await;

        assert_eq!(cache.get(&key).await.unwrap(), Bytes::from_static(b"second"));
    }

    #[tokio::test]
    async fn test_entry_streams_requested_range() {
        let dir = tempdir().unwrap();
        let cache = store(dir.path()).await;
        let key = CacheKey::new(CacheKind::Video, "clip.mkv", "tier=low");
        cache.put(&key, Bytes::from_static(b"0123456789")).await;

        let entry = cache.open_entry(&key).await.unwrap();
        assert_eq!(entry.size, 10);

        let range = ByteRange {
            start: 3,
            end: 6,
            total: 10,
        };
        let chunks: Vec<Bytes> = entry
            .into_stream(Some(range))
            .await
            .unwrap()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.concat(), b"3456");
    }
}
