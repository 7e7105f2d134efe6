//! Remote object store boundary.
//!
//! Everything davstream knows about the storage backend goes through the
//! `RemoteStore` trait: metadata lookups, ranged reads, listings, and the
//! occasional write. The production implementation speaks WebDAV; tests use
//! an in-memory store with fault injection.

pub mod webdav;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

use std::ops::RangeInclusive;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::{MemoryStore, StoreFault};
pub use webdav::WebDavStore;

/// Raw byte stream produced by a remote read.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, RemoteError>> + Send>>;

/// Errors reported by a remote store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("Remote file not found: {path}")]
    NotFound { path: String },

    #[error("Remote store rejected credentials (HTTP {status})")]
    Auth { status: u16 },

    #[error("Remote transport error: {reason}")]
    Transport { reason: String },

    #[error("Invalid remote path: {path}")]
    InvalidPath { path: String },
}

impl RemoteError {
    /// Transport failures are worth retrying; missing files and bad
    /// credentials are not going to change on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transport { .. })
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        RemoteError::Transport {
            reason: error.to_string(),
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Metadata of a single remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileRef {
    /// Normalized path relative to the store root
    pub path: String,
    pub size: u64,
    /// Content type reported by the store, or guessed from the extension
    pub mime_hint: String,
}

impl RemoteFileRef {
    /// Last path segment, used for Content-Disposition.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Lowercase file extension without the dot, empty when absent.
    pub fn extension(&self) -> String {
        crate::streaming::media_info::extension_of(&self.path)
    }
}

/// Entry returned by a collection listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
    pub mime_hint: String,
}

/// Remote object store supporting ranged reads.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Looks up size and content type of a file.
    ///
    /// # Errors
    ///
    /// - `RemoteError::NotFound` - No file at `path`
    /// - `RemoteError::Auth` - Credentials rejected
    async fn stat(&self, path: &str) -> RemoteResult<RemoteFileRef>;

    /// Opens a byte stream over the inclusive `range` of a file.
    ///
    /// The returned stream yields exactly `range` and nothing else, even if
    /// the backend ignores the range and replies with the whole file.
    async fn read_stream(&self, path: &str, range: RangeInclusive<u64>) -> RemoteResult<ByteStream>;

    /// Lists the direct children of a collection.
    async fn list(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>>;

    /// Stores `data` at `path`, replacing any existing file.
    async fn write(&self, path: &str, data: Bytes) -> RemoteResult<()>;

    /// Removes the file at `path`.
    async fn delete(&self, path: &str) -> RemoteResult<()>;
}

/// Normalizes a client supplied path to a store relative one.
///
/// Leading and duplicate slashes are dropped; `.` segments are ignored and
/// any `..` segment is rejected.
///
/// # Errors
///
/// - `RemoteError::InvalidPath` - Path escapes the store root
pub fn normalize_path(path: &str) -> RemoteResult<String> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(RemoteError::InvalidPath {
                    path: path.to_string(),
                });
            }
            other => segments.push(other),
        }
    }
    Ok(segments.join("/"))
}

/// Restricts a stream to `limit` bytes after skipping the first `skip`.
///
/// Chunks are sliced without copying. Used to enforce range boundaries on
/// backends that ignore or overshoot the requested range.
pub(crate) fn window_stream(inner: ByteStream, skip: u64, limit: u64) -> ByteStream {
    Box::pin(stream::unfold(
        (inner, skip, limit),
        |(mut inner, mut skip, remaining)| async move {
            if remaining == 0 {
                return None;
            }
            loop {
                let Some(item) = inner.next().await else {
                    return None;
                };
                match item {
                    Ok(mut chunk) => {
                        let len = chunk.len() as u64;
                        if skip >= len {
                            skip -= len;
                            continue;
                        }
                        if skip > 0 {
                            chunk = chunk.slice(skip as usize..);
                            skip = 0;
                        }
                        if chunk.len() as u64 > remaining {
                            chunk.truncate(remaining as usize);
                        }
                        let remaining = remaining - chunk.len() as u64;
                        return Some((Ok(chunk), (inner, skip, remaining)));
                    }
                    Err(e) => return Some((Err(e), (inner, skip, 0))),
                }
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/movies//a.mp4").unwrap(), "movies/a.mp4");
        assert_eq!(normalize_path("./docs/./b.txt").unwrap(), "docs/b.txt");
        assert_eq!(normalize_path("").unwrap(), "");
        assert!(matches!(
            normalize_path("movies/../../etc/passwd"),
            Err(RemoteError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_file_name_and_extension() {
        let file = RemoteFileRef {
            path: "photos/2024/Beach.JPG".to_string(),
            size: 10,
            mime_hint: "image/jpeg".to_string(),
        };
        assert_eq!(file.file_name(), "Beach.JPG");
        assert_eq!(file.extension(), "jpg");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(
            RemoteError::Transport {
                reason: "reset".to_string()
            }
            .is_retryable()
        );
        assert!(!RemoteError::Auth { status: 401 }.is_retryable());
        assert!(
            !RemoteError::NotFound {
                path: "a".to_string()
            }
            .is_retryable()
        );
    }

    #[tokio::test]
    async fn test_window_stream_skips_and_limits_across_chunks() {
        let chunks: Vec<RemoteResult<Bytes>> = vec![
            Ok(Bytes::from_static(b"0123")),
            Ok(Bytes::from_static(b"4567")),
            Ok(Bytes::from_static(b"89ab")),
        ];
        let inner: ByteStream = Box::pin(stream::iter(chunks));

        let collected: Vec<Bytes> = window_stream(inner, 5, 5)
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;

        assert_eq!(collected.concat(), b"56789");
    }

    #[tokio::test]
    async fn test_window_stream_passes_errors_and_stops() {
        let chunks: Vec<RemoteResult<Bytes>> = vec![
            Ok(Bytes::from_static(b"ab")),
            Err(RemoteError::Transport {
                reason: "reset".to_string(),
            }),
            Ok(Bytes::from_static(b"cd")),
        ];
        let inner: ByteStream = Box::pin(stream::iter(chunks));

        let items: Vec<RemoteResult<Bytes>> = window_stream(inner, 0, 10).collect().await;

        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }
}
