//! In-memory remote store with fault injection for tests.

use std::collections::{HashMap, VecDeque};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, future, stream};
use parking_lot::{Mutex, RwLock};

use super::{
    ByteStream, RemoteEntry, RemoteError, RemoteFileRef, RemoteResult, RemoteStore,
    normalize_path,
};

/// Fault applied to the next `read_stream` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreFault {
    /// Open fails with a transport error
    FailOpen,
    /// Stream delivers this many bytes and then never yields again
    StallAfter(u64),
    /// Stream delivers this many bytes and then reports a transport error
    ResetAfter(u64),
    /// Open never answers
    HangOnOpen,
}

#[derive(Debug, Clone)]
struct StoredFile {
    data: Bytes,
    mime: String,
}

/// Remote store backed by a hash map.
///
/// Every ranged read is recorded so tests can assert exactly which bytes
/// were requested from the backend.
#[derive(Debug)]
pub struct MemoryStore {
    files: RwLock<HashMap<String, StoredFile>>,
    faults: Mutex<VecDeque<StoreFault>>,
    reads: Mutex<Vec<(String, RangeInclusive<u64>)>>,
    stats: AtomicUsize,
    chunk_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_chunk_size(64 * 1024)
    }

    /// Creates a store that emits reads in chunks of `chunk_size` bytes.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            faults: Mutex::new(VecDeque::new()),
            reads: Mutex::new(Vec::new()),
            stats: AtomicUsize::new(0),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Adds or replaces a file. The MIME type is guessed from the extension.
    pub fn insert(&self, path: &str, data: impl Into<Bytes>) {
        let mime = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();
        self.insert_with_mime(path, data, &mime);
    }

    pub fn insert_with_mime(&self, path: &str, data: impl Into<Bytes>, mime: &str) {
        let path = normalize_path(path).unwrap_or_else(|_| path.to_string());
        self.files.write().insert(
            path,
            StoredFile {
                data: data.into(),
                mime: mime.to_string(),
            },
        );
    }

    /// Queues a fault for the next read; faults are consumed in order.
    pub fn inject(&self, fault: StoreFault) {
        self.faults.lock().push_back(fault);
    }

    /// All ranged reads issued so far, including failed opens.
    pub fn reads(&self) -> Vec<(String, RangeInclusive<u64>)> {
        self.reads.lock().clone()
    }

    pub fn read_count(&self) -> usize {
        self.reads.lock().len()
    }

    pub fn stat_count(&self) -> usize {
        self.stats.load(Ordering::SeqCst)
    }

    fn chunks(&self, data: Bytes) -> Vec<RemoteResult<Bytes>> {
        let mut chunks = Vec::new();
        let mut rest = data;
        while !rest.is_empty() {
            let take = rest.len().min(self.chunk_size);
            chunks.push(Ok(rest.split_to(take)));
        }
        chunks
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn stat(&self, path: &str) -> RemoteResult<RemoteFileRef> {
        self.stats.fetch_add(1, Ordering::SeqCst);
        let path = normalize_path(path)?;
        let files = self.files.read();
        let file = files
            .get(&path)
            .ok_or_else(|| RemoteError::NotFound { path: path.clone() })?;

        Ok(RemoteFileRef {
            size: file.data.len() as u64,
            mime_hint: file.mime.clone(),
            path,
        })
    }

    async fn read_stream(&self, path: &str, range: RangeInclusive<u64>) -> RemoteResult<ByteStream> {
        let path = normalize_path(path)?;
        self.reads.lock().push((path.clone(), range.clone()));

        let data = self
            .files
            .read()
            .get(&path)
            .map(|file| file.data.clone())
            .ok_or_else(|| RemoteError::NotFound { path: path.clone() })?;

        let (start, end) = (*range.start(), *range.end());
        if start > end || end >= data.len() as u64 {
            return Err(RemoteError::Transport {
                reason: format!("range {start}-{end} not satisfiable for {path}"),
            });
        }
        let slice = data.slice(start as usize..=end as usize);

        let fault = self.faults.lock().pop_front();
        match fault {
            None => Ok(Box::pin(stream::iter(self.chunks(slice)))),
            Some(StoreFault::FailOpen) => Err(RemoteError::Transport {
                reason: "injected open failure".to_string(),
            }),
            Some(StoreFault::StallAfter(bytes)) => {
                let head = slice.slice(..(bytes as usize).min(slice.len()));
                Ok(Box::pin(
                    stream::iter(self.chunks(head)).chain(stream::pending()),
                ))
            }
            Some(StoreFault::ResetAfter(bytes)) => {
                let head = slice.slice(..(bytes as usize).min(slice.len()));
                let reset = stream::once(async {
                    Err(RemoteError::Transport {
                        reason: "injected connection reset".to_string(),
                    })
                });
                Ok(Box::pin(stream::iter(self.chunks(head)).chain(reset)))
            }
            Some(StoreFault::HangOnOpen) => future::pending().await,
        }
    }

    async fn list(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        let prefix = normalize_path(path)?;
        let prefix = if prefix.is_empty() {
            prefix
        } else {
            format!("{prefix}/")
        };

        let mut entries: Vec<RemoteEntry> = self
            .files
            .read()
            .iter()
            .filter_map(|(path, file)| {
                let rest = path.strip_prefix(&prefix)?;
                (!rest.contains('/')).then(|| RemoteEntry {
                    path: path.clone(),
                    size: file.data.len() as u64,
                    is_dir: false,
                    mime_hint: file.mime.clone(),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn write(&self, path: &str, data: Bytes) -> RemoteResult<()> {
        self.insert(&normalize_path(path)?, data);
        Ok(())
    }

    async fn delete(&self, path: &str) -> RemoteResult<()> {
        let path = normalize_path(path)?;
        self.files
            .write()
            .remove(&path)
            .map(|_| ())
            .ok_or(RemoteError::NotFound { path })
    }
}
