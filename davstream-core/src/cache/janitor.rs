//! Cache bounding: age limit plus a disk budget.

use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use super::writer::TEMP_PREFIX;
use super::{CacheError, CacheKind, CacheResult, CacheStore};
use crate::task::AbortOnDrop;

/// Temp files older than this belong to writers that died mid-write.
const STALE_TEMP_AGE: Duration = Duration::from_secs(3600);

/// Summary of one prune pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub expired: usize,
    pub evicted: usize,
    pub stale_temp: usize,
    pub freed_bytes: u64,
    pub remaining_bytes: u64,
}

struct EntryInfo {
    path: std::path::PathBuf,
    size: u64,
    modified: SystemTime,
}

impl CacheStore {
    /// Removes expired entries, then the oldest entries until the cache fits
    /// its disk budget.
    ///
    /// # Errors
    ///
    /// - `CacheError::Io` - A cache directory could not be listed
    pub async fn prune(&self) -> CacheResult<PruneReport> {
        let now = SystemTime::now();
        let max_age = self.config().max_age;
        let mut report = PruneReport::default();
        let mut entries = Vec::new();

        for kind in CacheKind::ALL {
            let dir = self.dir_for(kind);
            let mut listing = match tokio::fs::read_dir(&dir).await {
                Ok(listing) => listing,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(CacheError::io("list directory", &dir, e)),
            };

            while let Some(entry) = listing
                .next_entry()
                .await
                .map_err(|e| CacheError::io("list directory", &dir, e))?
            {
                let Ok(metadata) = entry.metadata().await else {
                    continue;
                };
                if !metadata.is_file() {
                    continue;
                }
                let modified = metadata.modified().unwrap_or(now);
                let age = now.duration_since(modified).unwrap_or_default();
                let is_temp = entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX);

                if is_temp {
                    if age > STALE_TEMP_AGE && remove(&entry.path()).await {
                        report.stale_temp += 1;
                        report.freed_bytes += metadata.len();
                    }
                    continue;
                }

                if age > max_age {
                    if remove(&entry.path()).await {
                        report.expired += 1;
                        report.freed_bytes += metadata.len();
                    }
                    continue;
                }

                entries.push(EntryInfo {
                    path: entry.path(),
                    size: metadata.len(),
                    modified,
                });
            }
        }

        let mut total: u64 = entries.iter().map(|e| e.size).sum();
        let budget = self.config().max_total_size;
        if total > budget {
            entries.sort_by_key(|e| e.modified);
            for entry in &entries {
                if total <= budget {
                    break;
                }
                if remove(&entry.path).await {
                    total -= entry.size;
                    report.evicted += 1;
                    report.freed_bytes += entry.size;
                }
            }
        }
        report.remaining_bytes = total;

        if report.expired + report.evicted + report.stale_temp > 0 {
            tracing::info!(
                expired = report.expired,
                evicted = report.evicted,
                stale_temp = report.stale_temp,
                freed_bytes = report.freed_bytes,
                remaining_bytes = report.remaining_bytes,
                "Cache pruned"
            );
        }
        Ok(report)
    }
}

async fn remove(path: &std::path::Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Failed to remove cache file");
            false
        }
    }
}

/// Runs [`CacheStore::prune`] every `cleanup_interval` while the store lives.
///
/// Returns `None` when periodic cleanup is disabled. Dropping the returned
/// guard stops the janitor.
pub fn spawn_janitor(cache: &Arc<CacheStore>) -> Option<AbortOnDrop<()>> {
    if !cache.config().enable_cleanup {
        return None;
    }

    let weak: Weak<CacheStore> = Arc::downgrade(cache);
    let period = cache.config().cleanup_interval;

    Some(AbortOnDrop::new(tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let Some(cache) = weak.upgrade() else {
                break;
            };
            if let Err(e) = cache.prune().await {
                tracing::warn!(error = %e, "Cache prune failed");
            }
        }
    })))
}
