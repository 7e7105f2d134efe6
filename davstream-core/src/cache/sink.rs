//! Background consumer that persists the side channel of a tee.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::{CacheKey, CacheStore};
use crate::streaming::{TeeOutcome, TeeReceiver};

/// Drains `receiver` into a cache entry for `key`.
///
/// The entry is committed only when the tee reports a complete stream;
/// otherwise the partial temp file is discarded. The task is detached from
/// the response so a finished write can still land after the client left.
/// Resolves to whether the entry was committed.
pub fn spawn_tee_sink(
    cache: Arc<CacheStore>,
    key: CacheKey,
    receiver: TeeReceiver,
) -> JoinHandle<bool> {
    tokio::spawn(async move {
        let TeeReceiver {
            mut chunks,
            outcome,
        } = receiver;
        let mut writer = cache.writer(&key);
        let mut write_error = None;

        while let Some(chunk) = chunks.recv().await {
            if write_error.is_some() {
                continue;
            }
            if let Err(e) = writer.write(&chunk).await {
                write_error = Some(e);
            }
        }

        let outcome = outcome.await.unwrap_or(TeeOutcome::Abandoned);
        match (outcome, write_error) {
            (TeeOutcome::Complete { bytes }, None) => match writer.commit().await {
                Ok(_) => {
                    cache.record_write(true);
                    tracing::debug!(key = key.digest(), bytes, "Cached transformed output");
                    true
                }
                Err(e) => {
                    cache.record_write(false);
                    tracing::warn!(key = key.digest(), error = %e, "Failed to commit cache entry");
                    false
                }
            },
            (_, Some(e)) => {
                writer.abandon().await;
                cache.record_write(false);
                tracing::warn!(key = key.digest(), error = %e, "Cache write failed");
                false
            }
            (TeeOutcome::Abandoned, None) => {
                writer.abandon().await;
                tracing::debug!(key = key.digest(), "Cache write skipped for incomplete stream");
                false
            }
        }
    })
}
