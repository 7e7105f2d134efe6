//! Shared fixture for integration tests.

use std::sync::Arc;
use std::time::Duration;

use axum::body::to_bytes;
use axum::http::HeaderName;
use axum::response::Response;
use bytes::Bytes;
use davstream_core::testing::{MemoryStore, write_script_encoder};
use davstream_core::{
    CacheStore, DavstreamConfig, DeliveryOrchestrator, EncoderAvailability, RemoteStore,
};
use tempfile::TempDir;

/// Store, cache and configuration rooted in a temporary directory.
pub struct Fixture {
    pub dir: TempDir,
    pub store: Arc<MemoryStore>,
    pub config: DavstreamConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = DavstreamConfig::for_testing(dir.path().join("cache"));
        Self {
            dir,
            store: Arc::new(MemoryStore::new()),
            config,
        }
    }

    pub async fn cache(&self) -> Arc<CacheStore> {
        Arc::new(CacheStore::open(self.config.cache.clone()).await.unwrap())
    }

    /// Encoder stand-in running `body` as a shell script.
    pub fn encoder(&self, body: &str) -> EncoderAvailability {
        EncoderAvailability::Available {
            binary: write_script_encoder(self.dir.path(), "encoder", body),
            version: "script".to_string(),
        }
    }

    pub fn orchestrator(
        &self,
        cache: &Arc<CacheStore>,
        availability: EncoderAvailability,
    ) -> DeliveryOrchestrator {
        let store: Arc<dyn RemoteStore> = self.store.clone();
        DeliveryOrchestrator::new(store, Arc::clone(cache), availability, &self.config)
    }
}

pub fn no_encoder() -> EncoderAvailability {
    EncoderAvailability::Unavailable {
        reason: "not installed".to_string(),
    }
}

pub async fn body_of(response: Response) -> Bytes {
    to_bytes(response.into_body(), usize::MAX).await.unwrap()
}

pub fn header(response: &Response, name: HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Polls until the cache has committed `writes` entries.
pub async fn wait_for_writes(cache: &CacheStore, writes: u64) {
    for _ in 0..300 {
        if cache.stats().writes >= writes {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("cache write did not land, stats: {:?}", cache.stats());
}
