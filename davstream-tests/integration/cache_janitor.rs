//! Cache bounding after real deliveries.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use davstream_core::cache::{CacheKey, CacheKind, CacheStore, spawn_janitor};
use davstream_core::transform::TextTransform;
use davstream_core::{DeliveryOrchestrator, DeliveryRequest};

use crate::common::{Fixture, body_of, no_encoder, wait_for_writes};

const DAY: Duration = Duration::from_secs(24 * 3600);

fn entry_path(fixture: &Fixture, cache: &CacheStore, path: &str) -> PathBuf {
    let transform = TextTransform::new(fixture.config.transform.text_encoding.clone());
    let params = transform.cache_params(fixture.config.transform.text_max_size);
    cache.path_for(&CacheKey::new(CacheKind::Text, path, &params))
}

fn age_entry(path: &PathBuf, age: Duration) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

async fn warm(orchestrator: &DeliveryOrchestrator, cache: &CacheStore, paths: &[&str]) {
    for (i, path) in paths.iter().enumerate() {
        let response = orchestrator.deliver(DeliveryRequest::new(*path)).await.unwrap();
        body_of(response).await;
        wait_for_writes(cache, i as u64 + 1).await;
    }
}

#[tokio::test]
async fn test_prune_evicts_oldest_preview_over_budget() {
    let mut fixture = Fixture::new();
    fixture.config.cache.max_total_size = 9_000;
    for name in ["a", "b", "c"] {
        fixture.store.insert(&format!("notes/{name}.txt"), vec![b'x'; 4_000]);
    }
    let cache = fixture.cache().await;
    let orchestrator = fixture.orchestrator(&cache, no_encoder());
    warm(&orchestrator, &cache, &["notes/a.txt", "notes/b.txt", "notes/c.txt"]).await;

    let oldest = entry_path(&fixture, &cache, "notes/a.txt");
    age_entry(&oldest, Duration::from_secs(3600));

    let report = cache.prune().await.unwrap();

    assert_eq!(report.evicted, 1);
    assert_eq!(report.remaining_bytes, 8_000);
    assert!(!oldest.exists());
    assert!(entry_path(&fixture, &cache, "notes/b.txt").exists());

    // Evicted previews are rebuilt from the store
    let reads = fixture.store.read_count();
    body_of(orchestrator.deliver(DeliveryRequest::new("notes/a.txt")).await.unwrap()).await;
    assert_eq!(fixture.store.read_count(), reads + 1);
    body_of(orchestrator.deliver(DeliveryRequest::new("notes/c.txt")).await.unwrap()).await;
    assert_eq!(fixture.store.read_count(), reads + 1);
}

#[tokio::test]
async fn test_prune_removes_expired_previews() {
    let fixture = Fixture::new();
    fixture.store.insert("notes/old.txt", "stale");
    fixture.store.insert("notes/new.txt", "fresh");
    let cache = fixture.cache().await;
    let orchestrator = fixture.orchestrator(&cache, no_encoder());
    warm(&orchestrator, &cache, &["notes/old.txt", "notes/new.txt"]).await;

    let old = entry_path(&fixture, &cache, "notes/old.txt");
    age_entry(&old, 8 * DAY);

    let report = cache.prune().await.unwrap();

    assert_eq!(report.expired, 1);
    assert_eq!(report.evicted, 0);
    assert!(!old.exists());
    assert!(entry_path(&fixture, &cache, "notes/new.txt").exists());
}

#[tokio::test]
async fn test_janitor_prunes_periodically() {
    let mut fixture = Fixture::new();
    fixture.config.cache.enable_cleanup = true;
    fixture.config.cache.cleanup_interval = Duration::from_millis(20);
    fixture.store.insert("notes/old.txt", "stale");
    let cache = fixture.cache().await;
    let orchestrator = fixture.orchestrator(&cache, no_encoder());
    warm(&orchestrator, &cache, &["notes/old.txt"]).await;

    let old = entry_path(&fixture, &cache, "notes/old.txt");
    age_entry(&old, 30 * DAY);
    let janitor = spawn_janitor(&cache).unwrap();

    let mut removed = false;
    for _ in 0..200 {
        if !old.exists() {
            removed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    drop(janitor);
    assert!(removed, "janitor did not remove the expired entry");
}
