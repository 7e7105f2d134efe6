//! Video transcoding with a scripted encoder.

use std::time::Duration;

use axum::body::to_bytes;
use axum::http::StatusCode;
use axum::http::header::{CONTENT_RANGE, CONTENT_TYPE};
use davstream_core::DeliveryRequest;
use davstream_core::cache::CacheKind;
use davstream_core::cache::writer::TEMP_PREFIX;
use davstream_core::testing::patterned_bytes;
use davstream_core::transform::Quality;
use futures::StreamExt;

use crate::common::{Fixture, body_of, header, wait_for_writes};

const SIZE: usize = 256 * 1024;

fn committed_entries(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .map(|listing| {
            listing
                .filter_map(Result::ok)
                .filter(|entry| !entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX))
                .count()
        })
        .unwrap_or(0)
}

#[tokio::test]
async fn test_tiers_are_cached_separately() {
    let fixture = Fixture::new();
    fixture.store.insert("clips/demo.mov", patterned_bytes(SIZE));
    let runs = fixture.dir.path().join("runs.log");
    let encoder = fixture.encoder(&format!(
        "echo run >> '{}'; cat > /dev/null; printf 'RENDITION'",
        runs.display()
    ));
    let cache = fixture.cache().await;
    let orchestrator = fixture.orchestrator(&cache, encoder);

    for (quality, writes) in [(Quality::Low, 1), (Quality::Medium, 2)] {
        let response = orchestrator
            .deliver(DeliveryRequest::new("clips/demo.mov").with_quality(quality))
            .await
            .unwrap();
        assert_eq!(header(&response, CONTENT_TYPE).as_deref(), Some("video/mp4"));
        assert_eq!(&body_of(response).await[..], b"RENDITION");
        wait_for_writes(&cache, writes).await;
    }

    let cached = orchestrator
        .deliver(
            DeliveryRequest::new("clips/demo.mov")
                .with_quality(Quality::Low)
                .with_range("bytes=3-8"),
        )
        .await
        .unwrap();
    assert_eq!(cached.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&cached, CONTENT_RANGE).as_deref(), Some("bytes 3-8/9"));
    assert_eq!(&body_of(cached).await[..], b"DITION");

    let runs = std::fs::read_to_string(&runs).unwrap();
    assert_eq!(runs.lines().count(), 2);
    assert_eq!(committed_entries(&cache.dir_for(CacheKind::Video)), 2);
}

#[tokio::test]
async fn test_encoder_failing_mid_stream_truncates_body_and_skips_cache() {
    let fixture = Fixture::new();
    fixture.store.insert("clips/demo.mkv", patterned_bytes(SIZE));
    let encoder = fixture.encoder("cat > /dev/null; printf 'PARTIAL'; exit 3");
    let cache = fixture.cache().await;
    let orchestrator = fixture.orchestrator(&cache, encoder);

    let response = orchestrator
        .deliver(DeliveryRequest::new("clips/demo.mkv").with_quality(Quality::Low))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(to_bytes(response.into_body(), usize::MAX).await.is_err());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(cache.stats().writes, 0);
    assert_eq!(committed_entries(&cache.dir_for(CacheKind::Video)), 0);
}

#[tokio::test]
async fn test_client_disconnect_abandons_cache_write() {
    let fixture = Fixture::new();
    fixture.store.insert("clips/demo.avi", patterned_bytes(SIZE));
    let encoder = fixture.encoder("cat > /dev/null; head -c 4000000 /dev/zero");
    let cache = fixture.cache().await;
    let orchestrator = fixture.orchestrator(&cache, encoder);

    let response = orchestrator
        .deliver(DeliveryRequest::new("clips/demo.avi").with_quality(Quality::Medium))
        .await
        .unwrap();
    let mut body = response.into_body().into_data_stream();
    assert!(body.next().await.unwrap().is_ok());
    drop(body);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(cache.stats().writes, 0);
    assert_eq!(committed_entries(&cache.dir_for(CacheKind::Video)), 0);
}
