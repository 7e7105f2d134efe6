//! Image optimization through the delivery pipeline.

use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use davstream_core::DeliveryRequest;
use davstream_core::streaming::BandwidthClass;
use davstream_core::testing::{noisy_png, patterned_bytes};
use davstream_core::transform::Quality;

use crate::common::{Fixture, body_of, header, no_encoder, wait_for_writes};

#[tokio::test]
async fn test_requested_format_is_encoded_within_preset_bounds() {
    let fixture = Fixture::new();
    fixture.store.insert("gallery/beach.png", noisy_png(1200, 800));
    let cache = fixture.cache().await;
    let orchestrator = fixture.orchestrator(&cache, no_encoder());

    let response = orchestrator
        .deliver(
            DeliveryRequest::new("gallery/beach.png")
                .with_format("webp")
                .with_quality(Quality::Low),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, CONTENT_TYPE).as_deref(), Some("image/webp"));
    let decoded = image::load_from_memory(&body_of(response).await).unwrap();
    assert_eq!(decoded.width(), 640);
    assert!(decoded.height() < 640);
}

#[tokio::test]
async fn test_each_format_gets_its_own_cache_entry() {
    let fixture = Fixture::new();
    fixture.store.insert("gallery/city.png", noisy_png(1600, 400));
    let cache = fixture.cache().await;
    let orchestrator = fixture.orchestrator(&cache, no_encoder());
    let request = DeliveryRequest::new("gallery/city.png").with_bandwidth(BandwidthClass::Low);

    let jpeg = orchestrator
        .deliver(request.clone().with_format("jpeg"))
        .await
        .unwrap();
    assert_eq!(header(&jpeg, CONTENT_TYPE).as_deref(), Some("image/jpeg"));
    let jpeg_body = body_of(jpeg).await;
    wait_for_writes(&cache, 1).await;

    let png = orchestrator
        .deliver(request.clone().with_format("png"))
        .await
        .unwrap();
    assert_eq!(header(&png, CONTENT_TYPE).as_deref(), Some("image/png"));
    wait_for_writes(&cache, 2).await;

    let again = orchestrator.deliver(request.with_format("jpeg")).await.unwrap();
    assert_eq!(body_of(again).await, jpeg_body);

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
    assert_eq!(fixture.store.read_count(), 2);
}

#[tokio::test]
async fn test_original_quality_and_gif_are_passed_through() {
    let fixture = Fixture::new();
    let png = noisy_png(400, 400);
    fixture.store.insert("gallery/square.png", png.clone());
    fixture.store.insert("gallery/loop.gif", png.clone());
    let cache = fixture.cache().await;
    let orchestrator = fixture.orchestrator(&cache, no_encoder());

    let original = orchestrator
        .deliver(
            DeliveryRequest::new("gallery/square.png")
                .with_quality(Quality::Original)
                .with_format("webp"),
        )
        .await
        .unwrap();
    assert_eq!(header(&original, CONTENT_TYPE).as_deref(), Some("image/png"));
    assert_eq!(&body_of(original).await[..], &png[..]);

    let gif = orchestrator
        .deliver(DeliveryRequest::new("gallery/loop.gif"))
        .await
        .unwrap();
    assert_eq!(header(&gif, CONTENT_TYPE).as_deref(), Some("image/gif"));
    assert_eq!(&body_of(gif).await[..], &png[..]);

    assert_eq!(cache.stats().misses, 0);
}

#[tokio::test]
async fn test_undecodable_image_falls_back_to_original_bytes() {
    let fixture = Fixture::new();
    let garbage = patterned_bytes(120_000);
    fixture.store.insert("gallery/broken.jpg", garbage.clone());
    let cache = fixture.cache().await;
    let orchestrator = fixture.orchestrator(&cache, no_encoder());

    let response = orchestrator
        .deliver(DeliveryRequest::new("gallery/broken.jpg").with_format("webp"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, CONTENT_TYPE).as_deref(), Some("image/jpeg"));
    assert_eq!(&body_of(response).await[..], &garbage[..]);
    assert_eq!(cache.stats().writes, 0);
}
