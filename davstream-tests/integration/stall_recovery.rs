//! Resilient reads under stalled and reset remote streams.
//!
//! The clock is paused so the stall watchdog fires without real waiting.

use std::time::Duration;

use axum::body::to_bytes;
use axum::http::StatusCode;
use davstream_core::DeliveryRequest;
use davstream_core::testing::{StoreFault, patterned_bytes};
use tokio::time::Instant;

use crate::common::{Fixture, body_of, no_encoder};

const PATH: &str = "images/disk.iso";
const SIZE: usize = 1024 * 1024;

#[tokio::test(start_paused = true)]
async fn test_stalled_stream_resumes_from_first_missing_byte() {
    let fixture = Fixture::new();
    let data = patterned_bytes(SIZE);
    fixture.store.insert(PATH, data.clone());
    fixture.store.inject(StoreFault::StallAfter(300_000));
    let cache = fixture.cache().await;
    let orchestrator = fixture.orchestrator(&cache, no_encoder());

    let started = Instant::now();
    let response = orchestrator.deliver(DeliveryRequest::new(PATH)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_of(response).await;

    assert_eq!(&body[..], &data[..]);
    assert!(started.elapsed() >= fixture.config.source.stall_timeout);
    let last = SIZE as u64 - 1;
    assert_eq!(
        fixture.store.reads(),
        vec![
            (PATH.to_string(), 0..=last),
            (PATH.to_string(), 300_000..=last)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_connection_reset_resumes_without_waiting_for_watchdog() {
    let fixture = Fixture::new();
    let data = patterned_bytes(SIZE);
    fixture.store.insert(PATH, data.clone());
    fixture.store.inject(StoreFault::ResetAfter(100_000));
    let cache = fixture.cache().await;
    let orchestrator = fixture.orchestrator(&cache, no_encoder());

    let started = Instant::now();
    let response = orchestrator
        .deliver(DeliveryRequest::new(PATH).with_range("bytes=50000-"))
        .await
        .unwrap();
    let body = body_of(response).await;

    assert_eq!(&body[..], &data[50_000..]);
    assert!(started.elapsed() < Duration::from_secs(1));
    let reads = fixture.store.reads();
    assert_eq!(reads.len(), 2);
    assert_eq!(*reads[1].1.start(), 150_000);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_stalls_end_the_body_with_an_error() {
    let fixture = Fixture::new();
    fixture.store.insert(PATH, patterned_bytes(SIZE));
    for _ in 0..3 {
        fixture.store.inject(StoreFault::StallAfter(100_000));
    }
    let cache = fixture.cache().await;
    let orchestrator = fixture.orchestrator(&cache, no_encoder());

    let response = orchestrator.deliver(DeliveryRequest::new(PATH)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(to_bytes(response.into_body(), usize::MAX).await.is_err());
    assert_eq!(fixture.store.read_count(), 3);
}
