//! Text previews: charset, truncation and range fallback.

use axum::http::StatusCode;
use axum::http::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use davstream_core::DeliveryRequest;

use crate::common::{Fixture, body_of, header, no_encoder, wait_for_writes};

#[tokio::test]
async fn test_small_text_is_served_whole_and_cached() {
    let fixture = Fixture::new();
    let text = "# Notes\n\nShort enough to be served in full.\n";
    fixture.store.insert("notes/README.md", text);
    let cache = fixture.cache().await;
    let orchestrator = fixture.orchestrator(&cache, no_encoder());

    let response = orchestrator
        .deliver(DeliveryRequest::new("notes/README.md"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header(&response, CONTENT_TYPE).as_deref(),
        Some("text/plain; charset=utf-8")
    );
    assert_eq!(header(&response, CONTENT_LENGTH), None);
    assert_eq!(&body_of(response).await[..], text.as_bytes());

    wait_for_writes(&cache, 1).await;
    let cached = orchestrator
        .deliver(DeliveryRequest::new("notes/README.md"))
        .await
        .unwrap();
    assert_eq!(
        header(&cached, CONTENT_LENGTH).as_deref(),
        Some(text.len().to_string().as_str())
    );
    assert_eq!(&body_of(cached).await[..], text.as_bytes());
    assert_eq!(fixture.store.read_count(), 1);
}

#[tokio::test]
async fn test_json_detected_from_store_mime_hint() {
    let mut fixture = Fixture::new();
    fixture.config.transform.text_encoding = "iso-8859-1".to_string();
    fixture.config.transform.text_max_size = 16;
    fixture
        .store
        .insert_with_mime("exports/latest", r#"{"items":[1,2,3,4,5,6,7,8]}"#, "application/json");
    let cache = fixture.cache().await;
    let orchestrator = fixture.orchestrator(&cache, no_encoder());

    let response = orchestrator
        .deliver(DeliveryRequest::new("exports/latest"))
        .await
        .unwrap();

    assert_eq!(
        header(&response, CONTENT_TYPE).as_deref(),
        Some("text/plain; charset=iso-8859-1")
    );
    let body = String::from_utf8(body_of(response).await.to_vec()).unwrap();
    assert!(body.starts_with(r#"{"items":[1,2,3,"#));
    assert!(body.contains("first 16 of 27 bytes"));
}

#[tokio::test]
async fn test_partial_text_range_is_served_raw() {
    let fixture = Fixture::new();
    let log = "line\n".repeat(2000);
    fixture.store.insert("logs/app.log", log.clone());
    let cache = fixture.cache().await;
    let orchestrator = fixture.orchestrator(&cache, no_encoder());

    let response = orchestrator
        .deliver(DeliveryRequest::new("logs/app.log").with_range("bytes=5000-5009"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header(&response, CONTENT_RANGE).as_deref(),
        Some("bytes 5000-5009/10000")
    );
    assert_eq!(&body_of(response).await[..], &log.as_bytes()[5000..5010]);
    assert_eq!(cache.stats().misses, 0);
}
