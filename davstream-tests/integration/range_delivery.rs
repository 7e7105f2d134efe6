//! Range requests against the raw delivery path.

use axum::http::StatusCode;
use axum::http::header::{CONTENT_LENGTH, CONTENT_RANGE};
use davstream_core::DeliveryRequest;
use davstream_core::streaming::parse_range_header;
use davstream_core::testing::patterned_bytes;
use davstream_core::transform::Quality;
use futures::future::join_all;
use proptest::prelude::*;

use crate::common::{Fixture, body_of, header, no_encoder};

const MB: usize = 1024 * 1024;

fn parse_content_range(value: &str) -> (u64, u64, u64) {
    let rest = value.strip_prefix("bytes ").unwrap();
    let (span, total) = rest.split_once('/').unwrap();
    let (start, end) = span.split_once('-').unwrap();
    (
        start.parse().unwrap(),
        end.parse().unwrap(),
        total.parse().unwrap(),
    )
}

#[tokio::test]
async fn test_open_ended_requests_walk_whole_file() {
    let fixture = Fixture::new();
    let data = patterned_bytes(5 * MB);
    fixture.store.insert("archive/backup.zip", data.clone());
    let cache = fixture.cache().await;
    let orchestrator = fixture.orchestrator(&cache, no_encoder());

    let mut assembled = Vec::with_capacity(data.len());
    let mut requests = 0;
    loop {
        let request = DeliveryRequest::new("archive/backup.zip")
            .with_range(format!("bytes={}-", assembled.len()));
        let response = orchestrator.deliver(request).await.unwrap();
        requests += 1;

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        let (start, end, total) = parse_content_range(&header(&response, CONTENT_RANGE).unwrap());
        assert_eq!(start, assembled.len() as u64);
        assert_eq!(total, data.len() as u64);
        assert!(end - start < 2 * MB as u64);

        assembled.extend_from_slice(&body_of(response).await);
        if end + 1 == total {
            break;
        }
    }

    assert_eq!(requests, 3);
    assert_eq!(assembled, data);
}

#[tokio::test]
async fn test_concurrent_ranges_share_one_orchestrator() {
    let fixture = Fixture::new();
    let data = patterned_bytes(4 * MB);
    fixture.store.insert("movies/trailer.mp4", data.clone());
    let cache = fixture.cache().await;
    let orchestrator = fixture.orchestrator(&cache, no_encoder());

    let ranges: Vec<(usize, usize)> = (0..8).map(|i| (i * 500_000, i * 500_000 + 65_535)).collect();
    let responses = join_all(ranges.iter().map(|(start, end)| {
        orchestrator.deliver(
            DeliveryRequest::new("movies/trailer.mp4")
                .with_range(format!("bytes={start}-{end}"))
                .with_quality(Quality::Original),
        )
    }))
    .await;

    for ((start, end), response) in ranges.into_iter().zip(responses) {
        let response = response.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(header(&response, CONTENT_LENGTH).as_deref(), Some("65536"));
        assert_eq!(&body_of(response).await[..], &data[start..=end]);
    }
    assert_eq!(fixture.store.read_count(), 8);
}

#[tokio::test]
async fn test_suffix_and_multi_ranges_are_ignored() {
    let fixture = Fixture::new();
    fixture.store.insert("docs/manual.pdf", patterned_bytes(10_000));
    let cache = fixture.cache().await;
    let orchestrator = fixture.orchestrator(&cache, no_encoder());

    for range in ["bytes=-500", "bytes=0-10,20-30", "items=0-10"] {
        let response = orchestrator
            .deliver(DeliveryRequest::new("docs/manual.pdf").with_range(range))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "range {range}");
        assert_eq!(header(&response, CONTENT_LENGTH).as_deref(), Some("10000"));
    }
}

#[tokio::test]
async fn test_invalid_path_is_rejected() {
    let fixture = Fixture::new();
    let cache = fixture.cache().await;
    let orchestrator = fixture.orchestrator(&cache, no_encoder());

    let error = orchestrator
        .deliver(DeliveryRequest::new("../etc/passwd"))
        .await
        .unwrap_err();

    assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(fixture.store.read_count(), 0);
}

proptest! {
    #[test]
    fn resolved_ranges_stay_inside_the_file(
        total in 1u64..100_000,
        start in 0u64..120_000,
        span in proptest::option::of(0u64..120_000),
        window in 1u64..50_000,
    ) {
        let value = match span {
            Some(span) => format!("bytes={start}-{}", start + span),
            None => format!("bytes={start}-"),
        };
        let spec = parse_range_header(&value).unwrap();
        let windowed = spec.with_window(window, total);

        if let Some(range) = windowed.resolve(total) {
            prop_assert!(range.start <= range.end);
            prop_assert!(range.end < total);
            prop_assert_eq!(range.length(), range.end - range.start + 1);
            if spec.end.is_none() {
                prop_assert!(range.length() <= window);
            }
        } else {
            prop_assert!(start >= total || span.is_some_and(|s| start + s >= total));
        }
    }
}
