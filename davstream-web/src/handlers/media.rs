//! Media delivery handler.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::RANGE;
use axum::response::{IntoResponse, Response};
use davstream_core::DeliveryRequest;
use davstream_core::streaming::BandwidthClass;
use davstream_core::transform::Quality;
use serde::Deserialize;
use tracing::debug;

use crate::server::AppState;

/// Client hint carrying the effective downlink in Mbps.
const DOWNLINK_HINT: &str = "downlink";

/// Query parameters for media requests.
///
/// Unknown or malformed values fall back to defaults instead of failing
/// the request.
#[derive(Debug, Default, Deserialize)]
pub struct MediaQuery {
    /// Output quality: low, medium, high, original or auto
    pub quality: Option<String>,
    /// Output format for images (jpeg, png, webp, avif)
    pub format: Option<String>,
    /// Serve as an attachment when set to a truthy value
    pub download: Option<String>,
    /// Bandwidth class override: low, medium or high
    pub bandwidth: Option<String>,
}

/// `GET /media/{*path}`: streams a stored file, honouring `Range`.
pub async fn stream_media(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<MediaQuery>,
    headers: HeaderMap,
) -> Response {
    let request = build_request(path, &query, &headers);
    match state.orchestrator.deliver(request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

/// Translates an HTTP request into a delivery request.
pub fn build_request(path: String, query: &MediaQuery, headers: &HeaderMap) -> DeliveryRequest {
    let quality = query
        .quality
        .as_deref()
        .and_then(|q| match q.parse::<Quality>() {
            Ok(quality) => Some(quality),
            Err(e) => {
                debug!(error = %e, "Ignoring quality parameter");
                None
            }
        })
        .unwrap_or_default();

    DeliveryRequest {
        path,
        range: headers
            .get(RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        quality,
        format: query
            .format
            .as_deref()
            .filter(|f| !f.is_empty())
            .map(str::to_ascii_lowercase),
        bandwidth: bandwidth_for(query, headers),
        download: query.download.as_deref().is_some_and(is_truthy),
    }
}

/// Explicit query parameter first, then the `Downlink` client hint.
fn bandwidth_for(query: &MediaQuery, headers: &HeaderMap) -> BandwidthClass {
    if let Some(class) = query
        .bandwidth
        .as_deref()
        .and_then(|b| b.parse::<BandwidthClass>().ok())
    {
        return class;
    }

    headers
        .get(DOWNLINK_HINT)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|mbps| mbps.is_finite() && *mbps >= 0.0)
        .map(BandwidthClass::from_downlink_mbps)
        .unwrap_or_default()
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "" | "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn query(quality: Option<&str>, bandwidth: Option<&str>) -> MediaQuery {
        MediaQuery {
            quality: quality.map(str::to_string),
            bandwidth: bandwidth.map(str::to_string),
            ..MediaQuery::default()
        }
    }

    #[test]
    fn test_request_from_query_and_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(RANGE, HeaderValue::from_static("bytes=0-1023"));
        let query = MediaQuery {
            quality: Some("LOW".to_string()),
            format: Some("WebP".to_string()),
            download: Some("1".to_string()),
            bandwidth: Some("high".to_string()),
        };

        let request = build_request("photos/a.png".to_string(), &query, &headers);

        assert_eq!(request.path, "photos/a.png");
        assert_eq!(request.range.as_deref(), Some("bytes=0-1023"));
        assert_eq!(request.quality, Quality::Low);
        assert_eq!(request.format.as_deref(), Some("webp"));
        assert_eq!(request.bandwidth, BandwidthClass::High);
        assert!(request.download);
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let request = build_request(
            "a.mp4".to_string(),
            &query(Some("ultra"), Some("fast")),
            &HeaderMap::new(),
        );

        assert_eq!(request.quality, Quality::Auto);
        assert_eq!(request.bandwidth, BandwidthClass::Medium);
        assert!(!request.download);
        assert_eq!(request.range, None);
    }

    #[test]
    fn test_downlink_hint_sets_bandwidth() {
        let mut headers = HeaderMap::new();
        headers.insert(DOWNLINK_HINT, HeaderValue::from_static("0.8"));
        let request = build_request("a.mp4".to_string(), &query(None, None), &headers);
        assert_eq!(request.bandwidth, BandwidthClass::Low);

        headers.insert(DOWNLINK_HINT, HeaderValue::from_static("25"));
        let request = build_request("a.mp4".to_string(), &query(None, None), &headers);
        assert_eq!(request.bandwidth, BandwidthClass::High);

        let request = build_request("a.mp4".to_string(), &query(None, Some("low")), &headers);
        assert_eq!(request.bandwidth, BandwidthClass::Low);
    }

    #[test]
    fn test_download_flag_values() {
        assert!(is_truthy("true"));
        assert!(is_truthy(""));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("false"));
    }
}
