//! HTTP server wiring for davstream
//!
//! Builds the shared state from configuration, mounts the media and health
//! routes and serves them until ctrl-c.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::get;
use chrono::{DateTime, Utc};
use davstream_core::cache::spawn_janitor;
use davstream_core::{
    CacheStore, DavstreamConfig, DavstreamError, DeliveryOrchestrator, EncoderAvailability,
    RemoteStore, WebDavStore,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers::{health, stream_media};

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Request pipeline over the remote store and cache
    pub orchestrator: Arc<DeliveryOrchestrator>,
    /// Monotonic start time for uptime
    pub started: Instant,
    /// Wall clock start time reported by `/health`
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wraps an orchestrator, stamping the start time.
    pub fn new(orchestrator: DeliveryOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

/// Routes: `GET /media/{*path}` and `GET /health`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/media/{*path}", get(stream_media))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Starts the server and blocks until shutdown.
///
/// # Errors
///
/// - `DavstreamError::Remote` - WebDAV client could not be configured
/// - `DavstreamError::Cache` - Cache directories could not be created
/// - `DavstreamError::Io` - Listener could not bind or the server failed
pub async fn run_server(config: DavstreamConfig) -> Result<(), DavstreamError> {
    let store: Arc<dyn RemoteStore> = Arc::new(WebDavStore::new(&config.remote)?);
    let cache = Arc::new(CacheStore::open(config.cache.clone()).await?);
    let _janitor = spawn_janitor(&cache);

    let availability = EncoderAvailability::probe(&config.transform.encoder_path).await;
    let orchestrator = DeliveryOrchestrator::new(store, cache, availability, &config);
    let app = build_router(AppState::new(orchestrator));

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        address = %address,
        webdav = %config.remote.base_url,
        cache = %config.cache.root.display(),
        "davstream listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("davstream stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
    use axum::http::{Request, StatusCode};
    use davstream_core::testing::{MemoryStore, patterned_bytes};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;

    async fn test_router(store: Arc<MemoryStore>) -> (Router, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = DavstreamConfig::for_testing(dir.path().join("cache"));
        let cache = Arc::new(CacheStore::open(config.cache.clone()).await.unwrap());
        let availability = EncoderAvailability::Unavailable {
            reason: "disabled in tests".to_string(),
        };
        let orchestrator = DeliveryOrchestrator::new(store, cache, availability, &config);
        (build_router(AppState::new(orchestrator)), dir)
    }

    #[tokio::test]
    async fn test_media_range_request() {
        let store = Arc::new(MemoryStore::new());
        store.insert("blobs/data.bin", patterned_bytes(4096));
        let (app, _dir) = test_router(store).await;

        let response = app
            .oneshot(
                Request::get("/media/blobs/data.bin")
                    .header(RANGE, "bytes=100-199")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[CONTENT_RANGE], "bytes 100-199/4096");
        assert_eq!(response.headers()[CONTENT_LENGTH], "100");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), &patterned_bytes(4096)[100..200]);
    }

    #[tokio::test]
    async fn test_missing_media_is_json_404() {
        let (app, _dir) = test_router(Arc::new(MemoryStore::new())).await;

        let response = app
            .oneshot(
                Request::get("/media/nope.mp4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], 404);
    }

    #[tokio::test]
    async fn test_health_reports_encoder_and_cache() {
        let (app, _dir) = test_router(Arc::new(MemoryStore::new())).await;

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["encoder"]["available"], false);
        assert_eq!(json["cache"]["hits"], 0);
    }
}
