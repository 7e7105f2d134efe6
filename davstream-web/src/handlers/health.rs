//! Health and status endpoint

use axum::extract::State;
use axum::response::Json;
use chrono::{DateTime, Utc};
use davstream_core::EncoderAvailability;
use serde::Serialize;

use crate::server::AppState;

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "ok" while the server answers
    pub status: &'static str,
    /// When the server started
    pub started_at: DateTime<Utc>,
    /// Seconds since the server started
    pub uptime_seconds: u64,
    /// Video encoder probe result
    pub encoder: EncoderStatus,
    /// Transform cache counters
    pub cache: CacheStatus,
}

/// Whether videos can be transcoded.
#[derive(Debug, Serialize)]
pub struct EncoderStatus {
    /// True when the encoder probe succeeded
    pub available: bool,
    /// First line of the encoder's version output
    pub version: Option<String>,
    /// Why the encoder is unavailable
    pub reason: Option<String>,
}

/// Cache counters since startup.
#[derive(Debug, Serialize)]
pub struct CacheStatus {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that fell through to the source
    pub misses: u64,
    /// Entries committed
    pub writes: u64,
    /// Entries abandoned because a write failed
    pub write_failures: u64,
    /// Hits over total lookups, zero before the first lookup
    pub hit_rate: f64,
}

impl From<&EncoderAvailability> for EncoderStatus {
    fn from(availability: &EncoderAvailability) -> Self {
        match availability {
            EncoderAvailability::Available { version, .. } => Self {
                available: true,
                version: Some(version.clone()),
                reason: None,
            },
            EncoderAvailability::Unavailable { reason } => Self {
                available: false,
                version: None,
                reason: Some(reason.clone()),
            },
        }
    }
}

/// `GET /health`: encoder availability and cache counters.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.orchestrator.cache().stats();

    Json(HealthResponse {
        status: "ok",
        started_at: state.started_at,
        uptime_seconds: state.started.elapsed().as_secs(),
        encoder: EncoderStatus::from(state.orchestrator.encoder()),
        cache: CacheStatus {
            hits: stats.hits,
            misses: stats.misses,
            writes: stats.writes,
            write_failures: stats.write_failures,
            hit_rate: stats.hit_rate(),
        },
    })
}
