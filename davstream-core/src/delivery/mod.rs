//! Request-level delivery: from a media request to an HTTP response.

pub mod orchestrator;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub use orchestrator::DeliveryOrchestrator;

use crate::remote::RemoteError;
use crate::streaming::{BandwidthClass, SourceError};
use crate::transform::Quality;

/// A media request after HTTP parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryRequest {
    /// Path relative to the store root
    pub path: String,
    /// Raw `Range` header value
    pub range: Option<String>,
    pub quality: Quality,
    /// Requested output format for images
    pub format: Option<String>,
    pub bandwidth: BandwidthClass,
    /// Serve as an attachment, never transformed
    pub download: bool,
}

impl DeliveryRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_bandwidth(mut self, bandwidth: BandwidthClass) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    pub fn as_download(mut self) -> Self {
        self.download = true;
        self
    }
}

/// Lifecycle of one delivery, logged at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    ResolvingMetadata,
    PlanningRange,
    CacheLookup,
    CacheHit,
    SourceFetch,
    Transforming,
    Responding,
    Done,
    Errored,
}

impl DeliveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryState::ResolvingMetadata => "resolving_metadata",
            DeliveryState::PlanningRange => "planning_range",
            DeliveryState::CacheLookup => "cache_lookup",
            DeliveryState::CacheHit => "cache_hit",
            DeliveryState::SourceFetch => "source_fetch",
            DeliveryState::Transforming => "transforming",
            DeliveryState::Responding => "responding",
            DeliveryState::Done => "done",
            DeliveryState::Errored => "errored",
        }
    }
}

/// Errors that end a delivery before a response body is produced.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("File not found: {path}")]
    NotFound { path: String },

    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    #[error("Storage rejected credentials")]
    Unauthorized,

    #[error("Storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    #[error("Source read failed: {0}")]
    Source(SourceError),
}

impl DeliveryError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DeliveryError::NotFound { .. } => StatusCode::NOT_FOUND,
            DeliveryError::InvalidPath { .. } => StatusCode::BAD_REQUEST,
            DeliveryError::Unauthorized | DeliveryError::StorageUnavailable { .. } => {
                StatusCode::BAD_GATEWAY
            }
            DeliveryError::Source(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short message safe to show to clients.
    pub fn user_message(&self) -> String {
        match self {
            DeliveryError::NotFound { path } => format!("File not found: {path}"),
            DeliveryError::InvalidPath { path } => format!("Invalid path: {path}"),
            DeliveryError::Unauthorized => "Storage backend refused access".to_string(),
            DeliveryError::StorageUnavailable { .. } => "Storage backend is unavailable".to_string(),
            DeliveryError::Source(_) => "Failed to read media from storage, please retry".to_string(),
        }
    }
}

impl From<SourceError> for DeliveryError {
    fn from(error: SourceError) -> Self {
        match error {
            SourceError::NotFound { path } => DeliveryError::NotFound { path },
            SourceError::InvalidPath { path } => DeliveryError::InvalidPath { path },
            SourceError::Unauthorized => DeliveryError::Unauthorized,
            other => DeliveryError::Source(other),
        }
    }
}

impl From<RemoteError> for DeliveryError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::NotFound { path } => DeliveryError::NotFound { path },
            RemoteError::InvalidPath { path } => DeliveryError::InvalidPath { path },
            RemoteError::Auth { .. } => DeliveryError::Unauthorized,
            RemoteError::Transport { reason } => DeliveryError::StorageUnavailable { reason },
        }
    }
}

impl IntoResponse for DeliveryError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.user_message(),
            "status": self.status_code().as_u16(),
        }));
        (self.status_code(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found = DeliveryError::from(RemoteError::NotFound {
            path: "a.mp4".to_string(),
        });
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let auth = DeliveryError::from(RemoteError::Auth { status: 401 });
        assert_eq!(auth.status_code(), StatusCode::BAD_GATEWAY);

        let stalled = DeliveryError::from(SourceError::StreamStalled {
            path: "a.mp4".to_string(),
            delivered: 10,
            attempts: 3,
        });
        assert_eq!(stalled.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(stalled.user_message().contains("please retry"));
    }

    #[test]
    fn test_user_messages_are_sanitized() {
        let error = DeliveryError::from(RemoteError::Transport {
            reason: "tcp connect error: 10.0.0.7:443".to_string(),
        });
        assert!(!error.user_message().contains("10.0.0.7"));

        let error = DeliveryError::from(SourceError::Unauthorized);
        assert!(!error.user_message().contains("credential"));
    }

    #[test]
    fn test_request_builder() {
        let request = DeliveryRequest::new("movies/a.mkv")
            .with_range("bytes=0-")
            .with_quality(Quality::Low)
            .with_bandwidth(BandwidthClass::Low)
            .as_download();

        assert_eq!(request.range.as_deref(), Some("bytes=0-"));
        assert_eq!(request.quality, Quality::Low);
        assert!(request.download);
        assert_eq!(request.format, None);
    }
}
