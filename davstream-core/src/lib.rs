//! Davstream Core - range-aware media delivery over WebDAV storage
//!
//! This crate turns a request for a byte range of a remote file into an HTTP
//! response, optionally passing the bytes through image resizing, video
//! transcoding, or text truncation on the way. It owns the resilient remote
//! reader, the on-disk transform cache, the transforms themselves, and the
//! orchestrator that ties them to HTTP range semantics.

pub mod cache;
pub mod config;
pub mod delivery;
pub mod remote;
pub mod streaming;
pub mod task;
pub mod tracing_setup;
pub mod transform;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export main types for convenient access
pub use cache::{CacheError, CacheStore};
pub use config::DavstreamConfig;
pub use delivery::{DeliveryError, DeliveryOrchestrator, DeliveryRequest};
pub use remote::{RemoteError, RemoteStore, WebDavStore};
pub use streaming::{RemoteStreamSource, SourceError};
pub use transform::{EncoderAvailability, TransformError};

/// Core errors that can bubble up from any davstream subsystem.
#[derive(Debug, thiserror::Error)]
pub enum DavstreamError {
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DavstreamError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            DavstreamError::Remote(e) => match e {
                RemoteError::NotFound { path } => format!("File not found: {path}"),
                RemoteError::Auth { .. } => "The storage server rejected our credentials".to_string(),
                RemoteError::InvalidPath { path } => format!("Invalid path: {path}"),
                _ => "Storage server is unavailable".to_string(),
            },
            DavstreamError::Cache(_) => "Cache directory is not usable".to_string(),
            DavstreamError::Delivery(e) => e.user_message(),
            DavstreamError::Configuration { reason } => format!("Configuration error: {reason}"),
            DavstreamError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            DavstreamError::Configuration { .. }
                | DavstreamError::Remote(RemoteError::InvalidPath { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, DavstreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_hide_internal_detail() {
        let error = DavstreamError::Remote(RemoteError::Transport {
            reason: "connection reset by peer at 10.0.0.4:443".to_string(),
        });
        assert_eq!(error.user_message(), "Storage server is unavailable");

        let error = DavstreamError::Remote(RemoteError::NotFound {
            path: "movies/a.mp4".to_string(),
        });
        assert_eq!(error.user_message(), "File not found: movies/a.mp4");
    }

    #[test]
    fn test_user_error_classification() {
        let config_error = DavstreamError::Configuration {
            reason: "missing base url".to_string(),
        };
        assert!(config_error.is_user_error());

        let io_error = DavstreamError::Io(std::io::Error::other("disk full"));
        assert!(!io_error.is_user_error());
    }
}
