//! Media transforms applied between the remote source and the response.
//!
//! Images are buffered and re-encoded on the blocking pool, videos are piped
//! through an external encoder process, and text previews are truncated.
//! Each transform is optional: the orchestrator falls back to the raw bytes
//! whenever one declines or fails for reasons other than the source itself.

pub mod image;
pub mod text;
pub mod video;

use std::str::FromStr;

pub use self::image::{ImagePreset, ImageTransform, OptimizedImage, OutputFormat};
pub use self::text::{PreparedText, TextTransform};
pub use self::video::{
    EncoderAvailability, TierSettings, TranscodeOutput, VideoTier, VideoTransform, should_compress,
};
use crate::streaming::SourceError;

/// Requested output quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Quality {
    Low,
    Medium,
    High,
    /// Serve the stored bytes untouched
    Original,
    /// Follow the client's bandwidth class
    #[default]
    Auto,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
            Quality::Original => "original",
            Quality::Auto => "auto",
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            "original" => Ok(Quality::Original),
            "auto" => Ok(Quality::Auto),
            _ => Err(format!("Invalid quality: {s}. Use low, medium, high, original, or auto")),
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while transforming media.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("Image processing failed: {reason}")]
    Image { reason: String },

    #[error("Transcoder unavailable: {reason}")]
    TranscoderUnavailable { reason: String },

    #[error("Transcoder exited with code {exit_code:?}: {stderr}")]
    TranscodeProcess {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Transcoding needs the whole file, got bytes {start}-{end} of {total}")]
    PartialInput { start: u64, end: u64, total: u64 },

    #[error("Source read failed: {0}")]
    Source(#[from] SourceError),

    #[error("I/O error during transform: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transform task failed: {reason}")]
    Task { reason: String },
}

impl TransformError {
    /// True when the failure came from reading the remote file rather than
    /// from the transform. These propagate instead of falling back.
    pub fn is_source_failure(&self) -> bool {
        matches!(self, TransformError::Source(_))
    }
}

impl From<tokio::task::JoinError> for TransformError {
    fn from(e: tokio::task::JoinError) -> Self {
        TransformError::Task {
            reason: e.to_string(),
        }
    }
}

pub type TransformResult<T> = Result<T, TransformError>;
