//! HTTP request handlers organized by functionality

pub mod health;
pub mod media;

// Re-export handler functions
pub use health::{CacheStatus, EncoderStatus, HealthResponse, health};
pub use media::{MediaQuery, build_request, stream_media};
