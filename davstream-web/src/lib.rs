//! Davstream Web - HTTP surface for media delivery

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![warn(clippy::too_many_lines)]
//!
//! Exposes `GET /media/{*path}` for range-aware, optionally transformed
//! delivery of files on the WebDAV store, and `GET /health` for encoder and
//! cache status.

pub mod handlers;
pub mod server;

// Re-export main types
pub use server::{AppState, build_router, run_server};
