//! Integration tests for davstream
//!
//! These tests drive the delivery pipeline end to end against the in-memory
//! store: range planning, resilient reads, transforms and the cache working
//! together behind a single `DeliveryOrchestrator`.

#[path = "integration/common.rs"]
mod common;

#[path = "integration/range_delivery.rs"]
mod range_delivery;

#[path = "integration/stall_recovery.rs"]
mod stall_recovery;

#[path = "integration/image_delivery.rs"]
mod image_delivery;

#[path = "integration/video_transcode.rs"]
mod video_transcode;

#[path = "integration/text_preview.rs"]
mod text_preview;

#[path = "integration/cache_janitor.rs"]
mod cache_janitor;
