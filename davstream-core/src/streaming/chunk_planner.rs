//! Chunk sizing for ranged delivery.
//!
//! The planner decides how many bytes a response frame carries and how far
//! an open-ended range (`bytes=N-`) is served before the client has to come
//! back for more. Small first windows keep video start-up latency low;
//! larger follow-up windows keep request overhead down during playback.

use super::media_info::{BandwidthClass, MediaCategory, is_hls};

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;

/// Chunk size for audio of any size.
pub const AUDIO_CHUNK: u64 = 256 * KB;
/// Upper bound for image chunks.
pub const IMAGE_CHUNK_CAP: u64 = MB;
/// Upper bound for text and other non-video files.
pub const OTHER_CHUNK_CAP: u64 = 2 * MB;
/// HLS segments and playlists are small already.
pub const HLS_CHUNK: u64 = 128 * KB;
/// First window of a video, sized for quick start-up.
pub const VIDEO_INITIAL_CHUNK: u64 = 2 * MB;
/// Open-ended video ranges after the first are served up to this many bytes.
pub const VIDEO_STREAMING_WINDOW: u64 = 10 * MB;

/// Video file size tiers used by the bandwidth table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeTier {
    Small,
    Medium,
    Large,
    XLarge,
}

impl SizeTier {
    pub fn of(file_size: u64) -> Self {
        if file_size < 50 * MB {
            SizeTier::Small
        } else if file_size < 250 * MB {
            SizeTier::Medium
        } else if file_size < 1024 * MB {
            SizeTier::Large
        } else {
            SizeTier::XLarge
        }
    }
}

/// Stateless chunk planner.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkPlanner;

impl ChunkPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Chunk size for one response frame.
    ///
    /// Pure: identical inputs always produce the same size.
    pub fn plan(
        &self,
        file_size: u64,
        category: MediaCategory,
        bandwidth: BandwidthClass,
        is_initial: bool,
        format: &str,
    ) -> u64 {
        match category {
            MediaCategory::Audio => AUDIO_CHUNK,
            MediaCategory::Image => file_size.clamp(1, IMAGE_CHUNK_CAP),
            MediaCategory::Text | MediaCategory::Other => file_size.clamp(1, OTHER_CHUNK_CAP),
            MediaCategory::Video if is_hls(format) => HLS_CHUNK,
            MediaCategory::Video if is_initial => VIDEO_INITIAL_CHUNK,
            MediaCategory::Video => video_table(bandwidth, SizeTier::of(file_size)),
        }
    }

    /// Bytes served for an open-ended range request.
    pub fn response_window(
        &self,
        file_size: u64,
        category: MediaCategory,
        bandwidth: BandwidthClass,
        is_initial: bool,
        format: &str,
    ) -> u64 {
        match category {
            MediaCategory::Video if is_hls(format) => file_size.max(1),
            MediaCategory::Video if is_initial => VIDEO_INITIAL_CHUNK,
            MediaCategory::Video => VIDEO_STREAMING_WINDOW,
            _ => self.plan(file_size, category, bandwidth, is_initial, format),
        }
    }
}

fn video_table(bandwidth: BandwidthClass, tier: SizeTier) -> u64 {
    match (bandwidth, tier) {
        (BandwidthClass::Low, SizeTier::Small) => 128 * KB,
        (BandwidthClass::Low, SizeTier::Medium) => 256 * KB,
        (BandwidthClass::Low, SizeTier::Large | SizeTier::XLarge) => 512 * KB,
        (BandwidthClass::Medium, SizeTier::Small) => 512 * KB,
        (BandwidthClass::Medium, SizeTier::Medium | SizeTier::Large) => MB,
        (BandwidthClass::Medium, SizeTier::XLarge) => 2 * MB,
        (BandwidthClass::High, SizeTier::Small) => MB,
        (BandwidthClass::High, SizeTier::Medium) => 2 * MB,
        (BandwidthClass::High, SizeTier::Large | SizeTier::XLarge) => 4 * MB,
    }
}
