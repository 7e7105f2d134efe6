//! Media classification from file names and content types.
//!
//! Delivery decisions (chunk sizes, transforms, cache lifetimes) depend on
//! a coarse media category and the client's bandwidth class. Both are
//! derived here without looking at file contents.

use std::fmt;
use std::str::FromStr;

/// Coarse media category of a remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaCategory {
    Image,
    Video,
    Audio,
    Text,
    Other,
}

/// Client link quality hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BandwidthClass {
    Low,
    #[default]
    Medium,
    High,
}

impl BandwidthClass {
    /// Classifies a `Downlink` client hint given in megabits per second.
    pub fn from_downlink_mbps(mbps: f64) -> Self {
        if mbps < 1.5 {
            BandwidthClass::Low
        } else if mbps < 10.0 {
            BandwidthClass::Medium
        } else {
            BandwidthClass::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BandwidthClass::Low => "low",
            BandwidthClass::Medium => "medium",
            BandwidthClass::High => "high",
        }
    }
}

impl FromStr for BandwidthClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(BandwidthClass::Low),
            "medium" => Ok(BandwidthClass::Medium),
            "high" => Ok(BandwidthClass::High),
            _ => Err(format!("Invalid bandwidth class: {s}")),
        }
    }
}

impl fmt::Display for BandwidthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// `.ts` is absent: HLS segments claim it first
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "log", "csv", "tsv", "json", "xml", "yaml", "yml", "toml", "ini",
    "conf", "cfg", "rs", "py", "js", "go", "c", "h", "cpp", "java", "sh", "sql", "srt",
    "vtt",
];

/// Lowercase extension of a path without the dot, empty when absent.
pub fn extension_of(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// Content type for a path, guessed from its extension.
pub fn mime_for_path(path: &str) -> String {
    match extension_of(path).as_str() {
        "m3u8" => "application/vnd.apple.mpegurl".to_string(),
        "ts" => "video/mp2t".to_string(),
        "mkv" => "video/x-matroska".to_string(),
        _ => mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string(),
    }
}

/// HLS playlists and segments are already chunked for streaming.
pub fn is_hls(format: &str) -> bool {
    matches!(format, "m3u8" | "ts")
}

/// Classifies a file by its extension first and the store's content type second.
///
/// Extensions win because WebDAV servers frequently report
/// `application/octet-stream` for media they do not recognize.
pub fn categorize(path: &str, mime_hint: &str) -> MediaCategory {
    let format = extension_of(path);
    if is_hls(&format) {
        return MediaCategory::Video;
    }
    if TEXT_EXTENSIONS.contains(&format.as_str()) {
        return MediaCategory::Text;
    }

    let guessed = mime_guess::from_path(path).first();
    let from_extension = guessed.as_ref().map(|m| m.type_().as_str().to_string());
    let mime = mime_hint.to_ascii_lowercase();

    let top_level = match from_extension.as_deref() {
        Some(top) if top != "application" => top.to_string(),
        _ => mime.split('/').next().unwrap_or_default().to_string(),
    };

    match top_level.as_str() {
        "image" => MediaCategory::Image,
        "video" => MediaCategory::Video,
        "audio" => MediaCategory::Audio,
        "text" => MediaCategory::Text,
        _ if mime.contains("json") || mime.contains("xml") || mime.contains("javascript") => {
            MediaCategory::Text
        }
        _ => MediaCategory::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("movies/Clip.MP4"), "mp4");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of("dir.d/README"), "");
        assert_eq!(extension_of(".hidden"), "");
    }

    #[test]
    fn test_categorize_by_extension() {
        assert_eq!(categorize("a/photo.jpg", ""), MediaCategory::Image);
        assert_eq!(categorize("a/clip.mkv", ""), MediaCategory::Video);
        assert_eq!(categorize("a/song.mp3", ""), MediaCategory::Audio);
        assert_eq!(categorize("a/notes.md", ""), MediaCategory::Text);
        assert_eq!(categorize("live/index.m3u8", ""), MediaCategory::Video);
        assert_eq!(categorize("live/seg001.ts", ""), MediaCategory::Video);
        assert_eq!(
            categorize("src/app.ts", "application/typescript"),
            MediaCategory::Video
        );
        assert_eq!(categorize("a/blob.bin", ""), MediaCategory::Other);
    }

    #[test]
    fn test_categorize_falls_back_to_mime_hint() {
        assert_eq!(categorize("a/upload", "video/mp4"), MediaCategory::Video);
        assert_eq!(categorize("a/upload", "application/json"), MediaCategory::Text);
        assert_eq!(
            categorize("a/upload", "application/octet-stream"),
            MediaCategory::Other
        );
    }

    #[test]
    fn test_bandwidth_from_downlink() {
        assert_eq!(BandwidthClass::from_downlink_mbps(0.4), BandwidthClass::Low);
        assert_eq!(BandwidthClass::from_downlink_mbps(1.5), BandwidthClass::Medium);
        assert_eq!(BandwidthClass::from_downlink_mbps(9.9), BandwidthClass::Medium);
        assert_eq!(BandwidthClass::from_downlink_mbps(50.0), BandwidthClass::High);
    }

    #[test]
    fn test_bandwidth_parsing() {
        assert_eq!("LOW".parse::<BandwidthClass>().unwrap(), BandwidthClass::Low);
        assert!("fast".parse::<BandwidthClass>().is_err());
        assert_eq!(BandwidthClass::default(), BandwidthClass::Medium);
    }
}
