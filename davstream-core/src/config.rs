//! Centralized configuration for davstream.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all davstream components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct DavstreamConfig {
    pub remote: RemoteConfig,
    pub source: SourceConfig,
    pub cache: CacheConfig,
    pub transform: TransformConfig,
    pub server: ServerConfig,
}

/// Connection settings for the WebDAV object store.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the WebDAV collection every path is resolved against
    pub base_url: String,
    /// Basic auth user name
    pub username: Option<String>,
    /// Basic auth password
    pub password: Option<String>,
    /// Timeout for establishing a connection to the store
    pub connect_timeout: Duration,
    /// Timeout for metadata requests (HEAD, PROPFIND, PUT, DELETE)
    pub request_timeout: Duration,
    /// User agent for HTTP requests
    pub user_agent: &'static str,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/".to_string(),
            username: None,
            password: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            user_agent: "davstream/0.1.0",
        }
    }
}

/// Resilience settings for remote byte-range reads.
///
/// Controls open retries, backoff, and stall detection on open streams.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Total open attempts per read session, stall re-opens included
    pub max_open_attempts: u32,
    /// Base delay for the 1.5x exponential backoff between attempts
    pub base_retry_delay: Duration,
    /// Upper bound of the random jitter added to each backoff delay
    pub max_jitter: Duration,
    /// How often the stall watchdog checks for activity
    pub watchdog_interval: Duration,
    /// Inactivity after which an open stream is considered stalled
    pub stall_timeout: Duration,
    /// Bytes between instrumentation callbacks on large ranges
    pub progress_interval: u64,
    /// Chunks buffered between the reader task and the consumer
    pub channel_capacity: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            max_open_attempts: 3,
            base_retry_delay: Duration::from_millis(500),
            max_jitter: Duration::from_millis(200),
            watchdog_interval: Duration::from_secs(5),
            stall_timeout: Duration::from_secs(15),
            progress_interval: 10 * 1024 * 1024, // 10 MiB
            channel_capacity: 8,
        }
    }
}

/// On-disk transform cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory holding one sub-directory per transform kind
    pub root: PathBuf,
    /// Entries older than this are removed by the janitor
    pub max_age: Duration,
    /// Disk budget across all kinds; oldest entries are removed beyond it
    pub max_total_size: u64,
    /// Run the janitor periodically
    pub enable_cleanup: bool,
    /// Janitor interval
    pub cleanup_interval: Duration,
    /// Chunks the cache side of a tee may lag behind the client before it gives up
    pub tee_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("davstream-cache"),
            max_age: Duration::from_secs(7 * 24 * 3600), // 7 days
            max_total_size: 2 * 1024 * 1024 * 1024,      // 2 GiB
            enable_cleanup: true,
            cleanup_interval: Duration::from_secs(3600), // 1 hour
            tee_capacity: 64,
        }
    }
}

/// Media transform configuration.
#[derive(Debug, Clone)]
pub struct TransformConfig {
    /// Encoder binary, resolved through PATH when not absolute
    pub encoder_path: PathBuf,
    /// Text payloads are truncated beyond this many bytes
    pub text_max_size: u64,
    /// Charset reported for text previews
    pub text_encoding: String,
    /// Images below this size are passed through untouched
    pub image_skip_threshold: u64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            encoder_path: PathBuf::from("ffmpeg"),
            text_max_size: 1024 * 1024, // 1 MiB
            text_encoding: "utf-8".to_string(),
            image_skip_threshold: 50 * 1024, // 50 KiB
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl DavstreamConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("DAVSTREAM_WEBDAV_URL") {
            config.remote.base_url = url;
        }
        if let Ok(user) = std::env::var("DAVSTREAM_WEBDAV_USER") {
            config.remote.username = Some(user);
        }
        if let Ok(password) = std::env::var("DAVSTREAM_WEBDAV_PASSWORD") {
            config.remote.password = Some(password);
        }

        if let Ok(dir) = std::env::var("DAVSTREAM_CACHE_DIR") {
            config.cache.root = PathBuf::from(dir);
        }
        if let Ok(max) = std::env::var("DAVSTREAM_CACHE_MAX_BYTES")
            && let Ok(bytes) = max.parse::<u64>()
        {
            config.cache.max_total_size = bytes;
        }

        if let Ok(path) = std::env::var("DAVSTREAM_ENCODER_PATH") {
            config.transform.encoder_path = PathBuf::from(path);
        }

        if let Ok(timeout) = std::env::var("DAVSTREAM_STALL_TIMEOUT")
            && let Ok(seconds) = timeout.parse::<u64>()
        {
            config.source.stall_timeout = Duration::from_secs(seconds);
        }

        if let Ok(port) = std::env::var("DAVSTREAM_PORT")
            && let Ok(port) = port.parse::<u16>()
        {
            config.server.port = port;
        }

        config
    }

    /// Creates a configuration optimized for testing.
    ///
    /// Backoff delays are shortened and the periodic janitor is disabled;
    /// stall timing keeps its production values so tests drive it with a
    /// paused clock.
    pub fn for_testing(cache_root: PathBuf) -> Self {
        Self {
            source: SourceConfig {
                base_retry_delay: Duration::from_millis(10),
                max_jitter: Duration::ZERO,
                ..SourceConfig::default()
            },
            cache: CacheConfig {
                root: cache_root,
                enable_cleanup: false,
                ..CacheConfig::default()
            },
            ..Default::default()
        }
    }
}
