//! Live video transcoding through an external encoder process.
//!
//! The raw file is pumped into the encoder's stdin by a background task
//! while fragmented MP4 is read from its stdout. Pipe backpressure pauses
//! the upstream read, and dropping the output stream kills the process.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, Command};
use tokio_util::io::ReaderStream;

use super::{Quality, TransformError, TransformResult};
use crate::streaming::{BandwidthClass, ByteRange, SourceError, is_hls};
use crate::task::AbortOnDrop;

/// Files above this size are compressed automatically on slow links.
pub const AUTO_COMPRESS_THRESHOLD: u64 = 20 * 1024 * 1024;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const STDERR_TAIL_LINES: usize = 20;
const OUTPUT_READ_CAPACITY: usize = 64 * 1024;
const COMPRESSIBLE_CONTAINERS: [&str; 6] = ["mp4", "m4v", "mov", "mkv", "webm", "avi"];

/// Result of probing the encoder binary at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderAvailability {
    Available { binary: PathBuf, version: String },
    Unavailable { reason: String },
}

impl EncoderAvailability {
    /// Runs `<binary> -version` and records the first line of its output.
    pub async fn probe(binary: &Path) -> Self {
        let output = Command::new(binary)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let availability = match tokio::time::timeout(PROBE_TIMEOUT, output).await {
            Ok(Ok(output)) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                EncoderAvailability::Available {
                    binary: binary.to_path_buf(),
                    version: stdout.lines().next().unwrap_or_default().trim().to_string(),
                }
            }
            Ok(Ok(output)) => EncoderAvailability::Unavailable {
                reason: format!("{} -version exited with {}", binary.display(), output.status),
            },
            Ok(Err(e)) => EncoderAvailability::Unavailable {
                reason: format!("{}: {e}", binary.display()),
            },
            Err(_) => EncoderAvailability::Unavailable {
                reason: format!("{} -version timed out", binary.display()),
            },
        };

        match &availability {
            EncoderAvailability::Available { version, .. } => {
                tracing::info!(binary = %binary.display(), version, "Video encoder available");
            }
            EncoderAvailability::Unavailable { reason } => {
                tracing::warn!(reason, "Video encoder unavailable, videos will be served raw");
            }
        }
        availability
    }

    pub fn is_available(&self) -> bool {
        matches!(self, EncoderAvailability::Available { .. })
    }
}

/// Decides whether a video request should be transcoded.
///
/// Availability of the encoder is not considered here; it is enforced when
/// the transcode actually starts.
pub fn should_compress(
    format: &str,
    file_size: u64,
    quality: Quality,
    bandwidth: BandwidthClass,
) -> bool {
    if is_hls(format) || quality == Quality::Original {
        return false;
    }
    let format = format.to_ascii_lowercase();
    if !COMPRESSIBLE_CONTAINERS.contains(&format.as_str()) {
        return false;
    }
    match quality {
        Quality::Low | Quality::Medium => true,
        _ => {
            file_size > AUTO_COMPRESS_THRESHOLD
                && matches!(bandwidth, BandwidthClass::Low | BandwidthClass::Medium)
        }
    }
}

/// Encoder preset tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoTier {
    Low,
    Medium,
    High,
}

/// Encoder parameters for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierSettings {
    pub max_width: u32,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
    pub preset: &'static str,
}

impl VideoTier {
    /// Explicit quality wins; `auto` follows the bandwidth class.
    pub fn for_request(quality: Quality, bandwidth: BandwidthClass) -> Self {
        match quality {
            Quality::Low => VideoTier::Low,
            Quality::Medium => VideoTier::Medium,
            Quality::High => VideoTier::High,
            Quality::Original | Quality::Auto => match bandwidth {
                BandwidthClass::Low => VideoTier::Low,
                BandwidthClass::Medium => VideoTier::Medium,
                BandwidthClass::High => VideoTier::High,
            },
        }
    }

    pub fn settings(&self) -> TierSettings {
        match self {
            VideoTier::Low => TierSettings {
                max_width: 640,
                video_bitrate_kbps: 800,
                audio_bitrate_kbps: 96,
                preset: "veryfast",
            },
            VideoTier::Medium => TierSettings {
                max_width: 1280,
                video_bitrate_kbps: 2000,
                audio_bitrate_kbps: 128,
                preset: "faster",
            },
            VideoTier::High => TierSettings {
                max_width: 1920,
                video_bitrate_kbps: 4500,
                audio_bitrate_kbps: 192,
                preset: "fast",
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoTier::Low => "low",
            VideoTier::Medium => "medium",
            VideoTier::High => "high",
        }
    }

    pub fn cache_params(&self) -> String {
        format!("tier={};fmt=mp4", self.as_str())
    }

    /// Encoder command line: raw input on stdin, fragmented MP4 on stdout.
    pub fn encoder_args(&self) -> Vec<String> {
        let s = self.settings();
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
            "-vf".to_string(),
            format!("scale='min({},iw)':-2", s.max_width),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            s.preset.to_string(),
            "-b:v".to_string(),
            format!("{}k", s.video_bitrate_kbps),
            "-maxrate".to_string(),
            format!("{}k", s.video_bitrate_kbps),
            "-bufsize".to_string(),
            format!("{}k", s.video_bitrate_kbps * 2),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            format!("{}k", s.audio_bitrate_kbps),
            "-movflags".to_string(),
            "frag_keyframe+empty_moov+default_base_moof".to_string(),
            "-f".to_string(),
            "mp4".to_string(),
            "pipe:1".to_string(),
        ]
    }
}

/// Live encoder output.
pub struct TranscodeOutput {
    pub stream: BoxStream<'static, TransformResult<Bytes>>,
    /// Unknown while the encoder is still running
    pub output_size: Option<u64>,
    pub content_type: &'static str,
}

impl std::fmt::Debug for TranscodeOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodeOutput")
            .field("output_size", &self.output_size)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Spawns encoder processes for whole-file transcodes.
#[derive(Debug, Clone)]
pub struct VideoTransform {
    availability: EncoderAvailability,
}

impl VideoTransform {
    pub fn new(availability: EncoderAvailability) -> Self {
        Self { availability }
    }

    pub fn availability(&self) -> &EncoderAvailability {
        &self.availability
    }

    /// Starts transcoding `input`, which must carry the whole file.
    ///
    /// # Errors
    ///
    /// - `TransformError::PartialInput` - `range` does not cover the file
    /// - `TransformError::TranscoderUnavailable` - No encoder could be started
    /// - `TransformError::Io` - The process could not be spawned
    pub fn transcode<S>(
        &self,
        input: S,
        tier: VideoTier,
        format: &str,
        range: ByteRange,
    ) -> TransformResult<TranscodeOutput>
    where
        S: Stream<Item = Result<Bytes, SourceError>> + Send + Unpin + 'static,
    {
        if !range.is_full() {
            return Err(TransformError::PartialInput {
                start: range.start,
                end: range.end,
                total: range.total,
            });
        }

        let binary = match &self.availability {
            EncoderAvailability::Available { binary, .. } => binary.clone(),
            EncoderAvailability::Unavailable { reason } => {
                return Err(TransformError::TranscoderUnavailable {
                    reason: reason.clone(),
                });
            }
        };

        let spawned = Command::new(&binary)
            .args(tier.encoder_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransformError::TranscoderUnavailable {
                    reason: format!("{}: {e}", binary.display()),
                });
            }
            Err(e) => return Err(TransformError::Io(e)),
        };

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(TransformError::Io(std::io::Error::other(
                "encoder stdio was not captured",
            )));
        };

        tracing::info!(
            format,
            tier = tier.as_str(),
            input_size = range.total,
            pid = child.id(),
            "Transcoding started"
        );

        let encoding = Encoding {
            child,
            output: ReaderStream::with_capacity(stdout, OUTPUT_READ_CAPACITY),
            pump: AbortOnDrop::new(tokio::spawn(pump_input(input, stdin))),
            stderr: AbortOnDrop::new(tokio::spawn(stderr_tail(stderr))),
            produced: 0,
        };

        let stream = stream::unfold(Some(encoding), |state| async move {
            let Some(mut encoding) = state else {
                return None;
            };
            match encoding.output.next().await {
                Some(Ok(chunk)) => {
                    encoding.produced += chunk.len() as u64;
                    Some((Ok(chunk), Some(encoding)))
                }
                Some(Err(e)) => Some((Err(TransformError::Io(e)), None)),
                None => match encoding.finish().await {
                    Ok(()) => None,
                    Err(e) => Some((Err(e), None)),
                },
            }
        });

        Ok(TranscodeOutput {
            stream: stream.boxed(),
            output_size: None,
            content_type: "video/mp4",
        })
    }
}

/// Running encoder and its helper tasks. Dropping it kills the process.
struct Encoding {
    child: Child,
    output: ReaderStream<tokio::process::ChildStdout>,
    pump: AbortOnDrop<TransformResult<u64>>,
    stderr: AbortOnDrop<String>,
    produced: u64,
}

impl Encoding {
    async fn finish(&mut self) -> TransformResult<()> {
        let pumped = (&mut self.pump).await?;
        let status = self.child.wait().await?;

        // A truncated input makes the encoder exit cleanly with short output
        let pumped = pumped?;

        if !status.success() {
            let stderr = (&mut self.stderr).await.unwrap_or_default();
            tracing::warn!(
                exit_code = status.code(),
                stderr = %stderr,
                "Encoder exited with failure"
            );
            return Err(TransformError::TranscodeProcess {
                exit_code: status.code(),
                stderr,
            });
        }

        tracing::info!(
            input_bytes = pumped,
            output_bytes = self.produced,
            "Transcoding finished"
        );
        Ok(())
    }
}

async fn pump_input<S>(mut input: S, mut stdin: ChildStdin) -> TransformResult<u64>
where
    S: Stream<Item = Result<Bytes, SourceError>> + Unpin,
{
    let mut written = 0u64;
    while let Some(chunk) = input.next().await {
        let chunk = chunk?;
        match stdin.write_all(&chunk).await {
            Ok(()) => written += chunk.len() as u64,
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                // Encoder stopped reading; its exit status tells the story
                tracing::debug!(written, "Encoder closed stdin early");
                return Ok(written);
            }
            Err(e) => return Err(TransformError::Io(e)),
        }
    }
    match stdin.shutdown().await {
        Ok(()) => Ok(written),
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(written),
        Err(e) => Err(TransformError::Io(e)),
    }
}

async fn stderr_tail(stderr: ChildStderr) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join("\n")
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;
    use crate::testing::write_script_encoder;

    fn input(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, SourceError>> + Send + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    fn available(binary: PathBuf) -> VideoTransform {
        VideoTransform::new(EncoderAvailability::Available {
            binary,
            version: "test".to_string(),
        })
    }

    async fn drain(output: TranscodeOutput) -> (Vec<u8>, Option<TransformError>) {
        let mut body = Vec::new();
        let mut stream = output.stream;
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => body.extend_from_slice(&chunk),
                Err(e) => return (body, Some(e)),
            }
        }
        (body, None)
    }

    #[test]
    fn test_should_compress_rules() {
        use BandwidthClass::*;

        assert!(!should_compress("m3u8", 50_000_000, Quality::Low, Low));
        assert!(!should_compress("ts", 50_000_000, Quality::Low, Low));
        assert!(!should_compress("mp4", 50_000_000, Quality::Original, Low));
        assert!(!should_compress("flv", 50_000_000, Quality::Low, Low));
        assert!(should_compress("mp4", 1_000, Quality::Low, High));
        assert!(should_compress("MKV", 1_000, Quality::Medium, High));
        assert!(should_compress("mov", 30_000_000, Quality::Auto, Medium));
        assert!(!should_compress("mov", 30_000_000, Quality::Auto, High));
        assert!(!should_compress("mov", 10_000_000, Quality::Auto, Low));
        assert!(!should_compress("mp4", 30_000_000, Quality::High, High));
    }

    #[test]
    fn test_tier_selection_and_args() {
        assert_eq!(
            VideoTier::for_request(Quality::Auto, BandwidthClass::Low),
            VideoTier::Low
        );
        assert_eq!(
            VideoTier::for_request(Quality::High, BandwidthClass::Low),
            VideoTier::High
        );

        let args = VideoTier::Low.encoder_args();
        let joined = args.join(" ");
        assert!(joined.starts_with("-hide_banner -loglevel error -i pipe:0"));
        assert!(joined.contains("scale='min(640,iw)':-2"));
        assert!(joined.contains("-c:v libx264 -preset veryfast -b:v 800k"));
        assert!(joined.contains("-c:a aac -b:a 96k"));
        assert!(joined.contains("-movflags frag_keyframe+empty_moov+default_base_moof"));
        assert!(joined.ends_with("-f mp4 pipe:1"));
    }

    #[tokio::test]
    async fn test_transcode_pipes_input_through_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = write_script_encoder(dir.path(), "encoder", "cat; printf ENCODED");
        let transform = available(encoder);
        let range = ByteRange::full(8).unwrap();

        let output = transform
            .transcode(input(&["raw-", "data"]), VideoTier::Low, "mp4", range)
            .unwrap();
        assert_eq!(output.output_size, None);
        assert_eq!(output.content_type, "video/mp4");

        let (body, error) = drain(output).await;
        assert!(error.is_none());
        assert_eq!(body, b"raw-dataENCODED");
    }

    #[tokio::test]
    async fn test_encoder_receives_tier_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let args_file = dir.path().join("args.txt");
        let body = format!("printf '%s\\n' \"$@\" > '{}'; cat", args_file.display());
        let encoder = write_script_encoder(dir.path(), "encoder", &body);
        let transform = available(encoder);

        let output = transform
            .transcode(input(&["x"]), VideoTier::Medium, "mkv", ByteRange::full(1).unwrap())
            .unwrap();
        let _ = drain(output).await;

        let recorded = std::fs::read_to_string(&args_file).unwrap();
        let recorded: Vec<&str> = recorded.lines().collect();
        assert_eq!(recorded, VideoTier::Medium.encoder_args());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_terminal_process_error() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = write_script_encoder(
            dir.path(),
            "encoder",
            "cat > /dev/null; echo 'Invalid data found' >&2; exit 3",
        );
        let transform = available(encoder);

        let output = transform
            .transcode(input(&["junk"]), VideoTier::Low, "avi", ByteRange::full(4).unwrap())
            .unwrap();
        let (body, error) = drain(output).await;

        assert!(body.is_empty());
        match error {
            Some(TransformError::TranscodeProcess { exit_code, stderr }) => {
                assert_eq!(exit_code, Some(3));
                assert!(stderr.contains("Invalid data found"));
            }
            other => panic!("expected process error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_encoder_exiting_without_reading_input() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = write_script_encoder(dir.path(), "encoder", "exit 1");
        let transform = available(encoder);
        let size = 1024 * 1024;
        let big = stream::iter(vec![Ok(Bytes::from(vec![0u8; size]))]);

        let output = transform
            .transcode(big, VideoTier::Low, "mp4", ByteRange::full(size as u64).unwrap())
            .unwrap();
        let (_, error) = drain(output).await;

        assert!(matches!(
            error,
            Some(TransformError::TranscodeProcess {
                exit_code: Some(1),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_source_failure_surfaces_as_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = write_script_encoder(dir.path(), "encoder", "cat");
        let transform = available(encoder);
        let failing = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(SourceError::Unauthorized),
        ]);

        let output = transform
            .transcode(failing, VideoTier::Low, "mp4", ByteRange::full(10).unwrap())
            .unwrap();
        let (_, error) = drain(output).await;

        assert!(error.is_some_and(|e| e.is_source_failure()));
    }

    #[tokio::test]
    async fn test_unavailable_encoder_fails_fast() {
        let transform = VideoTransform::new(EncoderAvailability::Unavailable {
            reason: "not installed".to_string(),
        });
        let error = transform
            .transcode(input(&["x"]), VideoTier::Low, "mp4", ByteRange::full(1).unwrap())
            .unwrap_err();
        assert!(matches!(error, TransformError::TranscoderUnavailable { .. }));

        let missing = available(PathBuf::from("/nonexistent/davstream-encoder"));
        let error = missing
            .transcode(input(&["x"]), VideoTier::Low, "mp4", ByteRange::full(1).unwrap())
            .unwrap_err();
        assert!(matches!(error, TransformError::TranscoderUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_partial_input_rejected() {
        let transform = available(PathBuf::from("cat"));
        let range = ByteRange {
            start: 0,
            end: 9,
            total: 100,
        };
        let error = transform
            .transcode(input(&["x"]), VideoTier::Low, "mp4", range)
            .unwrap_err();
        assert!(matches!(
            error,
            TransformError::PartialInput {
                start: 0,
                end: 9,
                total: 100
            }
        ));
    }

    #[tokio::test]
    async fn test_probe_reports_version_line() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = write_script_encoder(
            dir.path(),
            "ffmpeg",
            "echo 'ffmpeg version 6.1 Copyright (c) 2000-2023'; echo 'built with gcc'",
        );

        let availability = EncoderAvailability::probe(&encoder).await;
        assert_eq!(
            availability,
            EncoderAvailability::Available {
                binary: encoder,
                version: "ffmpeg version 6.1 Copyright (c) 2000-2023".to_string(),
            }
        );

        let missing = EncoderAvailability::probe(Path::new("/nonexistent/ffmpeg")).await;
        assert!(!missing.is_available());
    }
}
