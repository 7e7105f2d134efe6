//! Resilient ranged reads from the remote store.
//!
//! A read session runs in its own task and feeds a bounded channel. The task
//! retries failed opens with jittered exponential backoff, watches the open
//! stream for stalls, and resumes from the first undelivered byte when the
//! connection dies. Dropping the consumer side aborts the task, which drops
//! the remote connection with it.

use std::ops::RangeInclusive;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use sysinfo::{Pid, System};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::remote::{ByteStream, RemoteError, RemoteStore};
use crate::task::AbortOnDrop;

/// Errors surfaced by a read session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("Remote file not found: {path}")]
    NotFound { path: String },

    #[error("Remote store rejected credentials")]
    Unauthorized,

    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    #[error("Failed to open {path} after {attempts} attempts: {reason}")]
    StreamOpen {
        path: String,
        attempts: u32,
        reason: String,
    },

    #[error("Stream for {path} stalled after {delivered} bytes ({attempts} attempts)")]
    StreamStalled {
        path: String,
        delivered: u64,
        attempts: u32,
    },

    #[error("Stream for {path} interrupted after {delivered} bytes: {reason}")]
    Interrupted {
        path: String,
        delivered: u64,
        reason: String,
    },
}

impl SourceError {
    fn from_remote(error: RemoteError, path: &str, attempts: u32) -> Self {
        match error {
            RemoteError::NotFound { path } => SourceError::NotFound { path },
            RemoteError::Auth { .. } => SourceError::Unauthorized,
            RemoteError::InvalidPath { path } => SourceError::InvalidPath { path },
            RemoteError::Transport { reason } => SourceError::StreamOpen {
                path: path.to_string(),
                attempts,
                reason,
            },
        }
    }
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Instrumentation hook for long transfers.
pub trait TransferObserver: Send + Sync {
    /// Called roughly every `progress_interval` bytes on large ranges.
    fn on_progress(&self, path: &str, received: u64, expected: u64);

    /// Called once when a session delivered its whole range.
    fn on_complete(&self, _path: &str, _received: u64) {}
}

/// Logs resident memory of the process while large ranges stream.
pub struct MemoryUsageObserver {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl Default for MemoryUsageObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUsageObserver {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    fn resident_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        system.refresh_process(pid);
        system.process(pid).map(|process| process.memory())
    }
}

impl TransferObserver for MemoryUsageObserver {
    fn on_progress(&self, path: &str, received: u64, expected: u64) {
        let percent = received as f64 / expected.max(1) as f64 * 100.0;
        debug!(
            path,
            received_mb = received / (1024 * 1024),
            expected_mb = expected / (1024 * 1024),
            percent = %format!("{percent:.1}"),
            rss_mb = self.resident_bytes().map(|b| b / (1024 * 1024)),
            "Large transfer progress"
        );
    }

    fn on_complete(&self, path: &str, received: u64) {
        debug!(path, received, "Large transfer complete");
    }
}

/// Backoff before open attempt `attempt + 1`, without jitter.
///
/// `base × 1.5^attempt`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.mul_f64(1.5f64.powi(attempt as i32))
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::random::<u64>() % (max_ms + 1))
}

/// Opens resilient byte-range reads against a remote store.
#[derive(Clone)]
pub struct RemoteStreamSource {
    store: Arc<dyn RemoteStore>,
    config: SourceConfig,
    observer: Arc<dyn TransferObserver>,
}

impl RemoteStreamSource {
    pub fn new(store: Arc<dyn RemoteStore>, config: SourceConfig) -> Self {
        Self {
            store,
            config,
            observer: Arc::new(MemoryUsageObserver::new()),
        }
    }

    /// Replaces the default memory logging observer.
    pub fn with_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// Opens `range` of `path`, yielding chunks as the store delivers them.
    ///
    /// # Errors
    ///
    /// - `SourceError::NotFound` - File does not exist
    /// - `SourceError::Unauthorized` - Store rejected credentials
    /// - `SourceError::StreamOpen` - Every open attempt failed
    pub async fn open(&self, path: &str, range: RangeInclusive<u64>) -> SourceResult<SourceStream> {
        self.open_chunked(path, range, u64::MAX).await
    }

    /// Like [`open`](Self::open), splitting store chunks into frames of at
    /// most `chunk_size` bytes.
    pub async fn open_chunked(
        &self,
        path: &str,
        range: RangeInclusive<u64>,
        chunk_size: u64,
    ) -> SourceResult<SourceStream> {
        let (start, end) = (*range.start(), *range.end());
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));

        let mut worker = SessionWorker {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            observer: Arc::clone(&self.observer),
            session: ResilientStreamSession::new(path, start, end, self.config.progress_interval),
            chunk_size: chunk_size.max(1),
            tx,
        };

        // The first open happens before the caller commits to a response
        let stream = worker.open_stream().await?;
        let expected = worker.session.expected();
        let task = tokio::spawn(worker.run(stream));

        Ok(SourceStream {
            rx,
            _task: AbortOnDrop::new(task),
            expected,
        })
    }
}

/// Per-read state: attempts, progress and the last time data moved.
#[derive(Debug)]
pub struct ResilientStreamSession {
    path: String,
    start: u64,
    end: u64,
    attempts: u32,
    delivered: u64,
    last_activity: Instant,
    next_report: u64,
    report_interval: u64,
}

impl ResilientStreamSession {
    fn new(path: &str, start: u64, end: u64, report_interval: u64) -> Self {
        Self {
            path: path.to_string(),
            start,
            end,
            attempts: 0,
            delivered: 0,
            last_activity: Instant::now(),
            next_report: report_interval,
            report_interval: report_interval.max(1),
        }
    }

    fn expected(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }

    /// Range still owed to the consumer.
    fn remaining(&self) -> RangeInclusive<u64> {
        (self.start + self.delivered)..=self.end
    }

    fn is_complete(&self) -> bool {
        self.delivered >= self.expected()
    }

    fn is_large(&self) -> bool {
        self.expected() > self.report_interval
    }
}

enum SessionEvent {
    Chunk(Option<Result<Bytes, RemoteError>>),
    WatchdogTick,
}

struct SessionWorker {
    store: Arc<dyn RemoteStore>,
    config: SourceConfig,
    observer: Arc<dyn TransferObserver>,
    session: ResilientStreamSession,
    chunk_size: u64,
    tx: mpsc::Sender<SourceResult<Bytes>>,
}

impl SessionWorker {
    /// Opens the remaining range, consuming attempts from the session budget.
    ///
    /// An open that gets no answer within the stall timeout counts as a
    /// failed attempt.
    async fn open_stream(&mut self) -> SourceResult<ByteStream> {
        loop {
            self.session.attempts += 1;
            let attempt = self.session.attempts;
            let range = self.session.remaining();

            let opened = tokio::time::timeout(
                self.config.stall_timeout,
                self.store.read_stream(&self.session.path, range.clone()),
            )
            .await
            .unwrap_or_else(|_| {
                Err(RemoteError::Transport {
                    reason: format!(
                        "no response within {}s",
                        self.config.stall_timeout.as_secs_f64()
                    ),
                })
            });

            match opened {
                Ok(stream) => {
                    if attempt > 1 {
                        info!(
                            path = %self.session.path,
                            attempt,
                            resume_from = range.start(),
                            "Reopened remote stream"
                        );
                    }
                    self.session.last_activity = Instant::now();
                    return Ok(stream);
                }
                Err(e) if !e.is_retryable() => {
                    return Err(SourceError::from_remote(e, &self.session.path, attempt));
                }
                Err(e) => {
                    if attempt >= self.config.max_open_attempts {
                        warn!(path = %self.session.path, attempt, error = %e, "Giving up opening remote stream");
                        return Err(SourceError::from_remote(e, &self.session.path, attempt));
                    }
                    let delay = backoff_delay(self.config.base_retry_delay, attempt)
                        + jitter(self.config.max_jitter);
                    warn!(
                        path = %self.session.path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Remote open failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn run(mut self, mut stream: ByteStream) {
        let period = self.config.watchdog_interval;
        let mut watchdog = tokio::time::interval_at(Instant::now() + period, period);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let event = tokio::select! {
                chunk = stream.next() => SessionEvent::Chunk(chunk),
                _ = watchdog.tick() => SessionEvent::WatchdogTick,
            };

            let failure = match event {
                SessionEvent::Chunk(Some(Ok(chunk))) => {
                    if !self.forward(chunk).await {
                        debug!(path = %self.session.path, "Consumer went away, closing remote stream");
                        return;
                    }
                    if !self.session.is_complete() {
                        continue;
                    }
                    self.finish();
                    return;
                }
                SessionEvent::Chunk(Some(Err(e))) => SourceError::Interrupted {
                    path: self.session.path.clone(),
                    delivered: self.session.delivered,
                    reason: e.to_string(),
                },
                SessionEvent::Chunk(None) if self.session.is_complete() => {
                    self.finish();
                    return;
                }
                SessionEvent::Chunk(None) => SourceError::Interrupted {
                    path: self.session.path.clone(),
                    delivered: self.session.delivered,
                    reason: "remote stream ended early".to_string(),
                },
                SessionEvent::WatchdogTick => {
                    if self.session.last_activity.elapsed() < self.config.stall_timeout {
                        continue;
                    }
                    SourceError::StreamStalled {
                        path: self.session.path.clone(),
                        delivered: self.session.delivered,
                        attempts: self.session.attempts,
                    }
                }
            };

            warn!(path = %self.session.path, error = %failure, "Remote stream failed");
            // Tear down the broken connection before reopening
            drop(stream);

            match self.resume(failure).await {
                Some(reopened) => stream = reopened,
                None => return,
            }
        }
    }

    /// Reopens from the first undelivered byte, or reports `failure` when
    /// the attempt budget is spent.
    async fn resume(&mut self, failure: SourceError) -> Option<ByteStream> {
        if self.session.attempts >= self.config.max_open_attempts {
            let failure = match failure {
                SourceError::StreamStalled { path, delivered, .. } => SourceError::StreamStalled {
                    path,
                    delivered,
                    attempts: self.session.attempts,
                },
                other => other,
            };
            let _ = self.tx.send(Err(failure)).await;
            return None;
        }

        match self.open_stream().await {
            Ok(stream) => Some(stream),
            Err(e) => {
                let _ = self.tx.send(Err(e)).await;
                None
            }
        }
    }

    /// Sends a store chunk to the consumer in frames of at most `chunk_size`.
    ///
    /// Returns false once the consumer is gone.
    async fn forward(&mut self, mut chunk: Bytes) -> bool {
        let owed = self.session.expected() - self.session.delivered;
        if chunk.len() as u64 > owed {
            chunk.truncate(owed as usize);
        }

        while !chunk.is_empty() {
            let take = (chunk.len() as u64).min(self.chunk_size) as usize;
            let frame = chunk.split_to(take);
            let len = frame.len() as u64;

            if self.tx.send(Ok(frame)).await.is_err() {
                return false;
            }

            // Time spent waiting on a slow consumer is not a stall
            self.session.last_activity = Instant::now();
            self.session.delivered += len;
            self.report_progress();
        }
        true
    }

    fn report_progress(&mut self) {
        if !self.session.is_large() || self.session.delivered < self.session.next_report {
            return;
        }
        self.observer.on_progress(
            &self.session.path,
            self.session.delivered,
            self.session.expected(),
        );
        while self.session.next_report <= self.session.delivered {
            self.session.next_report += self.session.report_interval;
        }
    }

    fn finish(&self) {
        debug!(
            path = %self.session.path,
            delivered = self.session.delivered,
            attempts = self.session.attempts,
            "Remote read complete"
        );
        if self.session.is_large() {
            self.observer
                .on_complete(&self.session.path, self.session.delivered);
        }
    }
}

/// Consumer side of a read session.
///
/// Dropping it aborts the session task and closes the remote connection.
pub struct SourceStream {
    rx: mpsc::Receiver<SourceResult<Bytes>>,
    _task: AbortOnDrop<()>,
    expected: u64,
}

impl SourceStream {
    /// Number of bytes the stream yields when it completes.
    pub fn expected_len(&self) -> u64 {
        self.expected
    }
}

impl Stream for SourceStream {
    type Item = SourceResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for SourceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceStream")
            .field("expected", &self.expected)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    use super::*;
    use crate::remote::{MemoryStore, StoreFault};

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn source(store: Arc<MemoryStore>) -> RemoteStreamSource {
        let config = SourceConfig {
            base_retry_delay: Duration::from_millis(10),
            max_jitter: Duration::ZERO,
            ..SourceConfig::default()
        };
        RemoteStreamSource::new(store, config)
    }

    async fn drain(mut stream: SourceStream) -> (Vec<u8>, Option<SourceError>) {
        let mut data = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => data.extend_from_slice(&chunk),
                Err(e) => return (data, Some(e)),
            }
        }
        (data, None)
    }

    #[tokio::test]
    async fn test_reads_exact_range() {
        let store = Arc::new(MemoryStore::with_chunk_size(1000));
        let data = pattern(10_000);
        store.insert("a.bin", data.clone());

        let stream = source(Arc::clone(&store)).open("a.bin", 2000..=5999).await.unwrap();
        assert_eq!(stream.expected_len(), 4000);

        let (received, error) = drain(stream).await;
        assert!(error.is_none());
        assert_eq!(received, &data[2000..6000]);
        assert_eq!(store.reads(), vec![("a.bin".to_string(), 2000..=5999)]);
    }

    #[tokio::test]
    async fn test_frames_respect_chunk_size() {
        let store = Arc::new(MemoryStore::with_chunk_size(10_000));
        store.insert("a.bin", pattern(10_000));

        let mut stream = source(store).open_chunked("a.bin", 0..=9999, 3000).await.unwrap();
        let mut sizes = Vec::new();
        while let Some(chunk) = stream.next().await {
            sizes.push(chunk.unwrap().len());
        }
        assert_eq!(sizes, vec![3000, 3000, 3000, 1000]);
    }

    #[tokio::test]
    async fn test_open_retries_then_succeeds() {
        let store = Arc::new(MemoryStore::new());
        store.insert("a.bin", pattern(100));
        store.inject(StoreFault::FailOpen);
        store.inject(StoreFault::FailOpen);

        let stream = source(Arc::clone(&store)).open("a.bin", 0..=99).await.unwrap();
        let (received, error) = drain(stream).await;

        assert!(error.is_none());
        assert_eq!(received.len(), 100);
        assert_eq!(store.read_count(), 3);
    }

    #[tokio::test]
    async fn test_open_gives_up_after_three_attempts() {
        let store = Arc::new(MemoryStore::new());
        store.insert("a.bin", pattern(100));
        for _ in 0..3 {
            store.inject(StoreFault::FailOpen);
        }

        let result = source(Arc::clone(&store)).open("a.bin", 0..=99).await;
        assert!(matches!(
            result,
            Err(SourceError::StreamOpen { attempts: 3, .. })
        ));
        assert_eq!(store.read_count(), 3);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_retried() {
        let store = Arc::new(MemoryStore::new());

        let result = source(Arc::clone(&store)).open("missing.bin", 0..=9).await;
        assert!(matches!(result, Err(SourceError::NotFound { .. })));
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_resumes_from_first_undelivered_byte() {
        let store = Arc::new(MemoryStore::with_chunk_size(1000));
        let data = pattern(10_000);
        store.insert("a.bin", data.clone());
        store.inject(StoreFault::StallAfter(4000));

        let stream = source(Arc::clone(&store)).open("a.bin", 0..=9999).await.unwrap();
        let (received, error) = drain(stream).await;

        assert!(error.is_none());
        assert_eq!(received, data);
        assert_eq!(
            store.reads(),
            vec![
                ("a.bin".to_string(), 0..=9999),
                ("a.bin".to_string(), 4000..=9999)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_surfaces_after_attempt_budget() {
        let store = Arc::new(MemoryStore::with_chunk_size(1000));
        store.insert("a.bin", pattern(10_000));
        store.inject(StoreFault::StallAfter(1000));
        store.inject(StoreFault::StallAfter(1000));
        store.inject(StoreFault::StallAfter(1000));

        let started = Instant::now();
        let stream = source(Arc::clone(&store)).open("a.bin", 0..=9999).await.unwrap();
        let (received, error) = drain(stream).await;

        assert_eq!(received.len(), 3000);
        assert_eq!(
            error,
            Some(SourceError::StreamStalled {
                path: "a.bin".to_string(),
                delivered: 3000,
                attempts: 3,
            })
        );
        assert_eq!(store.read_count(), 3);
        // Each stall is detected on the first watchdog tick past 15s
        assert!(started.elapsed() >= Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_open_is_retried() {
        let store = Arc::new(MemoryStore::new());
        let data = pattern(100);
        store.insert("a.mp4", data.clone());
        store.inject(StoreFault::HangOnOpen);

        let started = Instant::now();
        let stream = source(Arc::clone(&store)).open("a.mp4", 0..=99).await.unwrap();
        let (received, error) = drain(stream).await;

        assert!(error.is_none());
        assert_eq!(received, data);
        assert_eq!(store.read_count(), 2);
        assert!(started.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_opens_exhaust_attempt_budget() {
        let store = Arc::new(MemoryStore::new());
        store.insert("a.mp4", pattern(100));
        for _ in 0..3 {
            store.inject(StoreFault::HangOnOpen);
        }

        let result = tokio::time::timeout(
            Duration::from_secs(600),
            source(Arc::clone(&store)).open("a.mp4", 0..=99),
        )
        .await
        .expect("open must not hang");

        assert!(matches!(
            result,
            Err(SourceError::StreamOpen { attempts: 3, .. })
        ));
        assert_eq!(store.read_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_reopen_after_stall_is_bounded() {
        let store = Arc::new(MemoryStore::with_chunk_size(1000));
        store.insert("a.bin", pattern(10_000));
        store.inject(StoreFault::StallAfter(2000));
        store.inject(StoreFault::HangOnOpen);
        store.inject(StoreFault::HangOnOpen);

        let stream = source(Arc::clone(&store)).open("a.bin", 0..=9999).await.unwrap();
        let (received, error) = tokio::time::timeout(Duration::from_secs(600), drain(stream))
            .await
            .expect("session must not hang");

        assert_eq!(received.len(), 2000);
        assert!(matches!(
            error,
            Some(SourceError::StreamOpen { attempts: 3, .. })
        ));
        assert_eq!(store.read_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_consumer_is_not_a_stall() {
        let store = Arc::new(MemoryStore::with_chunk_size(1000));
        store.insert("a.bin", pattern(5000));

        let mut stream = source(Arc::clone(&store)).open("a.bin", 0..=4999).await.unwrap();
        let mut received = 0;
        while let Some(chunk) = stream.next().await {
            received += chunk.unwrap().len();
            tokio::time::sleep(Duration::from_secs(30)).await;
        }

        assert_eq!(received, 5000);
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test]
    async fn test_connection_reset_resumes() {
        let store = Arc::new(MemoryStore::with_chunk_size(500));
        let data = pattern(3000);
        store.insert("a.bin", data.clone());
        store.inject(StoreFault::ResetAfter(1500));

        let stream = source(Arc::clone(&store)).open("a.bin", 0..=2999).await.unwrap();
        let (received, error) = drain(stream).await;

        assert!(error.is_none());
        assert_eq!(received, data);
        assert_eq!(store.reads()[1], ("a.bin".to_string(), 1500..=2999));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_consumer_stops_reading() {
        let store = Arc::new(MemoryStore::with_chunk_size(1000));
        store.insert("a.bin", pattern(10_000));
        store.inject(StoreFault::StallAfter(1000));

        let mut stream = source(Arc::clone(&store)).open("a.bin", 0..=9999).await.unwrap();
        assert!(stream.next().await.is_some());
        drop(stream);

        // A live session would have reopened after the stall timeout
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.read_count(), 1);
    }

    struct CountingObserver {
        calls: AtomicUsize,
        last: AtomicU64,
    }

    impl TransferObserver for CountingObserver {
        fn on_progress(&self, _path: &str, received: u64, _expected: u64) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last.store(received, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_observer_reports_large_ranges_only() {
        let store = Arc::new(MemoryStore::with_chunk_size(100));
        store.insert("big.bin", pattern(1000));
        store.insert("small.bin", pattern(200));

        let observer = Arc::new(CountingObserver {
            calls: AtomicUsize::new(0),
            last: AtomicU64::new(0),
        });
        let config = SourceConfig {
            progress_interval: 250,
            ..SourceConfig::default()
        };
        let source = RemoteStreamSource::new(store, config).with_observer(observer.clone());

        drain(source.open("big.bin", 0..=999).await.unwrap()).await;
        // Reports at 300, 500, 800 and 1000 bytes
        assert_eq!(observer.calls.load(Ordering::SeqCst), 4);
        assert_eq!(observer.last.load(Ordering::SeqCst), 1000);

        drain(source.open("small.bin", 0..=199).await.unwrap()).await;
        assert_eq!(observer.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_backoff_grows_by_half() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(750));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(1125));
    }
}
