//! Fan-out of a response body to a background consumer.
//!
//! The client side always wins: chunks are offered to the side channel with
//! `try_send`, and the first time that fails the side channel is abandoned
//! for the rest of the stream. The side consumer learns whether it saw the
//! complete body through a oneshot outcome.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// How the side channel of a tee ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeeOutcome {
    /// Every chunk of a cleanly finished stream was delivered.
    Complete { bytes: u64 },
    /// The side channel lagged, the stream failed, or the client went away.
    Abandoned,
}

/// Receiving half handed to the background consumer.
pub struct TeeReceiver {
    pub chunks: mpsc::Receiver<Bytes>,
    pub outcome: oneshot::Receiver<TeeOutcome>,
}

/// A stream that copies its chunks to a channel while passing them through.
pub struct TeeStream<S> {
    inner: S,
    sender: Option<mpsc::Sender<Bytes>>,
    outcome: Option<oneshot::Sender<TeeOutcome>>,
    bytes_sent: u64,
}

impl<S> TeeStream<S> {
    /// Wraps `inner`; the side channel buffers at most `capacity` chunks.
    pub fn new(inner: S, capacity: usize) -> (Self, TeeReceiver) {
        let (sender, chunks) = mpsc::channel(capacity.max(1));
        let (outcome_tx, outcome) = oneshot::channel();

        (
            Self {
                inner,
                sender: Some(sender),
                outcome: Some(outcome_tx),
                bytes_sent: 0,
            },
            TeeReceiver { chunks, outcome },
        )
    }

    /// Bytes copied to the side channel so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    fn abandon(&mut self, reason: &'static str) {
        if self.sender.take().is_some() {
            debug!(reason, bytes_sent = self.bytes_sent, "Abandoning tee side channel");
        }
        if let Some(outcome) = self.outcome.take() {
            let _ = outcome.send(TeeOutcome::Abandoned);
        }
    }

    fn complete(&mut self) {
        // Close the chunk channel before reporting so the consumer drains first
        if self.sender.take().is_none() {
            return;
        }
        if let Some(outcome) = self.outcome.take() {
            let _ = outcome.send(TeeOutcome::Complete {
                bytes: self.bytes_sent,
            });
        }
    }
}

impl<S, E> Stream for TeeStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(sender) = &self.sender {
                    match sender.try_send(chunk.clone()) {
                        Ok(()) => self.bytes_sent += chunk.len() as u64,
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            warn!("Cache side channel full, abandoning cache write");
                            self.abandon("lagging");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            self.abandon("closed");
                        }
                    }
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                self.abandon("upstream error");
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.complete();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S> Drop for TeeStream<S> {
    fn drop(&mut self) {
        // Dropped before the end: the client cancelled
        self.abandon("dropped");
    }
}

#[cfg(test)]
mod tests {
    use futures::{StreamExt, stream};

    use super::*;

    type Item = Result<Bytes, std::io::Error>;

    async fn drain_side(mut receiver: TeeReceiver) -> (Vec<Bytes>, TeeOutcome) {
        let mut chunks = Vec::new();
        while let Some(chunk) = receiver.chunks.recv().await {
            chunks.push(chunk);
        }
        let outcome = receiver.outcome.await.unwrap_or(TeeOutcome::Abandoned);
        (chunks, outcome)
    }

    #[tokio::test]
    async fn test_tee_stream_basic() {
        let data: Vec<Item> = vec![Ok(Bytes::from("hello")), Ok(Bytes::from("world"))];
        let (mut tee, receiver) = TeeStream::new(stream::iter(data), 10);

        let mut collected = Vec::new();
        while let Some(Ok(chunk)) = tee.next().await {
            collected.push(chunk);
        }
        assert_eq!(collected, vec![Bytes::from("hello"), Bytes::from("world")]);
        assert_eq!(tee.bytes_sent(), 10);

        drop(tee);
        let (teed, outcome) = drain_side(receiver).await;
        assert_eq!(teed, collected);
        assert_eq!(outcome, TeeOutcome::Complete { bytes: 10 });
    }

    #[tokio::test]
    async fn test_lagging_side_is_abandoned_without_blocking_client() {
        let data: Vec<Item> = (0..5).map(|i| Ok(Bytes::from(vec![i; 4]))).collect();
        let (tee, receiver) = TeeStream::new(stream::iter(data), 2);

        // Nobody reads the side channel while the client drains
        let collected: Vec<Item> = tee.collect().await;
        assert_eq!(collected.len(), 5);

        let (teed, outcome) = drain_side(receiver).await;
        assert_eq!(teed.len(), 2);
        assert_eq!(outcome, TeeOutcome::Abandoned);
    }

    #[tokio::test]
    async fn test_upstream_error_abandons_side() {
        let data: Vec<Item> = vec![
            Ok(Bytes::from("partial")),
            Err(std::io::Error::other("encoder crashed")),
        ];
        let (tee, receiver) = TeeStream::new(stream::iter(data), 10);

        let collected: Vec<Item> = tee.collect().await;
        assert!(collected[1].is_err());

        let (_, outcome) = drain_side(receiver).await;
        assert_eq!(outcome, TeeOutcome::Abandoned);
    }

    #[tokio::test]
    async fn test_client_cancel_abandons_side() {
        let data: Vec<Item> = vec![Ok(Bytes::from("a")), Ok(Bytes::from("b"))];
        let (mut tee, receiver) = TeeStream::new(stream::iter(data), 10);

        assert!(tee.next().await.is_some());
        drop(tee);

        let (teed, outcome) = drain_side(receiver).await;
        assert_eq!(teed.len(), 1);
        assert_eq!(outcome, TeeOutcome::Abandoned);
    }
}
