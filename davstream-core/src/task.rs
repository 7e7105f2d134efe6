//! Task ownership helpers.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::{JoinError, JoinHandle};

/// Join handle that aborts its task when dropped.
///
/// Background work spawned on behalf of a response (remote readers, encoder
/// pumps) must not outlive the response body that owns it.
#[derive(Debug)]
pub struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> AbortOnDrop<T> {
    pub fn new(handle: JoinHandle<T>) -> Self {
        Self(handle)
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_dropping_guard_aborts_task() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let guard = AbortOnDrop::new(tokio::spawn(async move {
            let _tx = tx;
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }));

        drop(guard);

        // The sender is dropped when the aborted task is torn down
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_guard_yields_task_output() {
        let guard = AbortOnDrop::new(tokio::spawn(async { 42u32 }));
        assert_eq!(guard.await.unwrap(), 42);
    }
}
