//! Size-limited text previews.

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};

use crate::streaming::SourceError;

/// Truncated text body ready to be served.
pub struct PreparedText {
    pub stream: BoxStream<'static, Result<Bytes, SourceError>>,
    pub content_type: String,
    /// The file is larger than the preview and a notice is appended
    pub truncated: bool,
}

impl std::fmt::Debug for PreparedText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedText")
            .field("content_type", &self.content_type)
            .field("truncated", &self.truncated)
            .finish_non_exhaustive()
    }
}

/// Streams at most `max_size` bytes of a text file.
#[derive(Debug, Clone)]
pub struct TextTransform {
    encoding: String,
}

impl TextTransform {
    pub fn new(encoding: impl Into<String>) -> Self {
        Self {
            encoding: encoding.into(),
        }
    }

    pub fn content_type(&self) -> String {
        format!("text/plain; charset={}", self.encoding)
    }

    /// Cache parameters for a preview of this length.
    pub fn cache_params(&self, max_size: u64) -> String {
        format!("max={max_size};enc={}", self.encoding)
    }

    /// Passes bytes through until `max_size` is reached, then drops the
    /// upstream and appends a notice naming the full size.
    pub fn prepare<S>(&self, input: S, file_size: u64, max_size: u64) -> PreparedText
    where
        S: Stream<Item = Result<Bytes, SourceError>> + Send + 'static,
    {
        let truncated = file_size > max_size;
        let notice = truncated.then(|| Bytes::from(truncation_notice(max_size, file_size)));
        if truncated {
            tracing::debug!(file_size, max_size, "Truncating text preview");
        }

        let initial = Some((input.boxed(), max_size, notice));
        let stream = stream::unfold(initial, |state| async move {
            let Some((mut input, remaining, notice)) = state else {
                return None;
            };

            if remaining == 0 {
                drop(input);
                return notice.map(|n| (Ok(n), None));
            }

            match input.next().await {
                Some(Ok(chunk)) => {
                    let len = chunk.len() as u64;
                    if len >= remaining {
                        let head = chunk.slice(..remaining as usize);
                        Some((Ok(head), Some((input, 0, notice))))
                    } else {
                        Some((Ok(chunk), Some((input, remaining - len, notice))))
                    }
                }
                Some(Err(e)) => Some((Err(e), None)),
                None => notice.map(|n| (Ok(n), None)),
            }
        });

        PreparedText {
            stream: stream.boxed(),
            content_type: self.content_type(),
            truncated,
        }
    }
}

fn truncation_notice(max_size: u64, file_size: u64) -> String {
    format!("\n\n--- Preview truncated: showing the first {max_size} of {file_size} bytes ---\n")
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, SourceError>> + Send {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect(prepared: PreparedText) -> Vec<u8> {
        let parts: Vec<_> = prepared.stream.collect().await;
        parts
            .into_iter()
            .flat_map(|p| p.unwrap().to_vec())
            .collect()
    }

    #[tokio::test]
    async fn test_small_file_passes_through() {
        let transform = TextTransform::new("utf-8");
        let prepared = transform.prepare(chunks(&["hello ", "world"]), 11, 1024);

        assert!(!prepared.truncated);
        assert_eq!(prepared.content_type, "text/plain; charset=utf-8");
        assert_eq!(collect(prepared).await, b"hello world");
    }

    #[tokio::test]
    async fn test_truncates_mid_chunk_and_appends_notice() {
        let transform = TextTransform::new("utf-8");
        let prepared = transform.prepare(chunks(&["abcd", "efgh", "ijkl"]), 12, 6);

        assert!(prepared.truncated);
        let body = collect(prepared).await;
        let expected = format!("abcdef{}", truncation_notice(6, 12));
        assert_eq!(body, expected.as_bytes());
    }

    #[tokio::test]
    async fn test_exact_limit_is_not_truncated() {
        let transform = TextTransform::new("latin1");
        let prepared = transform.prepare(chunks(&["abc", "def"]), 6, 6);

        assert!(!prepared.truncated);
        assert_eq!(prepared.content_type, "text/plain; charset=latin1");
        assert_eq!(collect(prepared).await, b"abcdef");
    }

    #[tokio::test]
    async fn test_upstream_dropped_after_limit() {
        let transform = TextTransform::new("utf-8");
        let input = chunks(&["abcdef"]).chain(stream::once(async {
            Err(SourceError::Unauthorized)
        }));
        let prepared = transform.prepare(input, 100, 4);

        let parts: Vec<_> = prepared.stream.collect().await;
        assert!(parts.iter().all(|p| p.is_ok()));
        assert_eq!(&parts[0].as_ref().unwrap()[..], b"abcd");
    }

    #[tokio::test]
    async fn test_source_error_propagates_before_limit() {
        let transform = TextTransform::new("utf-8");
        let input = chunks(&["ab"]).chain(stream::once(async { Err(SourceError::Unauthorized) }));
        let prepared = transform.prepare(input, 100, 50);

        let parts: Vec<_> = prepared.stream.collect().await;
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1], Err(SourceError::Unauthorized));
    }
}
