//! HTTP byte range parsing and validation.
//!
//! Only single `bytes=<start>-[<end>]` ranges are understood. Anything else,
//! including suffix and multi-range forms, is treated as if no range had
//! been sent.

use std::ops::RangeInclusive;

/// A range as the client asked for it, not yet checked against a file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: Option<u64>,
}

impl RangeSpec {
    /// Fills an open end with `start + window - 1`, clamped to the file.
    ///
    /// Explicit ends are kept as requested.
    pub fn with_window(self, window: u64, total: u64) -> Self {
        match self.end {
            Some(_) => self,
            None => {
                let end = self
                    .start
                    .saturating_add(window.max(1))
                    .saturating_sub(1)
                    .min(total.saturating_sub(1));
                Self {
                    start: self.start,
                    end: Some(end),
                }
            }
        }
    }

    /// Validates against `total` bytes.
    ///
    /// Returns `None` when the range cannot be served: start past the end
    /// of the file, end before start, or an explicit end at or beyond the
    /// file size. Callers downgrade such requests to a full response.
    pub fn resolve(&self, total: u64) -> Option<ByteRange> {
        if total == 0 || self.start >= total {
            return None;
        }
        let end = self.end.unwrap_or(total - 1);
        if end < self.start || end >= total {
            return None;
        }
        Some(ByteRange {
            start: self.start,
            end,
            total,
        })
    }

    /// True for a request starting at the first byte.
    pub fn is_initial(&self) -> bool {
        self.start == 0
    }

    /// True when the request covers every byte of a `total` sized file.
    pub fn covers(&self, total: u64) -> bool {
        self.start == 0 && self.end.is_none_or(|end| end.saturating_add(1) >= total)
    }
}

/// Parses a `Range` header value.
///
/// # Examples
/// ```
/// use davstream_core::streaming::range::{RangeSpec, parse_range_header};
/// assert_eq!(
///     parse_range_header("bytes=100-199"),
///     Some(RangeSpec { start: 100, end: Some(199) })
/// );
/// assert_eq!(parse_range_header("bytes=-500"), None);
/// ```
pub fn parse_range_header(value: &str) -> Option<RangeSpec> {
    let spec = value.trim().strip_prefix("bytes=")?.trim();
    if spec.contains(',') {
        return None;
    }

    let (start, end) = spec.split_once('-')?;
    let start = start.trim().parse::<u64>().ok()?;
    let end = match end.trim() {
        "" => None,
        end => Some(end.parse::<u64>().ok()?),
    };

    Some(RangeSpec { start, end })
}

/// A validated inclusive byte range within a file of `total` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ByteRange {
    /// The whole file; `None` for empty files which have no valid range.
    pub fn full(total: u64) -> Option<Self> {
        (total > 0).then(|| Self {
            start: 0,
            end: total - 1,
            total,
        })
    }

    /// Number of bytes in the range, never zero.
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_full(&self) -> bool {
        self.start == 0 && self.end + 1 == self.total
    }

    pub fn as_inclusive(&self) -> RangeInclusive<u64> {
        self.start..=self.end
    }

    /// `Content-Range` header value.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}
