//! Status and header assembly for media responses.

use axum::http::header::{
    ACCEPT_RANGES, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE,
    CONTENT_TYPE,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use super::media_info::{MediaCategory, is_hls};
use super::range::{ByteRange, RangeSpec};

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Status, headers and the byte range the body must carry.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Bytes of the source to send; `None` for an empty file.
    pub range: Option<ByteRange>,
}

impl ResponseHead {
    pub fn is_partial(&self) -> bool {
        self.status == StatusCode::PARTIAL_CONTENT
    }
}

/// Describes the file being served, independent of the requested range.
#[derive(Debug, Clone, Copy)]
pub struct ContentMeta<'a> {
    pub mime_type: &'a str,
    pub file_name: &'a str,
    pub category: MediaCategory,
    pub format: &'a str,
    pub is_download: bool,
}

/// Builds HTTP response heads following byte range semantics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseAssembler;

impl ResponseAssembler {
    /// Head for a raw or cached body of known size.
    ///
    /// `request` is the range the client sent; `resolved` is the same range
    /// after the planner filled an open end. A satisfiable resolved range
    /// yields 206, anything else downgrades to 200 over the whole file.
    pub fn build(
        request: Option<RangeSpec>,
        resolved: Option<RangeSpec>,
        file_size: u64,
        meta: ContentMeta<'_>,
    ) -> ResponseHead {
        let mut headers = base_headers(meta);

        let partial = request
            .and(resolved.or(request))
            .and_then(|spec| spec.resolve(file_size));

        if let Some(range) = partial {
            insert_header(&mut headers, CONTENT_RANGE, &range.content_range());
            headers.insert(CONTENT_LENGTH, HeaderValue::from(range.length()));
            return ResponseHead {
                status: StatusCode::PARTIAL_CONTENT,
                headers,
                range: Some(range),
            };
        }

        if request.is_some() {
            tracing::debug!(?request, file_size, "Unsatisfiable range, serving full content");
        }

        headers.insert(CONTENT_LENGTH, HeaderValue::from(file_size));
        ResponseHead {
            status: StatusCode::OK,
            headers,
            range: ByteRange::full(file_size),
        }
    }

    /// Head for a transformed body, always 200.
    ///
    /// Without a known length the body is streamed without `Content-Length`
    /// and proxies are asked not to buffer it.
    pub fn build_transformed(length: Option<u64>, meta: ContentMeta<'_>) -> ResponseHead {
        let mut headers = base_headers(meta);
        match length {
            Some(length) => {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
            }
            None => {
                headers.insert(X_ACCEL_BUFFERING, HeaderValue::from_static("no"));
            }
        }

        ResponseHead {
            status: StatusCode::OK,
            headers,
            range: None,
        }
    }
}

fn base_headers(meta: ContentMeta<'_>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_str(meta.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static(cache_control(meta.category, meta.format)),
    );
    insert_header(
        &mut headers,
        CONTENT_DISPOSITION,
        &content_disposition(meta.file_name, meta.is_download),
    );
    headers
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// `Cache-Control` value for a media category and container format.
pub fn cache_control(category: MediaCategory, format: &str) -> &'static str {
    match category {
        MediaCategory::Image => "public, max-age=86400",
        MediaCategory::Audio => "public, max-age=3600",
        MediaCategory::Video if is_hls(format) => "public, max-age=86400, immutable",
        MediaCategory::Video if matches!(format, "mp4" | "webm") => "public, max-age=3600",
        MediaCategory::Video => "public, max-age=1800",
        MediaCategory::Text | MediaCategory::Other => "no-cache",
    }
}

/// `Content-Disposition` value with an RFC 5987 encoded file name.
pub fn content_disposition(file_name: &str, is_download: bool) -> String {
    let disposition = if is_download { "attachment" } else { "inline" };
    format!(
        "{disposition}; filename*=UTF-8''{}",
        urlencoding::encode(file_name)
    )
}
