//! WebDAV implementation of the remote store.
//!
//! Metadata comes from PROPFIND multistatus replies, reads are ranged GETs
//! streamed straight from the response body.

use std::ops::RangeInclusive;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, HeaderValue, RANGE};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use url::Url;

use super::{
    ByteStream, RemoteEntry, RemoteError, RemoteFileRef, RemoteResult, RemoteStore,
    normalize_path, window_stream,
};
use crate::config::RemoteConfig;

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:getcontentlength/>
    <d:getcontenttype/>
    <d:resourcetype/>
  </d:prop>
</d:propfind>"#;

/// WebDAV backed `RemoteStore`.
pub struct WebDavStore {
    client: Client,
    base_url: Url,
    credentials: Option<(String, Option<String>)>,
    config: RemoteConfig,
    parser: MultistatusParser,
}

impl WebDavStore {
    /// Creates a store rooted at `config.base_url`.
    ///
    /// # Errors
    ///
    /// - `RemoteError::Transport` - Base URL is malformed or the HTTP client cannot be built
    pub fn new(config: &RemoteConfig) -> RemoteResult<Self> {
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| RemoteError::Transport {
            reason: format!("invalid WebDAV base URL {base}: {e}"),
        })?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent)
            .build()?;

        let credentials = config
            .username
            .clone()
            .map(|user| (user, config.password.clone()));

        Ok(Self {
            client,
            base_url,
            credentials,
            config: config.clone(),
            parser: MultistatusParser::new()?,
        })
    }

    /// Resolves a store relative path to an absolute URL, percent encoding each segment.
    pub fn url_for(&self, path: &str, collection: bool) -> RemoteResult<Url> {
        let normalized = normalize_path(path)?;
        let mut encoded = normalized
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if collection && !encoded.is_empty() {
            encoded.push('/');
        }

        self.base_url
            .join(&encoded)
            .map_err(|e| RemoteError::Transport {
                reason: format!("cannot resolve {path}: {e}"),
            })
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, password.as_ref()),
            None => builder,
        }
    }

    async fn propfind(&self, path: &str, depth: &'static str, collection: bool) -> RemoteResult<String> {
        let method = Method::from_bytes(b"PROPFIND").map_err(|e| RemoteError::Transport {
            reason: e.to_string(),
        })?;
        let url = self.url_for(path, collection)?;

        let response = self
            .request(method, url)
            .header("Depth", depth)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/xml"))
            .body(PROPFIND_BODY)
            .timeout(self.config.request_timeout)
            .send()
            .await?;

        let status = response.status();
        check_status(status, path)?;
        Ok(response.text().await?)
    }
}

/// Maps HTTP status codes onto remote errors.
fn check_status(status: StatusCode, path: &str) -> RemoteResult<()> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::NOT_FOUND => Err(RemoteError::NotFound {
            path: path.to_string(),
        }),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::Auth {
            status: status.as_u16(),
        }),
        other => Err(RemoteError::Transport {
            reason: format!("unexpected HTTP status {other} for {path}"),
        }),
    }
}

#[async_trait]
impl RemoteStore for WebDavStore {
    async fn stat(&self, path: &str) -> RemoteResult<RemoteFileRef> {
        let normalized = normalize_path(path)?;
        let body = self.propfind(&normalized, "0", false).await?;
        let entries = self.parser.parse(&body, self.base_url.path());

        let entry = entries
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::Transport {
                reason: format!("empty multistatus reply for {normalized}"),
            })?;

        if entry.is_dir {
            return Err(RemoteError::InvalidPath { path: normalized });
        }

        Ok(RemoteFileRef {
            path: normalized,
            size: entry.size,
            mime_hint: entry.mime_hint,
        })
    }

    async fn read_stream(&self, path: &str, range: RangeInclusive<u64>) -> RemoteResult<ByteStream> {
        let (start, end) = (*range.start(), *range.end());
        let length = end.saturating_sub(start) + 1;
        let url = self.url_for(path, false)?;

        tracing::debug!(path, start, end, "Opening ranged WebDAV read");

        let response = self
            .request(Method::GET, url)
            .header(RANGE, format!("bytes={start}-{end}"))
            .send()
            .await?;

        let status = response.status();
        check_status(status, path)?;

        // Servers that ignore Range reply 200 with the whole file
        let skip = if status == StatusCode::PARTIAL_CONTENT {
            0
        } else {
            tracing::debug!(path, %status, "Server ignored range header, trimming locally");
            start
        };

        let body: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(RemoteError::from)),
        );
        Ok(window_stream(body, skip, length))
    }

    async fn list(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        let normalized = normalize_path(path)?;
        let body = self.propfind(&normalized, "1", true).await?;

        Ok(self
            .parser
            .parse(&body, self.base_url.path())
            .into_iter()
            .filter(|entry| entry.path != normalized)
            .collect())
    }

    async fn write(&self, path: &str, data: Bytes) -> RemoteResult<()> {
        let url = self.url_for(path, false)?;
        let response = self
            .request(Method::PUT, url)
            .body(data)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        check_status(response.status(), path)
    }

    async fn delete(&self, path: &str) -> RemoteResult<()> {
        let url = self.url_for(path, false)?;
        let response = self
            .request(Method::DELETE, url)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        check_status(response.status(), path)
    }
}

/// Extracts entries from a `DAV:` multistatus document.
///
/// Namespace prefixes vary between servers (`d:`, `D:`, `lp1:`, none), so
/// the patterns accept any prefix.
struct MultistatusParser {
    response: Regex,
    href: Regex,
    content_length: Regex,
    content_type: Regex,
    collection: Regex,
}

impl MultistatusParser {
    fn new() -> RemoteResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| RemoteError::Transport {
                reason: format!("invalid multistatus pattern: {e}"),
            })
        };

        Ok(Self {
            response: compile(r"(?s)<(?:\w+:)?response\b[^>]*>(.*?)</(?:\w+:)?response>")?,
            href: compile(r"(?s)<(?:\w+:)?href\b[^>]*>\s*([^<]*?)\s*</(?:\w+:)?href>")?,
            content_length: compile(
                r"(?s)<(?:\w+:)?getcontentlength\b[^>]*>\s*(\d+)\s*</(?:\w+:)?getcontentlength>",
            )?,
            content_type: compile(
                r"(?s)<(?:\w+:)?getcontenttype\b[^>]*>\s*([^<]*?)\s*</(?:\w+:)?getcontenttype>",
            )?,
            collection: compile(r"<(?:\w+:)?collection\b")?,
        })
    }

    fn parse(&self, body: &str, base_path: &str) -> Vec<RemoteEntry> {
        self.response
            .captures_iter(body)
            .filter_map(|response| {
                let block = response.get(1)?.as_str();
                let href = self.href.captures(block)?.get(1)?.as_str();
                let path = relative_path(href, base_path)?;

                let is_dir = self.collection.is_match(block);
                let size = self
                    .content_length
                    .captures(block)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse::<u64>().ok())
                    .unwrap_or(0);
                let mime_hint = self
                    .content_type
                    .captures(block)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| {
                        mime_guess::from_path(&path)
                            .first_or_octet_stream()
                            .to_string()
                    });

                Some(RemoteEntry {
                    path,
                    size,
                    is_dir,
                    mime_hint,
                })
            })
            .collect()
    }
}

/// Converts an href from a multistatus reply to a store relative path.
fn relative_path(href: &str, base_path: &str) -> Option<String> {
    let href_path = if href.starts_with("http://") || href.starts_with("https://") {
        Url::parse(href).ok()?.path().to_string()
    } else {
        href.to_string()
    };

    let decoded = urlencoding::decode(&href_path).ok()?;
    let base = urlencoding::decode(base_path).ok()?;
    let relative = decoded
        .strip_prefix(base.as_ref())
        .or_else(|| decoded.strip_prefix(base.trim_end_matches('/')))
        .unwrap_or(&decoded);

    Some(relative.trim_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTISTATUS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/dav/media/</d:href>
    <d:propstat>
      <d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/dav/media/Holiday%20Clip.mp4</d:href>
    <d:propstat>
      <d:prop>
        <d:getcontentlength>52428800</d:getcontentlength>
        <d:getcontenttype>video/mp4</d:getcontenttype>
        <d:resourcetype/>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>http://dav.local/dav/media/notes.txt</d:href>
    <d:propstat>
      <d:prop><d:getcontentlength>42</d:getcontentlength><d:resourcetype/></d:prop>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

    fn store() -> WebDavStore {
        let config = RemoteConfig {
            base_url: "http://dav.local/dav".to_string(),
            ..RemoteConfig::default()
        };
        WebDavStore::new(&config).unwrap()
    }

    #[test]
    fn test_parse_multistatus_entries() {
        let parser = MultistatusParser::new().unwrap();
        let entries = parser.parse(MULTISTATUS, "/dav/");

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].path, "media");
        assert!(entries[0].is_dir);

        assert_eq!(entries[1].path, "media/Holiday Clip.mp4");
        assert_eq!(entries[1].size, 52_428_800);
        assert_eq!(entries[1].mime_hint, "video/mp4");
        assert!(!entries[1].is_dir);

        // Missing content type falls back to the extension
        assert_eq!(entries[2].path, "media/notes.txt");
        assert_eq!(entries[2].size, 42);
        assert_eq!(entries[2].mime_hint, "text/plain");
    }

    #[test]
    fn test_parse_accepts_uppercase_namespace_prefix() {
        let body = r#"<D:multistatus xmlns:D="DAV:"><D:response><D:href>/a.txt</D:href>
            <D:propstat><D:prop><D:getcontentlength>7</D:getcontentlength></D:prop></D:propstat>
            </D:response></D:multistatus>"#;
        let parser = MultistatusParser::new().unwrap();
        let entries = parser.parse(body, "/");

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "a.txt");
        assert_eq!(entries[0].size, 7);
    }

    #[test]
    fn test_url_for_encodes_segments() {
        let store = store();

        let url = store.url_for("/media/Holiday Clip.mp4", false).unwrap();
        assert_eq!(url.as_str(), "http://dav.local/dav/media/Holiday%20Clip.mp4");

        let url = store.url_for("media", true).unwrap();
        assert_eq!(url.as_str(), "http://dav.local/dav/media/");

        assert!(store.url_for("../secret", false).is_err());
    }

    #[test]
    fn test_check_status_mapping() {
        assert!(check_status(StatusCode::PARTIAL_CONTENT, "a").is_ok());
        assert_eq!(
            check_status(StatusCode::NOT_FOUND, "a"),
            Err(RemoteError::NotFound {
                path: "a".to_string()
            })
        );
        assert_eq!(
            check_status(StatusCode::FORBIDDEN, "a"),
            Err(RemoteError::Auth { status: 403 })
        );
        assert!(matches!(
            check_status(StatusCode::BAD_GATEWAY, "a"),
            Err(RemoteError::Transport { .. })
        ));
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let config = RemoteConfig {
            base_url: "not a url".to_string(),
            ..RemoteConfig::default()
        };
        assert!(WebDavStore::new(&config).is_err());
    }
}
