//! Minimal WebDAV backend for end-to-end tests.
//!
//! Serves depth-0 PROPFIND and ranged GET for an in-memory file map.
//! Paths under `private/` answer 401 and paths under `norange/` ignore the
//! `Range` header, as some servers do.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One request as the backend saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavRequest {
    pub method: String,
    pub path: String,
    pub range: Option<String>,
}

#[derive(Clone, Default)]
struct DavState {
    files: Arc<Mutex<HashMap<String, Bytes>>>,
    log: Arc<Mutex<Vec<DavRequest>>>,
}

pub struct DavServer {
    pub base_url: String,
    state: DavState,
    task: JoinHandle<()>,
}

impl DavServer {
    pub async fn start() -> Self {
        let state = DavState::default();
        let router = Router::new().fallback(handle).with_state(state.clone());
        let (addr, task) = serve(router).await;
        Self {
            base_url: format!("http://{addr}/dav/"),
            state,
            task,
        }
    }

    pub fn insert(&self, path: &str, data: impl Into<Bytes>) {
        self.state
            .files
            .lock()
            .unwrap()
            .insert(path.to_string(), data.into());
    }

    pub fn requests(&self) -> Vec<DavRequest> {
        self.state.log.lock().unwrap().clone()
    }
}

impl Drop for DavServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Binds a loopback listener on an ephemeral port and serves `router`.
pub async fn serve(router: Router) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, task)
}

async fn handle(
    State(state): State<DavState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let Some(path) = uri.path().strip_prefix("/dav/") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let path = path.to_string();
    let range = headers
        .get(RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.log.lock().unwrap().push(DavRequest {
        method: method.as_str().to_string(),
        path: path.clone(),
        range: range.clone(),
    });

    if path.starts_with("private/") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let Some(data) = state.files.lock().unwrap().get(&path).cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match method.as_str() {
        "PROPFIND" => multistatus(&path, data.len()),
        "GET" if path.starts_with("norange/") => data.into_response(),
        "GET" => ranged(data, range.as_deref()),
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

fn multistatus(path: &str, size: usize) -> Response {
    let body = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/dav/{path}</d:href>
    <d:propstat>
      <d:prop>
        <d:getcontentlength>{size}</d:getcontentlength>
        <d:resourcetype/>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#
    );
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::MULTI_STATUS;
    response.headers_mut().insert(
        CONTENT_TYPE,
        "application/xml; charset=utf-8".parse().unwrap(),
    );
    response
}

fn ranged(data: Bytes, range: Option<&str>) -> Response {
    let Some((start, end)) = range
        .and_then(|r| r.strip_prefix("bytes="))
        .and_then(|r| r.split_once('-'))
        .and_then(|(s, e)| Some((s.parse::<usize>().ok()?, e.parse::<usize>().ok()?)))
        .filter(|(s, e)| s <= e && *e < data.len())
    else {
        return data.into_response();
    };

    let mut response = Response::new(Body::from(data.slice(start..=end)));
    *response.status_mut() = StatusCode::PARTIAL_CONTENT;
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_RANGE,
        format!("bytes {start}-{end}/{}", data.len()).parse().unwrap(),
    );
    headers.insert(CONTENT_LENGTH, (end - start + 1).into());
    response
}
