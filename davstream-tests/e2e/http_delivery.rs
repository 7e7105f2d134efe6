//! HTTP delivery through the real router and a WebDAV backend.

use std::sync::Arc;

use davstream_core::testing::patterned_bytes;
use davstream_core::{
    CacheStore, DavstreamConfig, DeliveryOrchestrator, EncoderAvailability, RemoteStore,
    WebDavStore,
};
use davstream_web::{AppState, build_router};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use tempfile::TempDir;
use tokio::task::JoinHandle;

use crate::dav_server::{DavServer, serve};

/// davstream listening on loopback in front of a [`DavServer`].
struct Harness {
    dav: DavServer,
    base: String,
    client: reqwest::Client,
    task: JoinHandle<()>,
    _dir: TempDir,
}

impl Harness {
    async fn start() -> Self {
        let dav = DavServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let mut config = DavstreamConfig::for_testing(dir.path().join("cache"));
        config.remote.base_url = dav.base_url.clone();
        let store: Arc<dyn RemoteStore> = Arc::new(WebDavStore::new(&config.remote).unwrap());
        let cache = Arc::new(CacheStore::open(config.cache.clone()).await.unwrap());
        let availability = EncoderAvailability::Unavailable {
            reason: "disabled in tests".to_string(),
        };
        let orchestrator = DeliveryOrchestrator::new(store, cache, availability, &config);

        let (addr, task) = serve(build_router(AppState::new(orchestrator))).await;
        Self {
            dav,
            base: format!("http://{addr}"),
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
            task,
            _dir: dir,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(format!("{}{path}", self.base))
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[tokio::test]
async fn test_range_request_is_forwarded_as_exact_backend_range() {
    let harness = Harness::start().await;
    let data = patterned_bytes(3 * 1024 * 1024);
    harness.dav.insert("movies/clip.mp4", data.clone());

    let response = harness
        .get("/media/movies/clip.mp4?quality=original")
        .header(RANGE, "bytes=1000-1999")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[CONTENT_RANGE], "bytes 1000-1999/3145728");
    assert_eq!(response.headers()[CONTENT_LENGTH], "1000");
    assert_eq!(response.headers()[CONTENT_TYPE], "video/mp4");
    assert_eq!(&response.bytes().await.unwrap()[..], &data[1000..2000]);

    let requests = harness.dav.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, "PROPFIND");
    assert_eq!(requests[1].method, "GET");
    assert_eq!(requests[1].path, "movies/clip.mp4");
    assert_eq!(requests[1].range.as_deref(), Some("bytes=1000-1999"));
}

#[tokio::test]
async fn test_backend_ignoring_range_is_trimmed_locally() {
    let harness = Harness::start().await;
    let data = patterned_bytes(200_000);
    harness.dav.insert("norange/data.bin", data.clone());

    let response = harness
        .get("/media/norange/data.bin")
        .header(RANGE, "bytes=150000-150099")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(&response.bytes().await.unwrap()[..], &data[150_000..150_100]);
}

#[tokio::test]
async fn test_download_flag_sets_attachment_disposition() {
    let harness = Harness::start().await;
    harness.dav.insert("docs/report.txt", "quarterly numbers");

    let response = harness
        .get("/media/docs/report.txt?download=1")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[CONTENT_DISPOSITION],
        "attachment; filename*=UTF-8''report.txt"
    );
    assert_eq!(response.text().await.unwrap(), "quarterly numbers");
}

#[tokio::test]
async fn test_backend_errors_map_to_json_statuses() {
    let harness = Harness::start().await;
    harness.dav.insert("private/secret.mp4", "hidden");

    let missing = harness.get("/media/nothing/here.mp4").send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = missing.json().await.unwrap();
    assert_eq!(body["status"], 404);

    let denied = harness.get("/media/private/secret.mp4").send().await.unwrap();
    assert_eq!(denied.status(), StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = denied.json().await.unwrap();
    assert_eq!(body["status"], 502);
    assert_eq!(body["error"], "Storage backend refused access");
}

#[tokio::test]
async fn test_health_over_http() {
    let harness = Harness::start().await;

    let response = harness.get("/health").send().await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["encoder"]["available"], false);
    assert_eq!(body["encoder"]["reason"], "disabled in tests");
}
