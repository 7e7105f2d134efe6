//! Drives one media request from metadata lookup to a streaming response.
//!
//! A request moves through `ResolvingMetadata -> PlanningRange ->
//! CacheLookup -> {CacheHit | SourceFetch} -> [Transforming] -> Responding`.
//! Transforms are optional: when one declines or fails for reasons other
//! than the source itself, the raw bytes are served instead.

use std::sync::Arc;

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use futures::{StreamExt, future, stream};

use super::{DeliveryError, DeliveryRequest, DeliveryState};
use crate::cache::{CacheKey, CacheKind, CacheStore, spawn_tee_sink};
use crate::config::DavstreamConfig;
use crate::remote::{RemoteFileRef, RemoteStore, normalize_path};
use crate::streaming::media_info::mime_for_path;
use crate::streaming::{
    ByteRange, ChunkPlanner, ContentMeta, MediaCategory, RangeSpec, RemoteStreamSource,
    ResponseAssembler, ResponseHead, TeeStream, categorize, parse_range_header,
};
use crate::transform::image::collect;
use crate::transform::{
    EncoderAvailability, ImagePreset, ImageTransform, OutputFormat, TextTransform,
    TransformError, VideoTier, VideoTransform, should_compress,
};

const OCTET_STREAM: &str = "application/octet-stream";

/// Transform chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    Raw,
    Image {
        preset: ImagePreset,
        target: OutputFormat,
    },
    Text,
    Video(VideoTier),
}

/// Everything known about a request before body bytes move.
#[derive(Debug)]
struct Plan {
    file: RemoteFileRef,
    category: MediaCategory,
    format: String,
    mime_type: String,
    requested: Option<RangeSpec>,
    chunk: u64,
    window: u64,
    download: bool,
}

impl Plan {
    fn path(&self) -> &str {
        &self.file.path
    }

    fn meta<'a>(&'a self, mime_type: &'a str, format: &'a str) -> ContentMeta<'a> {
        ContentMeta {
            mime_type,
            file_name: self.file.file_name(),
            category: self.category,
            format,
            is_download: self.download,
        }
    }

    fn raw_meta(&self) -> ContentMeta<'_> {
        self.meta(&self.mime_type, &self.format)
    }
}

/// Turns media requests into HTTP responses.
pub struct DeliveryOrchestrator {
    source: RemoteStreamSource,
    cache: Arc<CacheStore>,
    planner: ChunkPlanner,
    images: ImageTransform,
    videos: VideoTransform,
    text: TextTransform,
    text_max_size: u64,
    tee_capacity: usize,
}

impl DeliveryOrchestrator {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        cache: Arc<CacheStore>,
        availability: EncoderAvailability,
        config: &DavstreamConfig,
    ) -> Self {
        Self {
            source: RemoteStreamSource::new(store, config.source.clone()),
            cache,
            planner: ChunkPlanner::new(),
            images: ImageTransform::new(config.transform.image_skip_threshold),
            videos: VideoTransform::new(availability),
            text: TextTransform::new(config.transform.text_encoding.clone()),
            text_max_size: config.transform.text_max_size,
            tee_capacity: config.cache.tee_capacity,
        }
    }

    /// Replaces the remote reader, e.g. to attach a different observer.
    pub fn with_source(mut self, source: RemoteStreamSource) -> Self {
        self.source = source;
        self
    }

    pub fn encoder(&self) -> &EncoderAvailability {
        self.videos.availability()
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Serves `request`.
    ///
    /// Errors are returned only when no response body could be started;
    /// failures after that surface as a truncated body.
    ///
    /// # Errors
    ///
    /// - `DeliveryError::NotFound` - The file does not exist
    /// - `DeliveryError::Unauthorized` - The store rejected our credentials
    /// - `DeliveryError::Source` - The remote read failed after retries
    pub async fn deliver(&self, request: DeliveryRequest) -> Result<Response, DeliveryError> {
        let path = request.path.clone();
        match self.run(request).await {
            Ok(response) => {
                transition(&path, DeliveryState::Done);
                Ok(response)
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "Delivery failed");
                transition(&path, DeliveryState::Errored);
                Err(e)
            }
        }
    }

    async fn run(&self, request: DeliveryRequest) -> Result<Response, DeliveryError> {
        let path = normalize_path(&request.path)?;

        transition(&path, DeliveryState::ResolvingMetadata);
        let file = self.source.store().stat(&path).await?;

        transition(&path, DeliveryState::PlanningRange);
        let plan = self.plan(file, &request);
        let selection = self.select(&plan, &request);
        tracing::debug!(
            path,
            size = plan.file.size,
            category = ?plan.category,
            ?selection,
            chunk = plan.chunk,
            "Delivery planned"
        );

        match selection {
            Selection::Raw => self.serve_raw(&plan).await,
            Selection::Image { preset, target } => self.serve_image(&plan, preset, target).await,
            Selection::Text => self.serve_text(&plan).await,
            Selection::Video(tier) => self.serve_video(&plan, tier).await,
        }
    }

    fn plan(&self, file: RemoteFileRef, request: &DeliveryRequest) -> Plan {
        let category = categorize(&file.path, &file.mime_hint);
        let format = file.extension();
        let mime_type = content_type_of(&file);
        let requested = request.range.as_deref().and_then(parse_range_header);
        let is_initial = requested.is_none_or(|spec| spec.is_initial());

        let chunk = self
            .planner
            .plan(file.size, category, request.bandwidth, is_initial, &format);
        let window =
            self.planner
                .response_window(file.size, category, request.bandwidth, is_initial, &format);

        Plan {
            file,
            category,
            format,
            mime_type,
            requested,
            chunk,
            window,
            download: request.download,
        }
    }

    fn select(&self, plan: &Plan, request: &DeliveryRequest) -> Selection {
        let size = plan.file.size;
        if request.download || size == 0 {
            return Selection::Raw;
        }
        let whole_file = plan.requested.is_none_or(|spec| spec.covers(size));

        match plan.category {
            MediaCategory::Video
                if should_compress(&plan.format, size, request.quality, request.bandwidth) =>
            {
                Selection::Video(VideoTier::for_request(request.quality, request.bandwidth))
            }
            MediaCategory::Image if whole_file => {
                let Some(preset) = ImagePreset::for_request(request.quality, request.bandwidth)
                else {
                    return Selection::Raw;
                };
                let target = ImageTransform::target_format(&plan.format, request.format.as_deref());
                if self.images.passes_through(size, &plan.format, target) {
                    Selection::Raw
                } else {
                    Selection::Image { preset, target }
                }
            }
            MediaCategory::Text if whole_file => Selection::Text,
            _ => Selection::Raw,
        }
    }

    /// Stored bytes with range semantics.
    async fn serve_raw(&self, plan: &Plan) -> Result<Response, DeliveryError> {
        let size = plan.file.size;
        let resolved = plan.requested.map(|spec| spec.with_window(plan.window, size));
        let head = ResponseAssembler::build(plan.requested, resolved, size, plan.raw_meta());

        let body = match head.range {
            Some(range) => {
                transition(plan.path(), DeliveryState::SourceFetch);
                let stream = self
                    .source
                    .open_chunked(plan.path(), range.as_inclusive(), plan.chunk)
                    .await?;
                Body::from_stream(stream)
            }
            None => Body::empty(),
        };

        transition(plan.path(), DeliveryState::Responding);
        Ok(respond(head, body))
    }

    async fn serve_image(
        &self,
        plan: &Plan,
        preset: ImagePreset,
        target: OutputFormat,
    ) -> Result<Response, DeliveryError> {
        let path = plan.path();
        let key = CacheKey::new(CacheKind::Image, path, &preset.cache_params(target));

        transition(path, DeliveryState::CacheLookup);
        if let Some(data) = self.cache.get(&key).await {
            transition(path, DeliveryState::CacheHit);
            return Ok(respond_buffered(
                plan,
                target.content_type(),
                target.as_str(),
                data,
            ));
        }

        let Some(full) = ByteRange::full(plan.file.size) else {
            return self.serve_raw(plan).await;
        };
        transition(path, DeliveryState::SourceFetch);
        let stream = self
            .source
            .open_chunked(path, full.as_inclusive(), plan.chunk)
            .await?;
        let original = collect(stream).await?;

        transition(path, DeliveryState::Transforming);
        let optimized = self
            .images
            .optimize_bytes(original.clone(), &plan.format, target, preset)
            .await;

        match optimized {
            Ok(image) if image.transformed => {
                let cache = Arc::clone(&self.cache);
                let data = image.data.clone();
                tokio::spawn(async move { cache.put(&key, data).await });
                Ok(respond_buffered(
                    plan,
                    &image.content_type,
                    &image.format,
                    image.data,
                ))
            }
            Ok(image) => Ok(respond_buffered(plan, &plan.mime_type, &plan.format, image.data)),
            Err(e) => {
                tracing::warn!(path, error = %e, "Image optimization failed, serving original");
                Ok(respond_buffered(plan, &plan.mime_type, &plan.format, original))
            }
        }
    }

    async fn serve_text(&self, plan: &Plan) -> Result<Response, DeliveryError> {
        let path = plan.path();
        let max_size = self.text_max_size;
        let key = CacheKey::new(CacheKind::Text, path, &self.text.cache_params(max_size));
        let content_type = self.text.content_type();

        transition(path, DeliveryState::CacheLookup);
        if let Some(data) = self.cache.get(&key).await {
            transition(path, DeliveryState::CacheHit);
            return Ok(respond_buffered(plan, &content_type, &plan.format, data));
        }

        let size = plan.file.size;
        let Some(preview) = ByteRange::full(size.min(max_size.max(1))) else {
            return self.serve_raw(plan).await;
        };
        transition(path, DeliveryState::SourceFetch);
        let stream = self
            .source
            .open_chunked(path, preview.as_inclusive(), plan.chunk)
            .await?;

        transition(path, DeliveryState::Transforming);
        let prepared = self.text.prepare(stream, size, max_size);
        let (tee, receiver) = TeeStream::new(prepared.stream, self.tee_capacity);
        spawn_tee_sink(Arc::clone(&self.cache), key, receiver);

        let head = ResponseAssembler::build_transformed(
            None,
            plan.meta(&prepared.content_type, &plan.format),
        );
        transition(path, DeliveryState::Responding);
        Ok(respond(head, Body::from_stream(tee)))
    }

    async fn serve_video(&self, plan: &Plan, tier: VideoTier) -> Result<Response, DeliveryError> {
        let path = plan.path();
        let key = CacheKey::new(CacheKind::Video, path, &tier.cache_params());

        transition(path, DeliveryState::CacheLookup);
        if let Some(entry) = self.cache.open_entry(&key).await {
            transition(path, DeliveryState::CacheHit);
            let size = entry.size;
            let resolved = plan.requested.map(|spec| spec.with_window(plan.window, size));
            let head =
                ResponseAssembler::build(plan.requested, resolved, size, plan.meta("video/mp4", "mp4"));
            match entry.into_stream(head.range).await {
                Ok(stream) => {
                    transition(path, DeliveryState::Responding);
                    return Ok(respond(head, Body::from_stream(stream)));
                }
                Err(e) => {
                    tracing::warn!(path, error = %e, "Cached rendition unreadable, transcoding again");
                }
            }
        }

        let Some(full) = ByteRange::full(plan.file.size) else {
            return self.serve_raw(plan).await;
        };
        transition(path, DeliveryState::SourceFetch);
        let input = self
            .source
            .open_chunked(path, full.as_inclusive(), plan.chunk)
            .await?;

        transition(path, DeliveryState::Transforming);
        let output = match self.videos.transcode(input, tier, &plan.format, full) {
            Ok(output) => output,
            Err(e) => {
                tracing::info!(path, error = %e, "Transcoding not possible, serving original");
                return self.serve_raw(plan).await;
            }
        };

        // Wait for the first encoded bytes so an encoder that rejects the
        // input can still fall back to a raw response
        let mut encoded = output.stream;
        let first = match encoded.next().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(TransformError::Source(e))) => return Err(e.into()),
            Some(Err(e)) => {
                tracing::warn!(path, error = %e, "Encoder failed before output, serving original");
                return self.serve_raw(plan).await;
            }
            None => {
                tracing::warn!(path, "Encoder produced no output, serving original");
                return self.serve_raw(plan).await;
            }
        };

        let body = stream::once(future::ready(Ok::<Bytes, TransformError>(first)))
            .chain(encoded)
            .boxed();
        let (tee, receiver) = TeeStream::new(body, self.tee_capacity);
        spawn_tee_sink(Arc::clone(&self.cache), key, receiver);

        let head = ResponseAssembler::build_transformed(
            output.output_size,
            plan.meta(output.content_type, "mp4"),
        );
        transition(path, DeliveryState::Responding);
        Ok(respond(head, Body::from_stream(tee)))
    }
}

fn transition(path: &str, state: DeliveryState) {
    tracing::debug!(path, state = state.as_str(), "Delivery state");
}

/// Content type for a stored file: the extension wins, the store's hint
/// fills in for unknown extensions.
fn content_type_of(file: &RemoteFileRef) -> String {
    let guessed = mime_for_path(&file.path);
    if guessed == OCTET_STREAM && !file.mime_hint.is_empty() {
        file.mime_hint.clone()
    } else {
        guessed
    }
}

fn respond(head: ResponseHead, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = head.status;
    *response.headers_mut() = head.headers;
    response
}

/// Complete in-memory body, always 200.
fn respond_buffered(plan: &Plan, mime_type: &str, format: &str, data: Bytes) -> Response {
    let head = ResponseAssembler::build_transformed(Some(data.len() as u64), plan.meta(mime_type, format));
    transition(plan.path(), DeliveryState::Responding);
    respond(head, Body::from(data))
}
