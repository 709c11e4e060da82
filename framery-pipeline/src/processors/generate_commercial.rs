use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

use framery_blob::{keys, BlobStore};
use framery_core::data::META_COMMERCIAL_URLS;
use framery_core::{
    parallel_map, partition_results, resolve_concurrency, CommercialImage, ConcurrencyKind,
    DataPatch, Frame, IoSpec, IoTag, JobStatus, PipelineData, Processor, ProcessorContext,
    ProcessorError, ProgressUpdate,
};

use crate::processors::{content_type_for, ids};
use crate::progress;
use crate::providers::CommercialRenderer;

/// Default commercial versions when the job config names none.
pub const DEFAULT_VERSIONS: &[&str] = &["square", "landscape"];

/// Renders commercial versions of each final frame and uploads them.
pub struct GenerateCommercialProcessor {
    renderer: Arc<dyn CommercialRenderer>,
    blobs: Arc<dyn BlobStore>,
}

impl GenerateCommercialProcessor {
    pub fn new(renderer: Arc<dyn CommercialRenderer>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { renderer, blobs }
    }
}

#[async_trait]
impl Processor for GenerateCommercialProcessor {
    fn id(&self) -> &str {
        ids::GENERATE_COMMERCIAL
    }

    fn display_name(&self) -> &str {
        "Generate commercial images"
    }

    fn status_key(&self) -> JobStatus {
        JobStatus::Generating
    }

    fn io(&self) -> IoSpec {
        IoSpec::new([IoTag::Frames], [IoTag::CommercialImages])
    }

    async fn execute(
        &self,
        ctx: &ProcessorContext,
        data: &PipelineData,
        options: Option<&Value>,
    ) -> Result<DataPatch, ProcessorError> {
        let versions: Vec<String> = ctx
            .config
            .commercial_versions
            .clone()
            .unwrap_or_else(|| DEFAULT_VERSIONS.iter().map(|v| v.to_string()).collect());

        let pairs: Vec<(Frame, String)> = data
            .final_frames()
            .into_iter()
            .flat_map(|frame| {
                versions
                    .iter()
                    .map(move |version| (frame.clone(), version.clone()))
            })
            .collect();
        if pairs.is_empty() {
            return Ok(DataPatch::empty());
        }
        if ctx.is_cancelled() {
            return Err(ProcessorError::new("cancelled"));
        }

        let concurrency = resolve_concurrency(ConcurrencyKind::Generation, options);
        let total = pairs.len();
        let completed = AtomicUsize::new(0);

        let results = parallel_map(pairs, concurrency, |(frame, version), _| {
            let renderer = self.renderer.clone();
            let blobs = self.blobs.clone();
            let completed = &completed;
            async move {
                let token = ctx
                    .timer
                    .begin_operation("provider-call", Some("commercial-render"));
                let rendered = renderer
                    .render(ctx, &frame, &version, &ctx.dirs.commercial)
                    .await;
                ctx.timer.end_operation(token);

                let done = completed.fetch_add(1, Ordering::SeqCst);
                ctx.report_progress(ProgressUpdate::new(
                    JobStatus::Generating,
                    progress::GENERATE_COMMERCIAL.at(done, total),
                ));

                let Some(path) = rendered? else {
                    return Ok::<_, ProcessorError>(None);
                };
                let bytes = tokio::fs::read(&path).await.map_err(|err| {
                    ProcessorError::new(format!("reading {}: {err}", path.display()))
                })?;
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}-{version}.jpg", frame.id));
                let key = keys::commercial_key(ctx.job_id(), &file_name);

                let token = ctx.timer.begin_operation("blob-upload", Some(&key));
                let url = blobs
                    .put(&key, bytes.into(), content_type_for(&path))
                    .await
                    .map_err(|err| ProcessorError::new(format!("uploading {key}: {err}")))?;
                ctx.timer.end_operation(token);

                Ok(Some(CommercialImage {
                    frame_id: frame.id.clone(),
                    version,
                    path: Some(path),
                    remote_url: Some(url),
                }))
            }
        })
        .await;

        let (rendered, errors) = partition_results(results);
        for error in &errors {
            warn!(job_id = %ctx.job_id(), error = %error, "commercial render failed");
        }
        if rendered.iter().all(Option::is_none) && !errors.is_empty() {
            return Err(ProcessorError::new(
                "commercial rendering failed for every frame",
            ));
        }

        let images: Vec<CommercialImage> = rendered.into_iter().flatten().collect();
        if images.is_empty() {
            return Ok(DataPatch::empty());
        }

        let mut url_map: Map<String, Value> = Map::new();
        for image in &images {
            if let Some(url) = &image.remote_url {
                url_map
                    .entry(image.frame_id.clone())
                    .or_insert_with(|| Value::Object(Map::new()))
                    .as_object_mut()
                    .expect("entry is an object")
                    .insert(image.version.clone(), Value::String(url.clone()));
            }
        }

        Ok(DataPatch::empty()
            .with_commercial_images(images)
            .with_metadata_entry(META_COMMERCIAL_URLS, Value::Object(url_map)))
    }
}
