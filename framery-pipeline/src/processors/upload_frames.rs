use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use framery_blob::{keys, BlobStore};
use framery_core::{
    parallel_map, partition_results, resolve_concurrency, ConcurrencyKind, DataPatch, Frame,
    IoSpec, IoTag, JobStatus, JobStore, PipelineData, Processor, ProcessorContext, ProcessorError,
    ProgressUpdate,
};

use crate::processors::{content_type_for, ids};
use crate::progress;

/// Uploads the final frame selection and persists each remote URL on
/// the frame's row.
pub struct UploadFramesProcessor {
    blobs: Arc<dyn BlobStore>,
    store: Arc<dyn JobStore>,
}

impl UploadFramesProcessor {
    pub fn new(blobs: Arc<dyn BlobStore>, store: Arc<dyn JobStore>) -> Self {
        Self { blobs, store }
    }
}

#[async_trait]
impl Processor for UploadFramesProcessor {
    fn id(&self) -> &str {
        ids::UPLOAD_FRAMES
    }

    fn display_name(&self) -> &str {
        "Upload frames"
    }

    fn status_key(&self) -> JobStatus {
        JobStatus::Generating
    }

    fn io(&self) -> IoSpec {
        IoSpec::new([IoTag::Frames], [IoTag::Frames])
    }

    async fn execute(
        &self,
        ctx: &ProcessorContext,
        data: &PipelineData,
        options: Option<&Value>,
    ) -> Result<DataPatch, ProcessorError> {
        let selected: Vec<Frame> = data.final_frames().into_iter().cloned().collect();
        if selected.is_empty() {
            return Ok(DataPatch::empty());
        }
        if ctx.is_cancelled() {
            return Err(ProcessorError::new("cancelled"));
        }

        let concurrency = resolve_concurrency(ConcurrencyKind::Upload, options);
        let total = selected.len();
        let completed = AtomicUsize::new(0);

        let results = parallel_map(selected, concurrency, |frame, _| {
            let blobs = self.blobs.clone();
            let store = self.store.clone();
            let completed = &completed;
            async move {
                let file_name = frame
                    .path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}.jpg", frame.id));

                let bytes = tokio::fs::read(&frame.path).await.map_err(|err| {
                    ProcessorError::new(format!("reading {}: {err}", frame.path.display()))
                })?;

                let key = keys::frame_key(ctx.job_id(), &file_name);
                let token = ctx.timer.begin_operation("blob-upload", Some(&key));
                let url = blobs
                    .put(&key, bytes.into(), content_type_for(&frame.path))
                    .await
                    .map_err(|err| ProcessorError::new(format!("uploading {key}: {err}")))?;
                ctx.timer.end_operation(token);

                if let Some(db_id) = &frame.db_id {
                    if let Err(err) = store.set_frame_url(db_id, &url).await {
                        warn!(job_id = %ctx.job_id(), frame = %frame.id, error = %err, "frame row update skipped");
                    }
                }

                let done = completed.fetch_add(1, Ordering::SeqCst);
                ctx.report_progress(
                    ProgressUpdate::new(JobStatus::Generating, progress::UPLOAD_FRAMES.at(done, total))
                        .with_message(format!("uploaded {file_name}")),
                );
                Ok::<_, ProcessorError>((frame.id.clone(), url))
            }
        })
        .await;

        let (uploaded, errors) = partition_results(results);
        if uploaded.is_empty() {
            let details: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            return Err(ProcessorError::new("uploading frames failed")
                .with_extensions(json!({ "failures": details })));
        }
        for error in &errors {
            warn!(job_id = %ctx.job_id(), error = %error, "frame upload failed");
        }

        let mut frames = data.frames.clone();
        for (frame_id, url) in uploaded {
            if let Some(frame) = frames.iter_mut().find(|f| f.id == frame_id) {
                frame.remote_url = Some(url);
            }
        }
        Ok(DataPatch::empty().with_frames(frames))
    }
}
