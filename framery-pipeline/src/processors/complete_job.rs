use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use framery_core::data::{META_RESULT, META_TOKEN_USAGE};
use framery_core::{
    DataPatch, IoSpec, JobResult, JobStatus, JobStore, PipelineData, Processor, ProcessorContext,
    ProcessorError, ProgressUpdate,
};

use crate::processors::ids;

/// Derive the job result from the envelope.
///
/// Used by the terminal processor and as the service's fallback when
/// `metadata.result` is missing or malformed.
pub fn derive_result(data: &PipelineData) -> JobResult {
    let variants_discovered = data
        .metadata
        .get("variantsDiscovered")
        .and_then(Value::as_u64)
        .map(|n| n as u32)
        .unwrap_or_else(|| {
            let distinct: HashSet<String> = data
                .frames
                .iter()
                .filter_map(|f| f.classification.as_ref())
                .map(|c| c.to_string())
                .collect();
            distinct.len() as u32
        });

    let final_frames: Vec<String> = data
        .final_frames()
        .into_iter()
        .filter_map(|f| f.remote_url.clone())
        .collect();

    let mut commercial_images: HashMap<String, HashMap<String, String>> = HashMap::new();
    for image in &data.commercial_images {
        if let Some(url) = &image.remote_url {
            commercial_images
                .entry(image.frame_id.clone())
                .or_default()
                .insert(image.version.clone(), url.clone());
        }
    }

    JobResult {
        variants_discovered,
        frames_analyzed: data.frames.len() as u32,
        final_frames,
        commercial_images,
    }
}

/// Terminal processor: records the result and finishes the job.
///
/// A failing row update (e.g. no row in test mode) is logged but never
/// fails the processor.
pub struct CompleteJobProcessor {
    store: Arc<dyn JobStore>,
}

impl CompleteJobProcessor {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Processor for CompleteJobProcessor {
    fn id(&self) -> &str {
        ids::COMPLETE_JOB
    }

    fn display_name(&self) -> &str {
        "Complete job"
    }

    fn status_key(&self) -> JobStatus {
        JobStatus::Completed
    }

    fn io(&self) -> IoSpec {
        IoSpec::new([], [])
    }

    async fn execute(
        &self,
        ctx: &ProcessorContext,
        data: &PipelineData,
        _options: Option<&Value>,
    ) -> Result<DataPatch, ProcessorError> {
        let result = derive_result(data);

        if let Err(err) = self.store.complete(ctx.job_id(), result.clone()).await {
            warn!(
                job_id = %ctx.job_id(),
                error = %err,
                "job row completion update failed"
            );
        }

        info!(
            job_id = %ctx.job_id(),
            frames = result.frames_analyzed,
            final_frames = result.final_frames.len(),
            "job completed"
        );
        ctx.report_progress(
            ProgressUpdate::new(JobStatus::Completed, 100).with_message("job completed"),
        );

        let mut patch = DataPatch::empty().with_metadata_entry(
            META_RESULT,
            serde_json::to_value(&result)
                .map_err(|err| ProcessorError::new(err.to_string()))?,
        );
        if !ctx.usage.is_empty() {
            patch = patch.with_metadata_entry(
                META_TOKEN_USAGE,
                serde_json::to_value(ctx.usage.summary())
                    .map_err(|err| ProcessorError::new(err.to_string()))?,
            );
        }
        Ok(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framery_core::{Frame, JobRecord, MemoryJobStore, WorkDirs};
    use serde_json::json;

    #[test]
    fn derive_result_counts_and_collects() {
        let mut data = PipelineData::default();
        for index in 0..4 {
            let mut frame = Frame::new(format!("/tmp/f{index}.jpg"), index as f64);
            if index < 2 {
                frame.is_final_selection = true;
                frame.remote_url = Some(format!("https://blobs.test/jobs/j1/frames/f{index}.jpg"));
            }
            frame.classification = Some(json!({"variant": index % 2}));
            data.frames.push(frame);
        }

        let result = derive_result(&data);
        assert_eq!(result.frames_analyzed, 4);
        assert_eq!(result.final_frames.len(), 2);
        assert_eq!(result.variants_discovered, 2);
        assert!(result.commercial_images.is_empty());
    }

    #[tokio::test]
    async fn completes_the_job_row_and_writes_result_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = WorkDirs::layout(tmp.path(), "framery", "j1");
        let store = Arc::new(MemoryJobStore::new());
        store
            .insert(JobRecord::new("j1", "s3://b/uploads/v.mp4"))
            .await
            .unwrap();

        let ctx = ProcessorContext::for_job(JobRecord::new("j1", "s3://b/uploads/v.mp4"), dirs);
        let processor = CompleteJobProcessor::new(store.clone());
        let patch = processor
            .execute(&ctx, &PipelineData::default(), None)
            .await
            .unwrap();

        assert!(patch.metadata.unwrap().contains_key(META_RESULT));
        let job = store.get("j1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.result.is_some());
    }

    #[tokio::test]
    async fn missing_row_is_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = WorkDirs::layout(tmp.path(), "framery", "j1");
        let ctx = ProcessorContext::for_job(JobRecord::new("j1", "s3://b/uploads/v.mp4"), dirs);

        let processor = CompleteJobProcessor::new(Arc::new(MemoryJobStore::new()));
        let patch = processor
            .execute(&ctx, &PipelineData::default(), None)
            .await
            .unwrap();
        assert!(patch.metadata.is_some());
    }
}
