use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use framery_core::{
    parallel_map, resolve_concurrency, ConcurrencyKind, DataPatch, IoSpec, IoTag, JobStatus,
    PipelineData, Processor, ProcessorContext, ProcessorError, ProgressUpdate,
};

use crate::processors::ids;
use crate::progress;
use crate::providers::FrameClassifier;

/// Attaches classification attributes to frames with bounded fan-out.
pub struct ClassifyFramesProcessor {
    classifier: Arc<dyn FrameClassifier>,
}

impl ClassifyFramesProcessor {
    pub fn new(classifier: Arc<dyn FrameClassifier>) -> Self {
        Self { classifier }
    }
}

#[async_trait]
impl Processor for ClassifyFramesProcessor {
    fn id(&self) -> &str {
        ids::CLASSIFY_FRAMES
    }

    fn display_name(&self) -> &str {
        "Classify frames"
    }

    fn status_key(&self) -> JobStatus {
        JobStatus::Classifying
    }

    fn io(&self) -> IoSpec {
        IoSpec::new([IoTag::Images], [IoTag::FrameClassifications])
    }

    async fn execute(
        &self,
        ctx: &ProcessorContext,
        data: &PipelineData,
        options: Option<&Value>,
    ) -> Result<DataPatch, ProcessorError> {
        if data.frames.is_empty() {
            return Ok(DataPatch::empty());
        }
        if ctx.is_cancelled() {
            return Err(ProcessorError::new("cancelled"));
        }

        let concurrency = resolve_concurrency(ConcurrencyKind::Classification, options);
        let total = data.frames.len();
        let completed = AtomicUsize::new(0);

        let results = parallel_map(data.frames.clone(), concurrency, |frame, _| {
            let classifier = self.classifier.clone();
            let completed = &completed;
            async move {
                let token = ctx.timer.begin_operation("provider-call", Some("classify"));
                let classification = classifier.classify(ctx, &frame).await;
                ctx.timer.end_operation(token);

                let done = completed.fetch_add(1, Ordering::SeqCst);
                ctx.report_progress(ProgressUpdate::new(
                    JobStatus::Classifying,
                    progress::CLASSIFY.at(done, total),
                ));
                classification
            }
        })
        .await;

        let mut frames = data.frames.clone();
        let mut failures = 0usize;
        for (frame, result) in frames.iter_mut().zip(results) {
            match result {
                Ok(classification) => frame.classification = classification,
                Err(err) => {
                    failures += 1;
                    warn!(job_id = %ctx.job_id(), frame = %frame.id, error = %err, "frame classification failed");
                }
            }
        }

        if failures == total {
            return Err(ProcessorError::new("classification failed for every frame"));
        }

        Ok(DataPatch::empty().with_frames(frames))
    }
}
