use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use framery_core::{
    parallel_map, resolve_concurrency, ConcurrencyKind, DataPatch, Frame, IoSpec, IoTag, JobStatus,
    PipelineData, Processor, ProcessorContext, ProcessorError, ProgressUpdate,
};

use crate::processors::ids;
use crate::progress;
use crate::providers::ProductExtractor;

/// Cuts the product out of each selected frame.
///
/// A successful cut-out replaces the frame's working image; failures
/// and unavailable providers keep the original.
pub struct ExtractProductProcessor {
    extractor: Arc<dyn ProductExtractor>,
}

impl ExtractProductProcessor {
    pub fn new(extractor: Arc<dyn ProductExtractor>) -> Self {
        Self { extractor }
    }

    fn targets(data: &PipelineData) -> Vec<(usize, Frame)> {
        let selected: Vec<(usize, Frame)> = data
            .frames
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_final_selection)
            .map(|(i, f)| (i, f.clone()))
            .collect();
        if selected.is_empty() {
            data.frames.iter().cloned().enumerate().collect()
        } else {
            selected
        }
    }
}

#[async_trait]
impl Processor for ExtractProductProcessor {
    fn id(&self) -> &str {
        ids::EXTRACT_PRODUCT
    }

    fn display_name(&self) -> &str {
        "Extract product"
    }

    fn status_key(&self) -> JobStatus {
        JobStatus::ExtractingProduct
    }

    fn io(&self) -> IoSpec {
        IoSpec::new([IoTag::Images], [IoTag::ProductImages])
    }

    async fn execute(
        &self,
        ctx: &ProcessorContext,
        data: &PipelineData,
        options: Option<&Value>,
    ) -> Result<DataPatch, ProcessorError> {
        let targets = Self::targets(data);
        if targets.is_empty() {
            return Ok(DataPatch::empty());
        }
        if ctx.is_cancelled() {
            return Err(ProcessorError::new("cancelled"));
        }

        let concurrency = resolve_concurrency(ConcurrencyKind::ProductExtraction, options);
        let total = targets.len();
        let completed = AtomicUsize::new(0);

        let results = parallel_map(targets.clone(), concurrency, |(index, frame), _| {
            let extractor = self.extractor.clone();
            let completed = &completed;
            async move {
                let token = ctx
                    .timer
                    .begin_operation("provider-call", Some("extract-product"));
                let outcome = extractor
                    .extract_product(ctx, &frame, &ctx.dirs.extracted)
                    .await;
                ctx.timer.end_operation(token);

                let done = completed.fetch_add(1, Ordering::SeqCst);
                ctx.report_progress(ProgressUpdate::new(
                    JobStatus::ExtractingProduct,
                    progress::EXTRACT_PRODUCT.at(done, total),
                ));
                outcome.map(|path| (index, path))
            }
        })
        .await;

        let mut frames = data.frames.clone();
        let mut failures = 0usize;
        for result in results {
            match result {
                Ok((index, Some(path))) => frames[index].path = path,
                Ok((_, None)) => {}
                Err(err) => {
                    failures += 1;
                    warn!(job_id = %ctx.job_id(), error = %err, "product extraction failed, keeping original");
                }
            }
        }

        if failures == total {
            return Err(ProcessorError::new(
                "product extraction failed for every frame",
            ));
        }

        Ok(DataPatch::empty().with_frames(frames))
    }
}
