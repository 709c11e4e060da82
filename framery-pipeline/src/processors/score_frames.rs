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
use crate::providers::FrameScorer;

/// Scores every frame with bounded fan-out.
///
/// Per-frame provider errors leave that frame unscored; the step only
/// fails when every frame errored.
pub struct ScoreFramesProcessor {
    scorer: Arc<dyn FrameScorer>,
}

impl ScoreFramesProcessor {
    pub fn new(scorer: Arc<dyn FrameScorer>) -> Self {
        Self { scorer }
    }
}

#[async_trait]
impl Processor for ScoreFramesProcessor {
    fn id(&self) -> &str {
        ids::SCORE_FRAMES
    }

    fn display_name(&self) -> &str {
        "Score frames"
    }

    fn status_key(&self) -> JobStatus {
        JobStatus::Scoring
    }

    fn io(&self) -> IoSpec {
        IoSpec::new([IoTag::Images], [IoTag::FrameScores])
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

        let concurrency = resolve_concurrency(ConcurrencyKind::Scoring, options);
        let total = data.frames.len();
        let completed = AtomicUsize::new(0);

        let results = parallel_map(data.frames.clone(), concurrency, |frame, _| {
            let scorer = self.scorer.clone();
            let completed = &completed;
            async move {
                let token = ctx.timer.begin_operation("provider-call", Some("score"));
                let score = scorer.score(ctx, &frame).await;
                ctx.timer.end_operation(token);

                let done = completed.fetch_add(1, Ordering::SeqCst);
                ctx.report_progress(ProgressUpdate::new(
                    JobStatus::Scoring,
                    progress::SCORE_FRAMES.at(done, total),
                ));
                score
            }
        })
        .await;

        let mut frames = data.frames.clone();
        let mut failures = 0usize;
        for (frame, result) in frames.iter_mut().zip(results) {
            match result {
                Ok(score) => frame.score = score,
                Err(err) => {
                    failures += 1;
                    warn!(job_id = %ctx.job_id(), frame = %frame.id, error = %err, "frame scoring failed");
                }
            }
        }

        if failures == total {
            return Err(ProcessorError::new("scoring failed for every frame"));
        }

        Ok(DataPatch::empty().with_frames(frames))
    }
}
