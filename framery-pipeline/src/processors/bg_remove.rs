use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use framery_core::{
    parallel_map, resolve_concurrency, ConcurrencyKind, DataPatch, Frame, IoSpec, IoTag, JobStatus,
    PipelineData, Processor, ProcessorContext, ProcessorError,
};

use crate::processors::ids;
use crate::providers::BackgroundRemover;

/// Background removal over the working frame set.
///
/// Two registered instances (`photoroom-bg-remove`, `claid-bg-remove`)
/// share this shape and are swappable by construction. A frame whose
/// removal fails or whose provider is unavailable keeps its original
/// image, so every frame still has a usable path on success; the step
/// only fails when every frame errored.
pub struct BgRemoveProcessor {
    id: &'static str,
    display_name: &'static str,
    remover: Arc<dyn BackgroundRemover>,
}

impl BgRemoveProcessor {
    pub fn photoroom(remover: Arc<dyn BackgroundRemover>) -> Self {
        Self {
            id: ids::PHOTOROOM_BG_REMOVE,
            display_name: "Remove background (Photoroom)",
            remover,
        }
    }

    pub fn claid(remover: Arc<dyn BackgroundRemover>) -> Self {
        Self {
            id: ids::CLAID_BG_REMOVE,
            display_name: "Remove background (Claid)",
            remover,
        }
    }

    /// The final selection when one exists, otherwise every frame.
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
impl Processor for BgRemoveProcessor {
    fn id(&self) -> &str {
        self.id
    }

    fn display_name(&self) -> &str {
        self.display_name
    }

    fn status_key(&self) -> JobStatus {
        JobStatus::Processing
    }

    fn io(&self) -> IoSpec {
        IoSpec::new([IoTag::Images], [IoTag::Images])
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

        let concurrency = resolve_concurrency(ConcurrencyKind::BackgroundRemoval, options);
        let results = parallel_map(targets.clone(), concurrency, |(index, frame), _| {
            let remover = self.remover.clone();
            async move {
                let token = ctx
                    .timer
                    .begin_operation("provider-call", Some("bg-remove"));
                let outcome = remover
                    .remove_background(ctx, &frame, &ctx.dirs.candidates)
                    .await;
                ctx.timer.end_operation(token);
                outcome.map(|path| (index, path))
            }
        })
        .await;

        let mut frames = data.frames.clone();
        let mut failures = 0usize;
        for result in results {
            match result {
                Ok((index, Some(path))) => frames[index].path = path,
                Ok((_, None)) => {
                    debug!(job_id = %ctx.job_id(), processor = self.id, "provider unavailable, keeping original");
                }
                Err(err) => {
                    failures += 1;
                    warn!(job_id = %ctx.job_id(), error = %err, "background removal failed, keeping original");
                }
            }
        }

        if failures == targets.len() {
            return Err(ProcessorError::new(
                "background removal failed for every frame",
            ));
        }

        Ok(DataPatch::empty().with_frames(frames))
    }
}
