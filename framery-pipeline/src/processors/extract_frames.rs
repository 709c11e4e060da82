use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use framery_core::{
    DataPatch, Frame, IoSpec, IoTag, JobStatus, PipelineData, Processor, ProcessorContext,
    ProcessorError,
};

use crate::processors::ids;
use crate::progress;
use crate::providers::FrameExtractor;

/// Turns the downloaded video into the envelope's frame spine.
///
/// The actual extraction (ffmpeg, scene detection) is the provider's
/// business; this processor owns the spine entries and their flags.
pub struct ExtractFramesProcessor {
    extractor: Arc<dyn FrameExtractor>,
}

impl ExtractFramesProcessor {
    pub fn new(extractor: Arc<dyn FrameExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl Processor for ExtractFramesProcessor {
    fn id(&self) -> &str {
        ids::EXTRACT_FRAMES
    }

    fn display_name(&self) -> &str {
        "Extract frames"
    }

    fn status_key(&self) -> JobStatus {
        JobStatus::ExtractingFrames
    }

    fn io(&self) -> IoSpec {
        IoSpec::new([IoTag::Video], [IoTag::Frames, IoTag::Images])
    }

    async fn execute(
        &self,
        ctx: &ProcessorContext,
        data: &PipelineData,
        _options: Option<&Value>,
    ) -> Result<DataPatch, ProcessorError> {
        let video = data
            .video
            .as_ref()
            .ok_or_else(|| ProcessorError::new("no video source on the envelope"))?;
        let path = video
            .local_path
            .as_ref()
            .ok_or_else(|| ProcessorError::new("video has not been downloaded"))?;

        if ctx.is_cancelled() {
            return Err(ProcessorError::new("cancelled"));
        }

        let extracted = self
            .extractor
            .extract(ctx, path, &ctx.dirs.frames)
            .await?;

        let frames: Vec<Frame> = extracted
            .into_iter()
            .map(|e| {
                let mut frame = Frame::new(e.path, e.timestamp_secs);
                frame.is_best_per_second = e.is_best_per_second;
                frame
            })
            .collect();

        info!(
            job_id = %ctx.job_id(),
            frames = frames.len(),
            "frames extracted"
        );
        ctx.report_progress(
            framery_core::ProgressUpdate::new(
                JobStatus::ExtractingFrames,
                progress::EXTRACT_FRAMES.end,
            )
            .with_message(format!("{} frames extracted", frames.len())),
        );

        Ok(DataPatch::empty().with_frames(frames))
    }
}
