use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::context::ProcessorContext;
use crate::data::{DataPatch, PipelineData};
use crate::error::ProcessorError;
use crate::io::{IoSpec, IoTag};
use crate::job::JobStatus;

/// A unit of pipeline work.
///
/// Implementations are stateless across invocations: any two calls to
/// `execute` must not observe each other through the processor value.
/// External side effects (network, disk, store writes) are fine.
///
/// On success a processor returns the additions/replacements to merge
/// into the envelope; on failure it returns a [`ProcessorError`] whose
/// message aborts the stack.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Stable identifier used in stacks, swaps and inserts.
    fn id(&self) -> &str;

    /// Human-readable name for logs and timer steps.
    fn display_name(&self) -> &str;

    /// Job status advanced into the job row when this processor begins.
    fn status_key(&self) -> JobStatus;

    /// IO declaration: required and produced capability tags.
    fn io(&self) -> IoSpec;

    /// Run against the current envelope with the step's merged options.
    async fn execute(
        &self,
        ctx: &ProcessorContext,
        data: &PipelineData,
        options: Option<&Value>,
    ) -> Result<DataPatch, ProcessorError>;
}

/// Registry listing entry for a processor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorSummary {
    pub id: String,
    pub display_name: String,
    pub requires: Vec<IoTag>,
    pub produces: Vec<IoTag>,
}
