use std::sync::atomic::AtomicU8;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use framery_blob::{keys, BlobStore};
use framery_core::data::META_RESULT;
use framery_core::{
    JobConfig, JobRecord, JobResult, JobStore, PipelineData, PipelineTimer, ProcessorContext,
    ProcessorRegistry, ProgressFn, Settings, StackOverlay, TokenUsageTracker, WorkDirs,
};

use crate::error::{PipelineError, PipelineResult};
use crate::processors::derive_result;
use crate::runner::StackRunner;
use crate::stack::StackLibrary;

/// Per-job orchestration around the stack runner.
///
/// Owns the work-directory lifecycle, context assembly, failure
/// recording and post-run cleanup. One service instance serves the
/// whole process.
pub struct PipelineService {
    registry: Arc<ProcessorRegistry>,
    stacks: Arc<StackLibrary>,
    store: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobStore>,
    settings: Settings,
}

impl PipelineService {
    pub fn new(
        registry: Arc<ProcessorRegistry>,
        stacks: Arc<StackLibrary>,
        store: Arc<dyn JobStore>,
        blobs: Arc<dyn BlobStore>,
        settings: Settings,
    ) -> Self {
        Self {
            registry,
            stacks,
            store,
            blobs,
            settings,
        }
    }

    /// Run the job's stack to completion.
    ///
    /// Every error exit records the failure on the job row before the
    /// error surfaces to the caller.
    pub async fn run_pipeline(
        &self,
        job: &JobRecord,
        on_progress: Option<ProgressFn>,
        stack_config: Option<StackOverlay>,
        initial_data: Option<PipelineData>,
        cancel: CancellationToken,
    ) -> PipelineResult<JobResult> {
        let outcome = self
            .run_inner(job, on_progress, stack_config, initial_data, cancel)
            .await;
        if let Err(err) = &outcome {
            warn!(job_id = %job.id, error = %err, "pipeline failed");
            if let Err(store_err) = self.store.fail(&job.id, &job_error(err)).await {
                warn!(job_id = %job.id, error = %store_err, "failed to record job failure");
            }
        }
        outcome
    }

    async fn run_inner(
        &self,
        job: &JobRecord,
        on_progress: Option<ProgressFn>,
        stack_config: Option<StackOverlay>,
        initial_data: Option<PipelineData>,
        cancel: CancellationToken,
    ) -> PipelineResult<JobResult> {
        let config = JobConfig::from_value(&job.config)
            .map_err(|err| PipelineError::InvalidConfig(err.to_string()))?;

        let job_overlay = config.stack.clone().unwrap_or_default();
        let call_overlay = stack_config.unwrap_or_default();
        let overlay = StackOverlay::merged_over(&job_overlay, &call_overlay);

        let stack_id = overlay
            .stack_id
            .clone()
            .unwrap_or_else(|| self.stacks.default_for(config.pipeline_strategy.as_deref()));
        let stack = self
            .stacks
            .get(&stack_id)
            .ok_or_else(|| PipelineError::UnknownStack(stack_id.clone()))?;

        let dirs = WorkDirs::layout(
            &std::env::temp_dir(),
            &self.settings.temp_dir_name,
            &job.id,
        );
        dirs.create().await?;

        let mut data = initial_data.unwrap_or_default();
        if data
            .video
            .as_ref()
            .and_then(|v| v.source_url.as_ref())
            .is_none()
        {
            if let Some(url) = &job.video_url {
                let mut video = data.video.take().unwrap_or_default();
                video.source_url = Some(url.clone());
                data.video = Some(video);
            }
        }

        let ctx = ProcessorContext {
            timer: PipelineTimer::new(job.id.clone()),
            job: job.clone(),
            config,
            dirs: dirs.clone(),
            progress: on_progress,
            settings: self.settings.clone(),
            usage: Arc::new(TokenUsageTracker::new()),
            cancel,
            progress_floor: AtomicU8::new(0),
        };

        let runner = StackRunner::new(self.registry.clone());
        let outcome = async {
            let data = runner.execute(&stack, &ctx, Some(&overlay), data).await?;

            let result = data
                .metadata
                .get(META_RESULT)
                .and_then(|value| serde_json::from_value::<JobResult>(value.clone()).ok())
                .unwrap_or_else(|| derive_result(&data));

            self.cleanup_source_video(job).await;
            Ok(result)
        }
        .await;

        ctx.timer.log_summary();
        if self.settings.keep_work_dirs {
            info!(
                job_id = %job.id,
                root = %dirs.root.display(),
                "debug mode, keeping work directory"
            );
        } else if let Err(err) = dirs.remove().await {
            warn!(job_id = %job.id, error = %err, "work directory cleanup failed");
        }

        outcome
    }

    /// Best-effort removal of the uploaded source video. Never fails
    /// the job.
    async fn cleanup_source_video(&self, job: &JobRecord) {
        let Some(url) = &job.video_url else {
            return;
        };
        let Some(key) = keys::managed_key_from_url(url) else {
            return;
        };
        if !keys::is_upload_key(&key) {
            return;
        }
        match self.blobs.delete(&key).await {
            Ok(()) => debug!(job_id = %job.id, %key, "source video removed"),
            Err(err) => warn!(job_id = %job.id, %key, error = %err, "source video cleanup failed"),
        }
    }
}

/// Error string recorded on the job row. Processor failures keep their
/// own message; everything else uses the error's display form.
fn job_error(err: &PipelineError) -> String {
    match err {
        PipelineError::StepFailed { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
