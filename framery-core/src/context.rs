use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::job::{JobConfig, JobRecord, JobStatus, ProgressUpdate};
use crate::settings::Settings;
use crate::timer::PipelineTimer;
use crate::usage::TokenUsageTracker;
use crate::workdir::WorkDirs;

/// Progress callback threaded from the worker through to processors.
pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Per-job context, constructed once by the pipeline service.
///
/// The work directories and the envelope are owned by the job's task;
/// the usage tracker is the only mutable state shared inside a job and
/// serialises its own updates.
pub struct ProcessorContext {
    /// Snapshot of the job row at run start.
    pub job: JobRecord,
    /// Configuration parsed and defaulted from the row's config blob.
    pub config: JobConfig,
    pub dirs: WorkDirs,
    pub progress: Option<ProgressFn>,
    pub timer: PipelineTimer,
    /// Effective settings snapshot for this run.
    pub settings: Settings,
    pub usage: Arc<TokenUsageTracker>,
    /// Cancelled on worker shutdown or job timeout; processors check it
    /// at suspension points.
    pub cancel: CancellationToken,
    /// Highest percentage reported so far. [`report_progress`] floors
    /// every update to it, so the reported sequence never regresses
    /// even when two phases share a band or fan-out tasks finish out
    /// of order.
    ///
    /// [`report_progress`]: ProcessorContext::report_progress
    pub progress_floor: AtomicU8,
}

impl ProcessorContext {
    pub fn job_id(&self) -> &str {
        &self.job.id
    }

    /// Report progress if a callback is attached.
    ///
    /// The percentage is floored to the running maximum for this job.
    pub fn report_progress(&self, mut update: ProgressUpdate) {
        let prev = self
            .progress_floor
            .fetch_max(update.percentage, Ordering::SeqCst);
        if update.percentage < prev {
            update.percentage = prev;
        }
        if let Some(progress) = &self.progress {
            progress(update);
        }
    }

    /// Report a percentage within a phase with its status.
    pub fn report_percentage(&self, status: JobStatus, percentage: u8) {
        self.report_progress(ProgressUpdate::new(status, percentage));
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Test-oriented builder: a context over temp dirs with default settings.
impl ProcessorContext {
    pub fn for_job(job: JobRecord, dirs: WorkDirs) -> Self {
        Self {
            timer: PipelineTimer::new(job.id.clone()),
            config: JobConfig::default(),
            job,
            dirs,
            progress: None,
            settings: Settings::default(),
            usage: Arc::new(TokenUsageTracker::new()),
            cancel: CancellationToken::new(),
            progress_floor: AtomicU8::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::path::Path;

    #[test]
    fn progress_is_floored_to_the_running_max() {
        let dirs = WorkDirs::layout(Path::new("/tmp"), "framery", "j1");
        let mut ctx = ProcessorContext::for_job(JobRecord::new("j1", "s3://b/uploads/v.mp4"), dirs);

        let seen: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        ctx.progress = Some(Arc::new(move |update: ProgressUpdate| {
            sink.lock().push(update.percentage);
        }));

        ctx.report_percentage(JobStatus::Scoring, 45);
        // A later phase entering a band below the running max is lifted.
        ctx.report_percentage(JobStatus::Scoring, 30);
        ctx.report_percentage(JobStatus::Generating, 70);

        assert_eq!(*seen.lock(), vec![45, 45, 70]);
    }
}
