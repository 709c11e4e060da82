use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use framery_core::{JobRecord, JobResult, JobStatus, JobStore, ProgressFn, Settings};

use crate::callback::CallbackDispatcher;
use crate::queue::{FailOutcome, JobQueue};
use crate::types::QueueEntry;

/// Runs one job to completion. Implemented by the pipeline service
/// (through an adapter) so the queue stays free of pipeline internals.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(
        &self,
        job: &JobRecord,
        on_progress: ProgressFn,
        cancel: CancellationToken,
    ) -> anyhow::Result<JobResult>;
}

/// Pool tuning knobs.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub concurrency: usize,
    pub job_timeout: Duration,
    pub reap_interval: Duration,
    /// How long an idle worker waits before polling the queue again.
    pub idle_poll: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            job_timeout: Duration::from_secs(600),
            reap_interval: Duration::from_secs(60),
            idle_poll: Duration::from_millis(100),
        }
    }
}

impl WorkerPoolConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            concurrency: settings.worker_concurrency.max(1),
            job_timeout: settings.job_timeout,
            ..Self::default()
        }
    }
}

/// Handle for draining and stopping a running pool.
pub struct WorkerHandle {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Stop accepting work, let in-flight jobs finish, then return.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "worker task join error");
            }
        }
        info!("worker pool stopped");
    }
}

/// Bounded pool of workers draining the job queue.
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn JobStore>,
    runner: Arc<dyn JobRunner>,
    callbacks: Arc<CallbackDispatcher>,
    config: WorkerPoolConfig,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn JobStore>,
        runner: Arc<dyn JobRunner>,
        callbacks: Arc<CallbackDispatcher>,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            queue,
            store,
            runner,
            callbacks,
            config,
        }
    }

    /// Spawn the workers and the retention reaper.
    pub fn start(self: Arc<Self>) -> WorkerHandle {
        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(self.config.concurrency + 1);

        for worker_id in 0..self.config.concurrency {
            let pool = self.clone();
            let token = cancel.clone();
            handles.push(tokio::spawn(async move {
                pool.worker_loop(worker_id, token).await;
            }));
        }

        let pool = self.clone();
        let token = cancel.clone();
        handles.push(tokio::spawn(async move {
            pool.reaper_loop(token).await;
        }));

        info!(concurrency = self.config.concurrency, "worker pool started");
        WorkerHandle { cancel, handles }
    }

    async fn worker_loop(&self, worker_id: usize, cancel: CancellationToken) {
        debug!(worker_id, "worker started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.queue.dequeue().await {
                Ok(Some(entry)) => {
                    self.process(entry).await;
                }
                Ok(None) => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.idle_poll) => {}
                    }
                }
                Err(err) => {
                    error!(worker_id, error = %err, "dequeue failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        debug!(worker_id, "worker stopped");
    }

    async fn reaper_loop(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.reap_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.queue.reap().await {
                        Ok(0) => {}
                        Ok(count) => info!(count, "reaped terminal queue entries"),
                        Err(err) => warn!(error = %err, "queue reap failed"),
                    }
                }
            }
        }
    }

    #[instrument(skip(self, entry), fields(job_id = %entry.job_id))]
    async fn process(&self, entry: QueueEntry) {
        let job_id = entry.job_id.clone();

        let job = match self.store.get(&job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!("job row missing, dropping queue entry");
                let _ = self.queue.ack_fail(&job_id, "job row not found", false).await;
                return;
            }
            Err(err) => {
                error!(error = %err, "failed to load job row");
                let _ = self.queue.ack_fail(&job_id, &err.to_string(), true).await;
                return;
            }
        };

        // Cancelled or already-finished jobs are acked without running.
        if matches!(job.status, JobStatus::Completed | JobStatus::Cancelled) {
            info!(status = %job.status, "job already terminal, skipping");
            let _ = self.queue.ack_complete(&job_id).await;
            return;
        }

        if let Err(err) = self.store.advance_status(&job_id, JobStatus::Processing).await {
            warn!(error = %err, "failed to mark job processing");
        }

        let progress = self.progress_fn(&job_id);
        // Independent of the pool's shutdown token: shutdown drains
        // in-flight jobs, only the job timeout forces cancellation.
        let job_cancel = CancellationToken::new();
        let run = self.runner.run(&job, progress, job_cancel.clone());

        match tokio::time::timeout(self.config.job_timeout, run).await {
            Err(_) => {
                job_cancel.cancel();
                warn!(timeout_ms = self.config.job_timeout.as_millis() as u64, "job timed out");
                if let Err(err) = self.store.fail(&job_id, "timeout").await {
                    warn!(error = %err, "failed to record timeout");
                }
                let _ = self.queue.ack_fail(&job_id, "timeout", false).await;
                self.fire_callback(&job, JobStatus::Failed, None).await;
            }
            Ok(Ok(result)) => {
                if let Err(err) = self.queue.ack_complete(&job_id).await {
                    warn!(error = %err, "failed to ack completion");
                }
                info!("job completed");
                self.fire_callback(&job, JobStatus::Completed, Some(&result)).await;
            }
            Ok(Err(err)) => {
                // The pipeline service already recorded the failure on the row.
                let message = err.to_string();
                match self.queue.ack_fail(&job_id, &message, true).await {
                    Ok(FailOutcome::Retrying { run_at, attempt }) => {
                        warn!(%message, attempt, %run_at, "job failed, will retry");
                    }
                    Ok(FailOutcome::Failed) => {
                        error!(%message, "job failed permanently");
                        self.fire_callback(&job, JobStatus::Failed, None).await;
                    }
                    Err(err) => error!(error = %err, "failed to ack failure"),
                }
            }
        }
    }

    /// Progress callback wired to the job row and the queue entry.
    /// Also advances the row's status key; regressions are ignored by
    /// the store.
    fn progress_fn(&self, job_id: &str) -> ProgressFn {
        let store = self.store.clone();
        let queue = self.queue.clone();
        let job_id = job_id.to_string();
        let floor = Arc::new(AtomicU8::new(0));
        Arc::new(move |mut update| {
            let store = store.clone();
            let queue = queue.clone();
            let job_id = job_id.clone();
            let floor = floor.clone();
            tokio::spawn(async move {
                // Persist tasks may run out of order; the mirrored
                // percentage is floored to the running max so it never
                // moves backwards.
                let prev = floor.fetch_max(update.percentage, Ordering::SeqCst);
                if update.percentage < prev {
                    update.percentage = prev;
                }
                let percentage = update.percentage;
                let status = update.status;
                if let Err(err) = store.set_progress(&job_id, update).await {
                    debug!(%job_id, error = %err, "progress update not persisted");
                }
                // Terminal transitions are owned by the terminal
                // processor and the failure paths, not by progress.
                if !status.is_terminal() {
                    let _ = store.advance_status(&job_id, status).await;
                }
                let _ = queue.set_percentage(&job_id, percentage).await;
            });
        })
    }

    async fn fire_callback(&self, job: &JobRecord, status: JobStatus, result: Option<&JobResult>) {
        let Some(url) = &job.callback_url else {
            return;
        };
        if let Err(err) = self
            .callbacks
            .dispatch(&job.id, status, result, url)
            .await
        {
            warn!(job_id = %job.id, error = %err, "callback delivery failed");
        }
    }
}
