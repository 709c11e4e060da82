//! Worker entry point.
//!
//! Loads settings from the environment, installs the processor set and
//! stack templates, starts the worker pool and drains it on
//! SIGINT/SIGTERM. Exits 0 on graceful shutdown, 1 on a fatal
//! initialisation or runtime error.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use framery_blob::{BlobStore, MemoryBlobStore};
use framery_core::{registry, JobRecord, JobResult, JobStore, MemoryJobStore, ProgressFn, Settings};
use framery_pipeline::processors::default_processors;
use framery_pipeline::{stack, PipelineService, Providers};
use framery_queue::{
    CallbackDispatcher, JobRunner, MemoryQueue, QueueConfig, WorkerPool, WorkerPoolConfig,
};

/// Adapts the pipeline service to the queue's runner seam.
struct PipelineRunner {
    service: Arc<PipelineService>,
}

#[async_trait]
impl JobRunner for PipelineRunner {
    async fn run(
        &self,
        job: &JobRecord,
        on_progress: ProgressFn,
        cancel: CancellationToken,
    ) -> anyhow::Result<JobResult> {
        let result = self
            .service
            .run_pipeline(job, Some(on_progress), None, None, cancel)
            .await?;
        Ok(result)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        error!(error = %err, "worker failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let settings = Settings::from_env();
    info!(
        concurrency = settings.worker_concurrency,
        environment = %settings.environment,
        "starting worker"
    );

    // Reference backends; deployments swap in their database- and
    // S3-backed implementations here.
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());

    registry::install(default_processors(
        store.clone(),
        blobs.clone(),
        Providers::default(),
    ));
    stack::install_default_stacks();
    let processors = Arc::new(registry::global().read().clone());
    info!(processors = processors.len(), "processor registry installed");

    let service = Arc::new(PipelineService::new(
        processors,
        stack::global(),
        store.clone(),
        blobs,
        settings.clone(),
    ));

    let queue = Arc::new(MemoryQueue::new(QueueConfig::from_settings(&settings)));
    let callbacks = Arc::new(CallbackDispatcher::from_settings(&settings));
    let pool = Arc::new(WorkerPool::new(
        queue,
        store,
        Arc::new(PipelineRunner { service }),
        callbacks,
        WorkerPoolConfig::from_settings(&settings),
    ));

    let handle = pool.start();
    wait_for_shutdown_signal().await;

    info!("draining worker pool");
    handle.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(err) => {
            error!(error = %err, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("received ctrl-c");
}
