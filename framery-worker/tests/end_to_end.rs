//! Whole-system flow: enqueue -> worker -> pipeline -> callback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use framery_blob::{BlobStore, MemoryBlobStore};
use framery_core::{
    JobRecord, JobResult, JobStatus, JobStore, MemoryJobStore, ProcessorRegistry, ProgressFn,
    Settings,
};
use framery_pipeline::processors::default_processors;
use framery_pipeline::{PipelineService, Providers, StackLibrary};
use framery_queue::{
    CallbackDispatcher, EntryStatus, JobQueue, JobRunner, MemoryQueue, QueueConfig, QueuePayload,
    WorkerPool, WorkerPoolConfig,
};

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

#[derive(Clone)]
struct Hook {
    payloads: Arc<Mutex<Vec<Value>>>,
}

async fn hook(State(state): State<Hook>, Json(payload): Json<Value>) -> StatusCode {
    state.payloads.lock().push(payload);
    StatusCode::OK
}

async fn serve_hook() -> (String, Arc<Mutex<Vec<Value>>>) {
    let payloads = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().route("/hook", post(hook)).with_state(Hook {
        payloads: payloads.clone(),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/hook"), payloads)
}

#[tokio::test]
async fn queued_job_runs_to_completion_and_fires_callback() {
    let (callback_url, payloads) = serve_hook().await;

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    blobs
        .put("uploads/v.mp4", Bytes::from_static(b"video"), None)
        .await
        .unwrap();

    let mut registry = ProcessorRegistry::new();
    registry.register_all(default_processors(
        store.clone(),
        blobs.clone(),
        Providers::default(),
    ));

    let settings = Settings {
        temp_dir_name: format!("framery-e2e-{}", uuid::Uuid::new_v4()),
        ..Settings::default()
    };
    let service = Arc::new(PipelineService::new(
        Arc::new(registry),
        Arc::new(StackLibrary::with_defaults()),
        store.clone(),
        blobs,
        settings,
    ));

    let queue = Arc::new(MemoryQueue::new(QueueConfig::default()));
    let pool = Arc::new(WorkerPool::new(
        queue.clone(),
        store.clone(),
        Arc::new(PipelineRunner { service }),
        Arc::new(CallbackDispatcher::new(
            Duration::from_secs(5),
            3,
            Duration::from_millis(50),
        )),
        WorkerPoolConfig {
            concurrency: 2,
            idle_poll: Duration::from_millis(10),
            ..WorkerPoolConfig::default()
        },
    ));

    let job = JobRecord::new("e2e-job", "s3://bucket/uploads/v.mp4")
        .with_config(json!({"stack": {"stackId": "minimal"}}))
        .with_callback_url(&callback_url);
    store.insert(job).await.unwrap();
    queue.enqueue(QueuePayload::new("e2e-job")).await.unwrap();
    // Duplicate submissions are a no-op.
    assert!(!queue.enqueue(QueuePayload::new("e2e-job")).await.unwrap());

    let handle = pool.start();
    let mut completed = false;
    for _ in 0..200 {
        if let Some(entry) = queue.get("e2e-job").await.unwrap() {
            if matches!(entry.status, EntryStatus::Completed { .. }) {
                completed = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(completed, "queue entry never completed");

    let row = store.get("e2e-job").await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Completed);
    assert!(row.result.is_some());

    // Callback arrived with the final result.
    for _ in 0..100 {
        if !payloads.lock().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let payloads = payloads.lock();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0]["jobId"], "e2e-job");
    assert_eq!(payloads[0]["status"], "completed");
    assert_eq!(payloads[0]["result"]["framesAnalyzed"], 0);

    handle.shutdown().await;
}
