use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use framery_blob::{BlobStore, MemoryBlobStore};
use framery_core::{
    DataPatch, Frame, IoSpec, JobRecord, JobStatus, JobStore, MemoryJobStore, PipelineData,
    Processor, ProcessorContext, ProcessorError, ProcessorRegistry, ProgressFn, Settings,
    WorkDirs,
};
use framery_pipeline::processors::default_processors;
use framery_pipeline::providers::{
    CommercialRenderer, ExtractedFrame, FrameClassifier, FrameExtractor, FrameScorer,
};
use framery_pipeline::{PipelineService, Providers, Stack, StackLibrary, StackStep};

const SOURCE_URL: &str = "s3://bucket/uploads/v.mp4";

/// Service over in-memory stores with a fresh temp namespace per test.
struct Harness {
    store: Arc<MemoryJobStore>,
    blobs: Arc<MemoryBlobStore>,
    stacks: Arc<StackLibrary>,
    settings: Settings,
    providers: Providers,
    extra: Vec<Arc<dyn Processor>>,
}

impl Harness {
    async fn new(providers: Providers) -> Self {
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs
            .put("uploads/v.mp4", Bytes::from_static(b"video-bytes"), None)
            .await
            .unwrap();
        Self {
            store: Arc::new(MemoryJobStore::new()),
            blobs,
            stacks: Arc::new(StackLibrary::with_defaults()),
            settings: Settings {
                temp_dir_name: format!("framery-test-{}", uuid::Uuid::new_v4()),
                ..Settings::default()
            },
            providers,
            extra: Vec::new(),
        }
    }

    fn with_extra_processors(mut self, extra: Vec<Arc<dyn Processor>>) -> Self {
        self.extra = extra;
        self
    }

    fn service(&self) -> PipelineService {
        let mut registry = ProcessorRegistry::new();
        registry.register_all(default_processors(
            self.store.clone(),
            self.blobs.clone(),
            self.providers.clone(),
        ));
        registry.register_all(self.extra.iter().cloned());
        PipelineService::new(
            Arc::new(registry),
            self.stacks.clone(),
            self.store.clone(),
            self.blobs.clone(),
            self.settings.clone(),
        )
    }

    async fn insert_job(&self, config: Value) -> JobRecord {
        let job = JobRecord::new(uuid::Uuid::new_v4().to_string(), SOURCE_URL).with_config(config);
        self.store.insert(job.clone()).await.unwrap();
        job
    }

    fn work_dirs(&self, job_id: &str) -> WorkDirs {
        WorkDirs::layout(&std::env::temp_dir(), &self.settings.temp_dir_name, job_id)
    }
}

/// S1. Happy path with the minimal stack and no frames.
#[tokio::test]
async fn minimal_stack_completes_with_empty_result() {
    let harness = Harness::new(Providers::default()).await;
    let job = harness
        .insert_job(json!({"stack": {"stackId": "minimal"}}))
        .await;

    let result = harness
        .service()
        .run_pipeline(&job, None, None, None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.frames_analyzed, 0);
    assert!(result.final_frames.is_empty());
    assert!(result.commercial_images.is_empty());

    let row = harness.store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Completed);
    assert!(row.completed_at.is_some());

    // Work directory removed, uploaded source cleaned up.
    assert!(!harness.work_dirs(&job.id).exists());
    assert!(!harness.blobs.exists("uploads/v.mp4").await.unwrap());
}

/// Recording/failing processor for the abort scenario.
struct ProbeProcessor {
    id: &'static str,
    fail: bool,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl ProbeProcessor {
    fn arc(
        id: &'static str,
        fail: bool,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Arc<dyn Processor> {
        Arc::new(Self {
            id,
            fail,
            log: log.clone(),
        })
    }
}

#[async_trait]
impl Processor for ProbeProcessor {
    fn id(&self) -> &str {
        self.id
    }

    fn display_name(&self) -> &str {
        self.id
    }

    fn status_key(&self) -> JobStatus {
        JobStatus::Processing
    }

    fn io(&self) -> IoSpec {
        IoSpec::new([], [])
    }

    async fn execute(
        &self,
        _ctx: &ProcessorContext,
        _data: &PipelineData,
        _options: Option<&Value>,
    ) -> Result<DataPatch, ProcessorError> {
        self.log.lock().push(self.id);
        if self.fail {
            Err(ProcessorError::new("boom"))
        } else {
            Ok(DataPatch::empty())
        }
    }
}

/// S5. A failing step aborts the stack and fails the job row.
#[tokio::test]
async fn failing_step_aborts_stack_and_fails_job() {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let harness = Harness::new(Providers::default())
        .await
        .with_extra_processors(vec![
            ProbeProcessor::arc("probe-a", false, &log),
            ProbeProcessor::arc("probe-b", false, &log),
            ProbeProcessor::arc("probe-boom", true, &log),
            ProbeProcessor::arc("probe-c", false, &log),
        ]);
    harness.stacks.register(Stack::new(
        "probes",
        "probes",
        vec![
            StackStep::new("probe-a"),
            StackStep::new("probe-b"),
            StackStep::new("probe-boom"),
            StackStep::new("probe-c"),
        ],
    ));

    let job = harness
        .insert_job(json!({"stack": {"stackId": "probes"}}))
        .await;

    let err = harness
        .service()
        .run_pipeline(&job, None, None, None, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("probe-boom"));

    // Steps before the failure ran, the failing step ran, nothing after.
    assert_eq!(*log.lock(), vec!["probe-a", "probe-b", "probe-boom"]);

    let row = harness.store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Failed);
    assert_eq!(row.error.as_deref(), Some("boom"));

    // Failure paths clean the work directory too.
    assert!(!harness.work_dirs(&job.id).exists());
}

/// Unknown stacks fail fast and mark the job failed.
#[tokio::test]
async fn unknown_stack_fails_fast() {
    let harness = Harness::new(Providers::default()).await;
    let job = harness
        .insert_job(json!({"stack": {"stackId": "does-not-exist"}}))
        .await;

    let err = harness
        .service()
        .run_pipeline(&job, None, None, None, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("does-not-exist"));

    let row = harness.store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Failed);
}

/// Debug mode keeps the work directory with all six subdirectories.
#[tokio::test]
async fn debug_mode_keeps_work_directory() {
    let mut harness = Harness::new(Providers::default()).await;
    harness.settings.keep_work_dirs = true;

    let job = harness
        .insert_job(json!({"stack": {"stackId": "minimal"}}))
        .await;
    harness
        .service()
        .run_pipeline(&job, None, None, None, CancellationToken::new())
        .await
        .unwrap();

    let dirs = harness.work_dirs(&job.id);
    assert!(dirs.exists());
    for dir in [
        &dirs.video,
        &dirs.frames,
        &dirs.candidates,
        &dirs.extracted,
        &dirs.final_dir,
        &dirs.commercial,
    ] {
        assert!(dir.is_dir());
    }
    dirs.remove().await.unwrap();
}

/// Providers that exercise the full product stack.
struct FakeProviders;

#[async_trait]
impl FrameExtractor for FakeProviders {
    async fn extract(
        &self,
        _ctx: &ProcessorContext,
        _video: &Path,
        out_dir: &Path,
    ) -> Result<Vec<ExtractedFrame>, ProcessorError> {
        let mut frames = Vec::new();
        for index in 0..6 {
            let path = out_dir.join(format!("frame-{index}.jpg"));
            tokio::fs::write(&path, format!("frame-{index}")).await?;
            frames.push(ExtractedFrame {
                path,
                timestamp_secs: index as f64 * 0.5,
                is_best_per_second: index % 2 == 0,
            });
        }
        Ok(frames)
    }
}

#[async_trait]
impl FrameScorer for FakeProviders {
    async fn score(
        &self,
        _ctx: &ProcessorContext,
        frame: &Frame,
    ) -> Result<Option<f64>, ProcessorError> {
        Ok(Some(frame.timestamp_secs / 10.0))
    }
}

#[async_trait]
impl FrameClassifier for FakeProviders {
    async fn classify(
        &self,
        _ctx: &ProcessorContext,
        frame: &Frame,
    ) -> Result<Option<Value>, ProcessorError> {
        let angle = if frame.is_best_per_second { "front" } else { "side" };
        Ok(Some(json!({ "angle": angle })))
    }
}

#[async_trait]
impl CommercialRenderer for FakeProviders {
    async fn render(
        &self,
        _ctx: &ProcessorContext,
        frame: &Frame,
        version: &str,
        out_dir: &Path,
    ) -> Result<Option<PathBuf>, ProcessorError> {
        let path = out_dir.join(format!("{}-{version}.jpg", frame.id));
        tokio::fs::write(&path, format!("render-{version}")).await?;
        Ok(Some(path))
    }
}

/// Reported progress never moves backwards, even where phases share a
/// band (score-frames climbs to 45, filter-by-score re-enters at 30).
#[tokio::test]
async fn reported_progress_is_monotonic_across_phases() {
    let fake = Arc::new(FakeProviders);
    let providers = Providers {
        extractor: fake.clone(),
        scorer: fake.clone(),
        classifier: fake.clone(),
        commercial_renderer: fake,
        ..Providers::default()
    };

    let harness = Harness::new(providers).await;
    let job = harness.insert_job(Value::Null).await;

    let percentages: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder: ProgressFn = {
        let percentages = percentages.clone();
        Arc::new(move |update| percentages.lock().push(update.percentage))
    };

    harness
        .service()
        .run_pipeline(&job, Some(recorder), None, None, CancellationToken::new())
        .await
        .unwrap();

    let percentages = percentages.lock();
    assert!(!percentages.is_empty());
    for pair in percentages.windows(2) {
        assert!(
            pair[1] >= pair[0],
            "progress regressed: {} -> {} in {:?}",
            pair[0],
            pair[1],
            *percentages
        );
    }
    assert_eq!(*percentages.last().unwrap(), 100);
}

/// Full product stack with providers wired in.
#[tokio::test]
async fn product_stack_produces_frames_and_commercial_images() {
    let fake = Arc::new(FakeProviders);
    let providers = Providers {
        extractor: fake.clone(),
        scorer: fake.clone(),
        classifier: fake.clone(),
        commercial_renderer: fake,
        ..Providers::default()
    };

    let harness = Harness::new(providers).await;
    let job = harness.insert_job(Value::Null).await;

    let result = harness
        .service()
        .run_pipeline(&job, None, None, None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.frames_analyzed, 6);
    // ceil(6 * 0.2) = 2, clamped up to minFrames = 3.
    assert_eq!(result.final_frames.len(), 3);
    assert_eq!(result.variants_discovered, 2);
    assert_eq!(result.commercial_images.len(), 3);
    for versions in result.commercial_images.values() {
        assert_eq!(versions.len(), 2);
        assert!(versions.contains_key("square"));
        assert!(versions.contains_key("landscape"));
    }

    // Uploaded artifacts live under the job's key prefixes.
    let keys = harness.blobs.keys();
    assert!(keys
        .iter()
        .any(|k| k.starts_with(&format!("jobs/{}/frames/", job.id))));
    assert!(keys
        .iter()
        .any(|k| k.starts_with(&format!("jobs/{}/commercial/", job.id))));

    let row = harness.store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Completed);
    assert_eq!(row.result.unwrap().final_frames.len(), 3);
}
