use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::job::{JobRecord, JobResult, JobStatus, ProgressUpdate};

/// The narrow job-row surface the pipeline core touches.
///
/// The real backend is the application's database; this trait carries
/// only the reads and writes the core performs. Writes follow the row's
/// own mutation rules (see [`JobRecord`]): status moves are monotonic,
/// error is set on failure only, result on completion only.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: JobRecord) -> StoreResult<()>;

    async fn get(&self, job_id: &str) -> StoreResult<Option<JobRecord>>;

    /// Advance the row's status; regressions are ignored silently.
    async fn advance_status(&self, job_id: &str, status: JobStatus) -> StoreResult<()>;

    async fn set_progress(&self, job_id: &str, progress: ProgressUpdate) -> StoreResult<()>;

    /// Record the final result and completion timestamp.
    async fn complete(&self, job_id: &str, result: JobResult) -> StoreResult<()>;

    /// Record a failure with its error string.
    async fn fail(&self, job_id: &str, error: &str) -> StoreResult<()>;

    /// Persist a frame's remote URL on its row.
    async fn set_frame_url(&self, frame_db_id: &str, url: &str) -> StoreResult<()>;
}

/// In-memory reference backend for tests and development.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, JobRecord>>,
    frame_urls: RwLock<HashMap<String, String>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: the remote URL recorded for a frame row.
    pub fn frame_url(&self, frame_db_id: &str) -> Option<String> {
        self.frame_urls.read().get(frame_db_id).cloned()
    }

    fn with_job<T>(
        &self,
        job_id: &str,
        f: impl FnOnce(&mut JobRecord) -> T,
    ) -> StoreResult<T> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        Ok(f(job))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: JobRecord) -> StoreResult<()> {
        self.jobs.write().insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, job_id: &str) -> StoreResult<Option<JobRecord>> {
        Ok(self.jobs.read().get(job_id).cloned())
    }

    async fn advance_status(&self, job_id: &str, status: JobStatus) -> StoreResult<()> {
        self.with_job(job_id, |job| {
            job.advance_status(status);
        })
    }

    async fn set_progress(&self, job_id: &str, progress: ProgressUpdate) -> StoreResult<()> {
        self.with_job(job_id, |job| {
            job.progress = Some(progress);
            job.updated_at = chrono::Utc::now();
        })
    }

    async fn complete(&self, job_id: &str, result: JobResult) -> StoreResult<()> {
        self.with_job(job_id, |job| {
            job.complete(result);
        })
    }

    async fn fail(&self, job_id: &str, error: &str) -> StoreResult<()> {
        self.with_job(job_id, |job| {
            job.fail(error);
        })
    }

    async fn set_frame_url(&self, frame_db_id: &str, url: &str) -> StoreResult<()> {
        self.frame_urls
            .write()
            .insert(frame_db_id.to_string(), url.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lifecycle_round_trip() {
        let store = MemoryJobStore::new();
        let job = JobRecord::new("j1", "s3://b/uploads/v.mp4");
        store.insert(job).await.unwrap();

        store
            .advance_status("j1", JobStatus::Processing)
            .await
            .unwrap();
        store
            .set_progress("j1", ProgressUpdate::new(JobStatus::Processing, 10))
            .await
            .unwrap();
        store.complete("j1", JobResult::default()).await.unwrap();

        let job = store.get("j1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.result.is_some());
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn missing_job_reports_not_found() {
        let store = MemoryJobStore::new();
        let err = store.fail("nope", "boom").await.unwrap_err();
        assert!(matches!(err, StoreError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn frame_urls_are_recorded() {
        let store = MemoryJobStore::new();
        store
            .set_frame_url("frame-1", "https://blobs.test/jobs/j1/frames/f0.jpg")
            .await
            .unwrap();
        assert_eq!(
            store.frame_url("frame-1").as_deref(),
            Some("https://blobs.test/jobs/j1/frames/f0.jpg")
        );
    }
}
