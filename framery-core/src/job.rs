use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Job status lifecycle.
///
/// Statuses advance monotonically along the processing path; `completed`,
/// `failed` and `cancelled` are terminal. A failed job may re-enter
/// `processing` when the queue redelivers it, the other terminal states
/// never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Pending,
    Processing,
    ExtractingFrames,
    Scoring,
    Classifying,
    ExtractingProduct,
    Generating,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Position along the processing path, used to enforce monotonicity.
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::ExtractingFrames => 2,
            Self::Scoring => 3,
            Self::Classifying => 4,
            Self::ExtractingProduct => 5,
            Self::Generating => 6,
            Self::Completed | Self::Failed | Self::Cancelled => 7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::ExtractingFrames => "extracting-frames",
            Self::Scoring => "scoring",
            Self::Classifying => "classifying",
            Self::ExtractingProduct => "extracting-product",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress snapshot reported by processors and persisted on the job row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub status: JobStatus,
    pub percentage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
}

impl ProgressUpdate {
    pub fn new(status: JobStatus, percentage: u8) -> Self {
        Self {
            status,
            percentage,
            message: None,
            step: None,
            total_steps: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_step(mut self, step: u32, total_steps: u32) -> Self {
        self.step = Some(step);
        self.total_steps = Some(total_steps);
        self
    }
}

/// Final result recorded on a completed job row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobResult {
    pub variants_discovered: u32,
    pub frames_analyzed: u32,
    /// Remote URLs of the final frame selection.
    pub final_frames: Vec<String>,
    /// frameId -> version -> URL.
    pub commercial_images: HashMap<String, HashMap<String, String>>,
}

/// Stack configuration overlay, supplied at submission or per call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StackOverlay {
    pub stack_id: Option<String>,
    pub processor_swaps: HashMap<String, String>,
    pub processor_options: HashMap<String, Value>,
    pub insert_processors: Vec<InsertSpec>,
}

impl StackOverlay {
    /// Merge `overlay` over `base`: call-site values win at the leaf,
    /// maps merge key-wise, insert lists concatenate in order.
    pub fn merged_over(base: &StackOverlay, overlay: &StackOverlay) -> StackOverlay {
        let mut merged = base.clone();
        if overlay.stack_id.is_some() {
            merged.stack_id = overlay.stack_id.clone();
        }
        for (from, to) in &overlay.processor_swaps {
            merged.processor_swaps.insert(from.clone(), to.clone());
        }
        for (id, options) in &overlay.processor_options {
            merged
                .processor_options
                .insert(id.clone(), options.clone());
        }
        merged
            .insert_processors
            .extend(overlay.insert_processors.iter().cloned());
        merged
    }
}

/// Where an inserted processor lands relative to its anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Before,
    After,
}

/// One entry of `insertProcessors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    pub processor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl InsertSpec {
    pub fn after(anchor: impl Into<String>, processor: impl Into<String>) -> Self {
        Self {
            before: None,
            after: Some(anchor.into()),
            processor: processor.into(),
            options: None,
        }
    }

    pub fn before(anchor: impl Into<String>, processor: impl Into<String>) -> Self {
        Self {
            before: Some(anchor.into()),
            after: None,
            processor: processor.into(),
            options: None,
        }
    }

    /// Anchor id and position; `before` wins when both are set.
    pub fn anchor(&self) -> Option<(&str, InsertPosition)> {
        if let Some(before) = &self.before {
            Some((before, InsertPosition::Before))
        } else {
            self.after
                .as_deref()
                .map(|after| (after, InsertPosition::After))
        }
    }
}

/// Parsed job configuration, defaulted field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobConfig {
    pub stack: Option<StackOverlay>,
    pub pipeline_strategy: Option<String>,
    pub commercial_versions: Option<Vec<String>>,
}

impl JobConfig {
    /// Parse the job row's config blob; wrong shapes fail fast.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
    }
}

/// Persistent job row, the columns the pipeline core touches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    pub video_url: Option<String>,
    /// Raw configuration blob, parsed against `JobConfig` per run.
    pub config: Value,
    pub progress: Option<ProgressUpdate>,
    pub result: Option<JobResult>,
    pub error: Option<String>,
    pub callback_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new(id: impl Into<String>, video_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            video_url: Some(video_url.into()),
            config: Value::Null,
            progress: None,
            result: None,
            error: None,
            callback_url: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Advance the status; regressions and moves out of a terminal state
    /// are ignored, except failed -> processing (queue redelivery).
    /// Returns whether the status changed.
    pub fn advance_status(&mut self, status: JobStatus) -> bool {
        let allowed = match self.status {
            JobStatus::Completed | JobStatus::Cancelled => false,
            JobStatus::Failed => status == JobStatus::Processing,
            current => status.rank() > current.rank(),
        };
        if !allowed {
            return false;
        }
        self.status = status;
        self.updated_at = Utc::now();
        if self.started_at.is_none() && status != JobStatus::Pending {
            self.started_at = Some(self.updated_at);
        }
        true
    }

    /// Record the final result; result and completion timestamp set once.
    pub fn complete(&mut self, result: JobResult) -> bool {
        if matches!(self.status, JobStatus::Completed | JobStatus::Cancelled) {
            return false;
        }
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.updated_at = Utc::now();
        if self.completed_at.is_none() {
            self.completed_at = Some(self.updated_at);
        }
        true
    }

    /// Record a failure; the error string is set only on this transition.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if matches!(self.status, JobStatus::Completed | JobStatus::Cancelled) {
            return false;
        }
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_advances_monotonically() {
        let mut job = JobRecord::new("j1", "s3://bucket/uploads/v.mp4");
        assert!(job.advance_status(JobStatus::Scoring));
        assert!(job.started_at.is_some());
        // No going back to an earlier phase.
        assert!(!job.advance_status(JobStatus::Processing));
        assert_eq!(job.status, JobStatus::Scoring);
    }

    #[test]
    fn terminal_states_stick() {
        let mut job = JobRecord::new("j1", "s3://b/uploads/v.mp4");
        assert!(job.complete(JobResult::default()));
        let completed_at = job.completed_at;
        assert!(!job.fail("late error"));
        assert!(!job.complete(JobResult::default()));
        assert_eq!(job.completed_at, completed_at);
        assert!(job.error.is_none());
    }

    #[test]
    fn failed_job_can_reenter_processing() {
        let mut job = JobRecord::new("j1", "s3://b/uploads/v.mp4");
        assert!(job.fail("boom"));
        assert!(job.advance_status(JobStatus::Processing));
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn overlay_merge_call_site_wins() {
        let base = StackOverlay {
            stack_id: Some("product-frames".into()),
            processor_swaps: HashMap::from([("a".into(), "b".into())]),
            processor_options: HashMap::from([("p".into(), json!({"x": 1}))]),
            insert_processors: vec![InsertSpec::after("a", "c")],
        };
        let overlay = StackOverlay {
            stack_id: None,
            processor_swaps: HashMap::from([("a".into(), "z".into())]),
            processor_options: HashMap::from([("q".into(), json!({"y": 2}))]),
            insert_processors: vec![InsertSpec::before("b", "d")],
        };
        let merged = StackOverlay::merged_over(&base, &overlay);
        assert_eq!(merged.stack_id.as_deref(), Some("product-frames"));
        assert_eq!(merged.processor_swaps["a"], "z");
        assert_eq!(merged.processor_options.len(), 2);
        assert_eq!(merged.insert_processors.len(), 2);
    }

    #[test]
    fn job_config_parses_with_defaults() {
        let config = JobConfig::from_value(&json!({
            "stack": {"stackId": "minimal"},
            "pipelineStrategy": "frames"
        }))
        .unwrap();
        assert_eq!(
            config.stack.unwrap().stack_id.as_deref(),
            Some("minimal")
        );
        assert_eq!(config.pipeline_strategy.as_deref(), Some("frames"));

        assert!(JobConfig::from_value(&json!({"stack": 5})).is_err());
    }
}
