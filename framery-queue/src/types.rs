use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Queue job payload: the job id is both the payload and the
/// deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePayload {
    pub job_id: String,
}

impl QueuePayload {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
        }
    }
}

/// Queue entry lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntryStatus {
    /// Eligible for immediate delivery.
    Waiting,

    /// Scheduled for redelivery after a backoff.
    Delayed { run_at: DateTime<Utc> },

    /// Held by a worker.
    Active,

    /// Finished successfully; retained until reaped.
    Completed { at: DateTime<Utc> },

    /// Out of attempts; retained until reaped.
    Failed { at: DateTime<Utc>, error: String },
}

impl EntryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Waiting => true,
            Self::Delayed { run_at } => *run_at <= now,
            _ => false,
        }
    }
}

/// Mutable queue-side state of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub job_id: String,
    pub status: EntryStatus,
    /// Delivery attempts so far (incremented at dequeue).
    pub attempts: u32,
    pub max_attempts: u32,
    /// Coarse progress mirrored from the pipeline's progress callback.
    pub percentage: u8,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl QueueEntry {
    pub fn new(job_id: impl Into<String>, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            status: EntryStatus::Waiting,
            attempts: 0,
            max_attempts,
            percentage: 0,
            enqueued_at: now,
            updated_at: now,
            last_error: None,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }
}
