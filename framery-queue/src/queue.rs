use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::QueueResult;
use crate::types::{QueueEntry, QueuePayload};

/// Outcome of acking a failed delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum FailOutcome {
    /// Scheduled for redelivery.
    Retrying { run_at: DateTime<Utc>, attempt: u32 },
    /// Out of attempts (or the failure was not retryable).
    Failed,
}

/// Queue storage primitives.
///
/// Entries are deduplicated by job id: enqueueing an id that already has
/// an entry (in any state, until the reaper drops it) is a no-op.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job; returns false when deduplication made this a no-op.
    async fn enqueue(&self, payload: QueuePayload) -> QueueResult<bool>;

    /// Pull the next eligible entry (FIFO among eligible) and mark it
    /// active, incrementing its attempt counter.
    async fn dequeue(&self) -> QueueResult<Option<QueueEntry>>;

    /// Mark an active entry completed.
    async fn ack_complete(&self, job_id: &str) -> QueueResult<()>;

    /// Mark an active entry failed; schedules a backoff redelivery when
    /// `retryable` and attempts remain.
    async fn ack_fail(&self, job_id: &str, error: &str, retryable: bool)
        -> QueueResult<FailOutcome>;

    /// Mirror pipeline progress onto the entry.
    async fn set_percentage(&self, job_id: &str, percentage: u8) -> QueueResult<()>;

    async fn get(&self, job_id: &str) -> QueueResult<Option<QueueEntry>>;

    /// Prune retained terminal entries by age and count caps.
    /// Returns how many entries were dropped.
    async fn reap(&self) -> QueueResult<usize>;

    /// Entries currently waiting or delayed.
    async fn pending_len(&self) -> QueueResult<usize>;
}
