use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use tracing::debug;

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::queue::{FailOutcome, JobQueue};
use crate::types::{EntryStatus, QueueEntry, QueuePayload};

/// In-memory queue backend.
///
/// Entries live in a single map keyed by job id; delivery order is a
/// FIFO deque of ids. Terminal entries stay in the map (for status
/// queries and deduplication) until [`JobQueue::reap`] prunes them.
pub struct MemoryQueue {
    entries: RwLock<HashMap<String, QueueEntry>>,
    order: RwLock<VecDeque<String>>,
    config: QueueConfig,
}

impl MemoryQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            order: RwLock::new(VecDeque::new()),
            config,
        }
    }

    fn backoff_run_at(&self, attempt: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let backoff = self.config.backoff_for(attempt);
        now + ChronoDuration::from_std(backoff).unwrap_or_else(|_| ChronoDuration::seconds(5))
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, payload: QueuePayload) -> QueueResult<bool> {
        let job_id = payload.job_id;
        {
            let mut entries = self.entries.write();
            if entries.contains_key(&job_id) {
                debug!(%job_id, "enqueue deduplicated");
                return Ok(false);
            }
            entries.insert(
                job_id.clone(),
                QueueEntry::new(job_id.clone(), self.config.max_attempts),
            );
        }
        // An entry lands in the map before it becomes deliverable, so
        // concurrent enqueues of the same id still deduplicate.
        self.order.write().push_back(job_id);
        Ok(true)
    }

    async fn dequeue(&self) -> QueueResult<Option<QueueEntry>> {
        let now = Utc::now();
        let mut order = self.order.write();
        let mut entries = self.entries.write();

        let position = order.iter().position(|job_id| {
            entries
                .get(job_id)
                .map(|e| e.status.is_eligible(now))
                .unwrap_or(false)
        });

        let Some(position) = position else {
            return Ok(None);
        };
        let job_id = order.remove(position).expect("position just found");
        let entry = entries.get_mut(&job_id).expect("entry exists");
        entry.status = EntryStatus::Active;
        entry.attempts += 1;
        entry.updated_at = now;
        Ok(Some(entry.clone()))
    }

    async fn ack_complete(&self, job_id: &str) -> QueueResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(job_id)
            .ok_or_else(|| QueueError::EntryNotFound(job_id.to_string()))?;
        if entry.status != EntryStatus::Active {
            return Err(QueueError::EntryNotActive(job_id.to_string()));
        }
        let now = Utc::now();
        entry.status = EntryStatus::Completed { at: now };
        entry.percentage = 100;
        entry.updated_at = now;
        Ok(())
    }

    async fn ack_fail(
        &self,
        job_id: &str,
        error: &str,
        retryable: bool,
    ) -> QueueResult<FailOutcome> {
        let outcome = {
            let mut entries = self.entries.write();
            let entry = entries
                .get_mut(job_id)
                .ok_or_else(|| QueueError::EntryNotFound(job_id.to_string()))?;
            if entry.status != EntryStatus::Active {
                return Err(QueueError::EntryNotActive(job_id.to_string()));
            }
            let now = Utc::now();
            entry.last_error = Some(error.to_string());
            entry.updated_at = now;

            if retryable && entry.can_retry() {
                let run_at = self.backoff_run_at(entry.attempts, now);
                entry.status = EntryStatus::Delayed { run_at };
                FailOutcome::Retrying {
                    run_at,
                    attempt: entry.attempts,
                }
            } else {
                entry.status = EntryStatus::Failed {
                    at: now,
                    error: error.to_string(),
                };
                FailOutcome::Failed
            }
        };
        if matches!(outcome, FailOutcome::Retrying { .. }) {
            self.order.write().push_back(job_id.to_string());
        }
        Ok(outcome)
    }

    async fn set_percentage(&self, job_id: &str, percentage: u8) -> QueueResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(job_id)
            .ok_or_else(|| QueueError::EntryNotFound(job_id.to_string()))?;
        entry.percentage = percentage.min(100);
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, job_id: &str) -> QueueResult<Option<QueueEntry>> {
        Ok(self.entries.read().get(job_id).cloned())
    }

    async fn reap(&self) -> QueueResult<usize> {
        let now = Utc::now();
        let mut entries = self.entries.write();

        let mut completed: Vec<(String, DateTime<Utc>)> = Vec::new();
        let mut failed: Vec<(String, DateTime<Utc>)> = Vec::new();
        for (job_id, entry) in entries.iter() {
            match &entry.status {
                EntryStatus::Completed { at } => completed.push((job_id.clone(), *at)),
                EntryStatus::Failed { at, .. } => failed.push((job_id.clone(), *at)),
                _ => {}
            }
        }

        let mut drop_ids = Vec::new();
        collect_prunable(
            &mut drop_ids,
            completed,
            self.config.completed_count,
            self.config.completed_age,
            now,
        );
        collect_prunable(
            &mut drop_ids,
            failed,
            self.config.failed_count,
            self.config.failed_age,
            now,
        );

        for job_id in &drop_ids {
            entries.remove(job_id);
        }
        if !drop_ids.is_empty() {
            debug!(count = drop_ids.len(), "reaped terminal queue entries");
        }
        Ok(drop_ids.len())
    }

    async fn pending_len(&self) -> QueueResult<usize> {
        Ok(self
            .entries
            .read()
            .values()
            .filter(|e| matches!(e.status, EntryStatus::Waiting | EntryStatus::Delayed { .. }))
            .count())
    }
}

/// Entries beyond the count cap (newest kept) or past the age cap.
fn collect_prunable(
    drop_ids: &mut Vec<String>,
    mut terminal: Vec<(String, DateTime<Utc>)>,
    count_cap: usize,
    age_cap: std::time::Duration,
    now: DateTime<Utc>,
) {
    terminal.sort_by(|a, b| b.1.cmp(&a.1));
    let age_cap = ChronoDuration::from_std(age_cap).unwrap_or_else(|_| ChronoDuration::days(7));
    for (index, (job_id, at)) in terminal.into_iter().enumerate() {
        if index >= count_cap || now - at > age_cap {
            drop_ids.push(job_id);
        }
    }
}
