//! # framery-queue: Job Queue and Worker Pool
//!
//! Jobs enter as `{jobId}` payloads, deduplicated by job id. Workers pull
//! entries, load the job row, run the pipeline, and deliver the optional
//! completion callback. Failed deliveries retry with exponential backoff
//! up to a configured attempt budget; terminal entries are retained with
//! age and count caps and pruned by a reaper pass.

pub mod callback;
pub mod config;
pub mod error;
pub mod memory;
pub mod queue;
pub mod types;
pub mod worker;

pub use callback::{host_allowed, validate_callback_url, CallbackDispatcher};
pub use config::QueueConfig;
pub use error::{CallbackError, QueueError, QueueResult};
pub use memory::MemoryQueue;
pub use queue::{FailOutcome, JobQueue};
pub use types::{EntryStatus, QueueEntry, QueuePayload};
pub use worker::{JobRunner, WorkerHandle, WorkerPool, WorkerPoolConfig};
