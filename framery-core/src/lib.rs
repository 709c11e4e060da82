//! # framery-core: Pipeline Model for the Framery Backend
//!
//! Framery turns uploaded product videos into a curated set of product
//! frames and commercial-ready images. This crate holds the pieces every
//! other Framery crate builds on:
//!
//! - **IO tags** — the closed capability vocabulary processors declare
//! - **Processor contract** — id, display name, status key, IO declaration
//!   and an async `execute` over the pipeline data envelope
//! - **Processor registry** — insertion-ordered, populated once at startup
//! - **Job model** — the persistent job row, its status lifecycle, the
//!   final job result, and the stack configuration overlay
//! - **Job store surface** — the narrow row-update trait the pipeline
//!   touches, with an in-memory reference backend
//! - **Shared primitives** — bounded parallel map, the per-job pipeline
//!   timer, and the token-usage tracker

pub mod context;
pub mod data;
pub mod error;
pub mod io;
pub mod job;
pub mod parallel;
pub mod processor;
pub mod registry;
pub mod settings;
pub mod store;
pub mod timer;
pub mod usage;
pub mod workdir;

pub use context::{ProcessorContext, ProgressFn};
pub use data::{CommercialImage, DataPatch, Frame, PipelineData, VideoSource};
pub use error::{ProcessorError, RegistryError, StoreError, StoreResult};
pub use io::{IoSet, IoSpec, IoTag};
pub use job::{
    InsertSpec, JobConfig, JobRecord, JobResult, JobStatus, ProgressUpdate, StackOverlay,
};
pub use parallel::{
    parallel_map, partition_results, resolve_concurrency, ConcurrencyKind, ParallelError,
    MAX_CONCURRENCY,
};
pub use processor::{Processor, ProcessorSummary};
pub use registry::ProcessorRegistry;
pub use settings::Settings;
pub use store::{JobStore, MemoryJobStore};
pub use timer::{OperationToken, PipelineTimer, TimerSummary};
pub use usage::{TokenUsage, TokenUsageTracker, UsageSummary};
pub use workdir::WorkDirs;

/// Commonly used imports for crates building on framery-core.
pub mod prelude {
    pub use crate::context::{ProcessorContext, ProgressFn};
    pub use crate::data::{DataPatch, Frame, PipelineData};
    pub use crate::error::ProcessorError;
    pub use crate::io::{IoSet, IoSpec, IoTag};
    pub use crate::job::{JobConfig, JobRecord, JobResult, JobStatus, ProgressUpdate};
    pub use crate::processor::Processor;
    pub use crate::registry::ProcessorRegistry;
    pub use crate::store::JobStore;

    pub use async_trait::async_trait;
}
