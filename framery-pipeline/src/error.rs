use thiserror::Error;

use framery_core::{IoTag, RegistryError, StoreError};

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failures surfaced by the stack runner and the pipeline service
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid job configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown stack: {0}")]
    UnknownStack(String),

    #[error("processor not registered: {0}")]
    UnknownProcessor(String),

    #[error("swap {from} -> {to} is not IO-compatible")]
    IncompatibleSwap { from: String, to: String },

    #[error("insert anchor not found in stack: {0}")]
    UnknownAnchor(String),

    #[error(
        "stack '{stack}' invalid at step {index} ({processor}): requires '{tag}' but it is not available"
    )]
    Validation {
        stack: String,
        index: usize,
        processor: String,
        tag: IoTag,
    },

    #[error("processor '{processor}' failed: {message}")]
    StepFailed { processor: String, message: String },

    #[error("job cancelled")]
    Cancelled,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<RegistryError> for PipelineError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotRegistered(id) => Self::UnknownProcessor(id),
        }
    }
}
