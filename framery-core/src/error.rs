use thiserror::Error;

/// Result type for job store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the narrow job-row surface the pipeline touches
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("frame not found: {0}")]
    FrameNotFound(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors from registry lookups
#[derive(Error, Debug, Clone)]
pub enum RegistryError {
    #[error("processor not registered: {0}")]
    NotRegistered(String),
}

/// Operational failure returned by a processor's `execute`.
///
/// The message aborts the stack; optional structured details travel under
/// `metadata.extensions` when a processor chooses to record them.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ProcessorError {
    pub message: String,
    pub extensions: Option<serde_json::Value>,
}

impl ProcessorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: None,
        }
    }

    /// Attach structured details for diagnostics.
    pub fn with_extensions(mut self, extensions: serde_json::Value) -> Self {
        self.extensions = Some(extensions);
        self
    }
}

impl From<std::io::Error> for ProcessorError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processor_error_displays_message_only() {
        let err = ProcessorError::new("boom").with_extensions(serde_json::json!({"code": 42}));
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.extensions.unwrap()["code"], 42);
    }
}
