use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Infrastructure errors for queue operations
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    #[error("queue entry not found: {0}")]
    EntryNotFound(String),

    #[error("queue entry is not active: {0}")]
    EntryNotActive(String),

    #[error("worker pool is shutting down")]
    Shutdown,

    #[error("internal queue error: {0}")]
    Internal(String),
}

/// Callback delivery errors. Never fatal to the job.
#[derive(Error, Debug)]
pub enum CallbackError {
    #[error("invalid callback url: {0}")]
    InvalidUrl(String),

    #[error("callback url scheme must be http or https: {0}")]
    BadScheme(String),

    #[error("callback host not in allow-list: {0}")]
    HostNotAllowed(String),

    #[error("callback host resolves to a private address: {0}")]
    PrivateAddress(String),

    #[error("callback request failed: {0}")]
    Http(String),

    #[error("callback gave up after {attempts} attempts")]
    ExhaustedRetries { attempts: u32 },
}
