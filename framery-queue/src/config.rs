use std::time::Duration;

use framery_core::Settings;

/// Tunable queue behaviour; defaults match the documented knobs.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Delivery attempts per job before terminal failure.
    pub max_attempts: u32,
    /// Base redelivery backoff; attempt n waits `base * 2^(n-1)`.
    pub backoff_base: Duration,
    /// Age cap for retained completed entries.
    pub completed_age: Duration,
    /// Age cap for retained failed entries.
    pub failed_age: Duration,
    /// Count cap for retained completed entries.
    pub completed_count: usize,
    /// Count cap for retained failed entries.
    pub failed_count: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(5),
            completed_age: Duration::from_secs(86_400),
            failed_age: Duration::from_secs(604_800),
            completed_count: 100,
            failed_count: 1_000,
        }
    }
}

impl QueueConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.queue_job_attempts,
            backoff_base: settings.queue_backoff_delay,
            completed_age: settings.queue_completed_age,
            failed_age: settings.queue_failed_age,
            completed_count: settings.queue_completed_count,
            failed_count: settings.queue_failed_count,
        }
    }

    /// Backoff before redelivering attempt `attempt + 1`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base.saturating_mul(factor)
    }
}
