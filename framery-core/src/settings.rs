use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Runtime knobs for the pipeline core, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Number of concurrent worker tasks (`WORKER_CONCURRENCY`).
    pub worker_concurrency: usize,
    /// Whole-job timeout (`JOB_TIMEOUT_MS`).
    pub job_timeout: Duration,
    /// Per-attempt callback timeout (`CALLBACK_TIMEOUT_MS`).
    pub callback_timeout: Duration,
    /// Callback attempts (`CALLBACK_MAX_RETRIES`).
    pub callback_max_retries: u32,
    /// Callback host allow-list (`CALLBACK_ALLOWED_DOMAINS`, comma separated).
    pub callback_allowed_domains: Vec<String>,
    /// Base delay for external-call backoff (`API_RETRY_DELAY_MS`).
    pub api_retry_delay: Duration,
    /// Queue delivery attempts per job (`QUEUE_JOB_ATTEMPTS`).
    pub queue_job_attempts: u32,
    /// Base queue retry backoff (`QUEUE_BACKOFF_DELAY_MS`).
    pub queue_backoff_delay: Duration,
    /// Retention age for completed queue entries (`QUEUE_COMPLETED_AGE_SECONDS`).
    pub queue_completed_age: Duration,
    /// Retention age for failed queue entries (`QUEUE_FAILED_AGE_SECONDS`).
    pub queue_failed_age: Duration,
    /// Retention count for completed queue entries (`QUEUE_COMPLETED_COUNT`).
    pub queue_completed_count: usize,
    /// Retention count for failed queue entries (`QUEUE_FAILED_COUNT`).
    pub queue_failed_count: usize,
    /// Namespace under the system temp dir for work directories (`TEMP_DIR_NAME`).
    pub temp_dir_name: String,
    /// Deployment environment (`APP_ENV`); relaxes the callback guard in development.
    pub environment: String,
    /// Keep work directories after a run (`PIPELINE_DEBUG`). Developer aid only.
    pub keep_work_dirs: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            worker_concurrency: 2,
            job_timeout: Duration::from_millis(600_000),
            callback_timeout: Duration::from_millis(30_000),
            callback_max_retries: 3,
            callback_allowed_domains: Vec::new(),
            api_retry_delay: Duration::from_millis(1_000),
            queue_job_attempts: 3,
            queue_backoff_delay: Duration::from_millis(5_000),
            queue_completed_age: Duration::from_secs(86_400),
            queue_failed_age: Duration::from_secs(604_800),
            queue_completed_count: 100,
            queue_failed_count: 1_000,
            temp_dir_name: "framery".to_string(),
            environment: "development".to_string(),
            keep_work_dirs: false,
        }
    }
}

impl Settings {
    /// Load settings from the environment, falling back to defaults.
    /// Invalid numeric values log a warning and keep the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            worker_concurrency: env_parse("WORKER_CONCURRENCY", defaults.worker_concurrency),
            job_timeout: env_millis("JOB_TIMEOUT_MS", defaults.job_timeout),
            callback_timeout: env_millis("CALLBACK_TIMEOUT_MS", defaults.callback_timeout),
            callback_max_retries: env_parse("CALLBACK_MAX_RETRIES", defaults.callback_max_retries),
            callback_allowed_domains: env_list("CALLBACK_ALLOWED_DOMAINS"),
            api_retry_delay: env_millis("API_RETRY_DELAY_MS", defaults.api_retry_delay),
            queue_job_attempts: env_parse("QUEUE_JOB_ATTEMPTS", defaults.queue_job_attempts),
            queue_backoff_delay: env_millis("QUEUE_BACKOFF_DELAY_MS", defaults.queue_backoff_delay),
            queue_completed_age: env_secs(
                "QUEUE_COMPLETED_AGE_SECONDS",
                defaults.queue_completed_age,
            ),
            queue_failed_age: env_secs("QUEUE_FAILED_AGE_SECONDS", defaults.queue_failed_age),
            queue_completed_count: env_parse(
                "QUEUE_COMPLETED_COUNT",
                defaults.queue_completed_count,
            ),
            queue_failed_count: env_parse("QUEUE_FAILED_COUNT", defaults.queue_failed_count),
            temp_dir_name: env::var("TEMP_DIR_NAME").unwrap_or(defaults.temp_dir_name),
            environment: env::var("APP_ENV").unwrap_or(defaults.environment),
            keep_work_dirs: env_parse("PIPELINE_DEBUG", defaults.keep_work_dirs),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(%key, %raw, "invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_millis(key: &str, default: Duration) -> Duration {
    Duration::from_millis(env_parse(key, default.as_millis() as u64))
}

fn env_secs(key: &str, default: Duration) -> Duration {
    Duration::from_secs(env_parse(key, default.as_secs()))
}

fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
