use std::fmt;
use std::future::Future;

use futures::StreamExt;
use serde_json::Value;
use thiserror::Error;

/// Hard cap on intra-step fan-out, regardless of options.
pub const MAX_CONCURRENCY: usize = 50;

/// Failure of one slot in a bounded fan-out.
///
/// Errors land at their input index instead of aborting the batch;
/// consumers filter them out of the result vector.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("parallel task {index} failed: {message}")]
pub struct ParallelError {
    pub index: usize,
    pub message: String,
}

/// Map `f` over `items` with at most `concurrency` invocations in flight.
///
/// Results come back in input order, one slot per item; a failing slot
/// holds a [`ParallelError`] tagged with its index.
pub async fn parallel_map<T, U, E, F, Fut>(
    items: Vec<T>,
    concurrency: usize,
    f: F,
) -> Vec<Result<U, ParallelError>>
where
    F: Fn(T, usize) -> Fut,
    Fut: Future<Output = Result<U, E>>,
    E: fmt::Display,
{
    let tasks = items.into_iter().enumerate().map(|(index, item)| {
        let fut = f(item, index);
        async move {
            fut.await.map_err(|err| ParallelError {
                index,
                message: err.to_string(),
            })
        }
    });

    futures::stream::iter(tasks)
        .buffered(concurrency.max(1))
        .collect()
        .await
}

/// Split a fan-out result into successes and per-slot errors,
/// preserving order within each partition.
pub fn partition_results<U>(
    results: Vec<Result<U, ParallelError>>,
) -> (Vec<U>, Vec<ParallelError>) {
    let mut ok = Vec::new();
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(value) => ok.push(value),
            Err(err) => errors.push(err),
        }
    }
    (ok, errors)
}

/// Fan-out families with their own default limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConcurrencyKind {
    Download,
    Scoring,
    Classification,
    BackgroundRemoval,
    ProductExtraction,
    Upload,
    Generation,
}

impl ConcurrencyKind {
    pub fn default_limit(&self) -> usize {
        match self {
            ConcurrencyKind::Download => 4,
            ConcurrencyKind::Scoring => 8,
            ConcurrencyKind::Classification => 6,
            ConcurrencyKind::BackgroundRemoval => 4,
            ConcurrencyKind::ProductExtraction => 4,
            ConcurrencyKind::Upload => 8,
            ConcurrencyKind::Generation => 2,
        }
    }
}

/// Effective fan-out limit for a step.
///
/// Missing, non-numeric or non-positive `concurrency` options fall back
/// to the per-kind default; fractional values floor; the result is
/// clamped into `[1, MAX_CONCURRENCY]`.
pub fn resolve_concurrency(kind: ConcurrencyKind, options: Option<&Value>) -> usize {
    let fallback = kind.default_limit();
    let requested = options
        .and_then(|o| o.get("concurrency"))
        .and_then(Value::as_f64);
    match requested {
        Some(n) if n.is_finite() && n > 0.0 => (n.floor() as usize).clamp(1, MAX_CONCURRENCY),
        Some(_) => fallback,
        None => fallback,
    }
}
