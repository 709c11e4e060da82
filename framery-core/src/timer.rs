use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

/// Operation types that are always logged, regardless of duration.
pub const API_CALL_OPERATIONS: &[&str] = &[
    "provider-call",
    "blob-upload",
    "blob-download",
    "http-download",
];

/// Handle for an in-flight timed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationToken(u64);

/// Hierarchical per-job timer.
///
/// A *step* is a named pipeline phase; at most one is active at a time.
/// *Operations* are finer-grained and may overlap, keyed by type.
/// Known API-call operation types are always logged on completion; other
/// operations only when they exceed the slow threshold.
pub struct PipelineTimer {
    job_id: String,
    slow_threshold: Duration,
    state: Mutex<TimerState>,
}

struct TimerState {
    started: Instant,
    current_step: Option<(String, Instant)>,
    steps: Vec<StepRecord>,
    operations: HashMap<String, OperationAggregate>,
    active: HashMap<u64, ActiveOperation>,
    next_token: u64,
}

struct StepRecord {
    name: String,
    duration: Duration,
}

struct ActiveOperation {
    op_type: String,
    label: Option<String>,
    started: Instant,
}

#[derive(Debug, Clone, Copy, Default)]
struct OperationAggregate {
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
}

impl OperationAggregate {
    fn record(&mut self, duration: Duration) {
        if self.count == 0 {
            self.min = duration;
            self.max = duration;
        } else {
            self.min = self.min.min(duration);
            self.max = self.max.max(duration);
        }
        self.count += 1;
        self.total += duration;
    }
}

impl PipelineTimer {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            slow_threshold: Duration::from_secs(2),
            state: Mutex::new(TimerState {
                started: Instant::now(),
                current_step: None,
                steps: Vec::new(),
                operations: HashMap::new(),
                active: HashMap::new(),
                next_token: 0,
            }),
        }
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Begin a named step, closing the previous one if still open.
    pub fn start_step(&self, name: impl Into<String>) {
        let mut state = self.state.lock();
        let now = Instant::now();
        if let Some((name, started)) = state.current_step.take() {
            let duration = now - started;
            state.steps.push(StepRecord { name, duration });
        }
        state.current_step = Some((name.into(), now));
    }

    /// Close the currently open step, if any.
    pub fn end_step(&self) {
        let mut state = self.state.lock();
        if let Some((name, started)) = state.current_step.take() {
            let duration = started.elapsed();
            state.steps.push(StepRecord { name, duration });
        }
    }

    /// Begin a labelled operation; many may be in flight at once.
    pub fn begin_operation(&self, op_type: &str, label: Option<&str>) -> OperationToken {
        let mut state = self.state.lock();
        let token = state.next_token;
        state.next_token += 1;
        state.active.insert(
            token,
            ActiveOperation {
                op_type: op_type.to_string(),
                label: label.map(str::to_string),
                started: Instant::now(),
            },
        );
        OperationToken(token)
    }

    /// Finish an operation, folding its duration into the aggregates.
    pub fn end_operation(&self, token: OperationToken) {
        self.end_operation_with(token, None);
    }

    pub fn end_operation_with(&self, token: OperationToken, metadata: Option<Value>) {
        let mut state = self.state.lock();
        let Some(op) = state.active.remove(&token.0) else {
            return;
        };
        let duration = op.started.elapsed();
        state
            .operations
            .entry(op.op_type.clone())
            .or_default()
            .record(duration);
        drop(state);

        if API_CALL_OPERATIONS.contains(&op.op_type.as_str()) {
            info!(
                job_id = %self.job_id,
                op_type = %op.op_type,
                label = op.label.as_deref().unwrap_or(""),
                duration_ms = duration.as_millis() as u64,
                metadata = metadata.map(|m| m.to_string()).unwrap_or_default(),
                "operation finished"
            );
        } else if duration >= self.slow_threshold {
            debug!(
                job_id = %self.job_id,
                op_type = %op.op_type,
                duration_ms = duration.as_millis() as u64,
                "slow operation"
            );
        }
    }

    /// Aggregate snapshot: per-operation stats sorted by total time
    /// descending, plus per-step totals in execution order.
    pub fn summary(&self) -> TimerSummary {
        let state = self.state.lock();
        let mut operations: Vec<OperationSummary> = state
            .operations
            .iter()
            .map(|(op_type, agg)| OperationSummary {
                op_type: op_type.clone(),
                count: agg.count,
                total: agg.total,
                avg: agg.total / agg.count.max(1) as u32,
                min: agg.min,
                max: agg.max,
            })
            .collect();
        operations.sort_by(|a, b| b.total.cmp(&a.total));

        let mut steps: Vec<StepSummary> = state
            .steps
            .iter()
            .map(|s| StepSummary {
                name: s.name.clone(),
                total: s.duration,
            })
            .collect();
        if let Some((name, started)) = &state.current_step {
            steps.push(StepSummary {
                name: name.clone(),
                total: started.elapsed(),
            });
        }

        TimerSummary {
            total: state.started.elapsed(),
            steps,
            operations,
        }
    }

    /// Log the summary at info level.
    pub fn log_summary(&self) {
        let summary = self.summary();
        info!(
            job_id = %self.job_id,
            total_ms = summary.total.as_millis() as u64,
            "pipeline timing"
        );
        for step in &summary.steps {
            info!(
                job_id = %self.job_id,
                step = %step.name,
                total_ms = step.total.as_millis() as u64,
                "step timing"
            );
        }
        for op in &summary.operations {
            info!(
                job_id = %self.job_id,
                op_type = %op.op_type,
                count = op.count,
                total_ms = op.total.as_millis() as u64,
                avg_ms = op.avg.as_millis() as u64,
                min_ms = op.min.as_millis() as u64,
                max_ms = op.max.as_millis() as u64,
                "operation timing"
            );
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimerSummary {
    pub total: Duration,
    pub steps: Vec<StepSummary>,
    pub operations: Vec<OperationSummary>,
}

#[derive(Debug, Clone)]
pub struct StepSummary {
    pub name: String,
    pub total: Duration,
}

#[derive(Debug, Clone)]
pub struct OperationSummary {
    pub op_type: String,
    pub count: u64,
    pub total: Duration,
    pub avg: Duration,
    pub min: Duration,
    pub max: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn steps_close_each_other() {
        let timer = PipelineTimer::new("job-1");
        timer.start_step("download");
        tokio::time::sleep(Duration::from_millis(5)).await;
        timer.start_step("extract");
        timer.end_step();

        let summary = timer.summary();
        assert_eq!(summary.steps.len(), 2);
        assert_eq!(summary.steps[0].name, "download");
        assert!(summary.steps[0].total >= Duration::from_millis(5));
    }

    #[tokio::test]
    async fn operations_aggregate_by_type() {
        let timer = PipelineTimer::new("job-1");
        for _ in 0..3 {
            let token = timer.begin_operation("blob-upload", Some("frame.jpg"));
            tokio::time::sleep(Duration::from_millis(2)).await;
            timer.end_operation(token);
        }
        let slow = timer.begin_operation("resize", None);
        timer.end_operation(slow);

        let summary = timer.summary();
        assert_eq!(summary.operations.len(), 2);
        let upload = summary
            .operations
            .iter()
            .find(|o| o.op_type == "blob-upload")
            .unwrap();
        assert_eq!(upload.count, 3);
        assert!(upload.min <= upload.avg && upload.avg <= upload.max);
        // Sorted by total descending.
        assert_eq!(summary.operations[0].op_type, "blob-upload");
    }

    #[test]
    fn ending_unknown_token_is_a_noop() {
        let timer = PipelineTimer::new("job-1");
        let token = timer.begin_operation("resize", None);
        timer.end_operation(token);
        timer.end_operation(token);
        assert_eq!(timer.summary().operations[0].count, 1);
    }
}
