use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use framery_core::job::InsertPosition;
use framery_core::{
    IoSet, IoTag, PipelineData, ProcessorContext, ProcessorRegistry, ProgressUpdate, StackOverlay,
};

use crate::error::{PipelineError, PipelineResult};
use crate::progress;
use crate::stack::{Stack, StackStep};

/// Outcome of validating a stack against an initial capability set.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub valid: bool,
    pub error: Option<String>,
    /// Capability set after the last step that could be reached.
    pub available_outputs: IoSet,
}

/// Validates, configures and executes stacks against a job context.
///
/// Execution order is exactly the configured step order, frozen at
/// `execute` entry; parallelism lives inside processors, never across
/// steps.
pub struct StackRunner {
    registry: Arc<ProcessorRegistry>,
}

impl StackRunner {
    pub fn new(registry: Arc<ProcessorRegistry>) -> Self {
        Self { registry }
    }

    /// Walk the steps, maintaining the capability set.
    fn check(&self, stack: &Stack, initial: &IoSet) -> Result<IoSet, PipelineError> {
        let mut available = initial.clone();
        for (index, step) in stack.steps.iter().enumerate() {
            let processor = self.registry.get_or_err(&step.processor_id)?;
            let io = processor.io();
            for tag in &io.requires {
                if !available.contains(tag) {
                    return Err(PipelineError::Validation {
                        stack: stack.id.clone(),
                        index,
                        processor: step.processor_id.clone(),
                        tag: *tag,
                    });
                }
            }
            available.extend(io.produces);
        }
        Ok(available)
    }

    /// Validate the stack's IO chain starting from `initial`.
    pub fn validate(&self, stack: &Stack, initial: &IoSet) -> ValidationReport {
        match self.check(stack, initial) {
            Ok(available_outputs) => ValidationReport {
                valid: true,
                error: None,
                available_outputs,
            },
            Err(err) => ValidationReport {
                valid: false,
                error: Some(err.to_string()),
                available_outputs: initial.clone(),
            },
        }
    }

    /// Minimal initial capability set the stack needs: every required
    /// tag not produced by an earlier step.
    pub fn required_inputs(&self, stack: &Stack) -> PipelineResult<Vec<IoTag>> {
        let mut produced = IoSet::new();
        let mut required = IoSet::new();
        for step in &stack.steps {
            let io = self.registry.get_or_err(&step.processor_id)?.io();
            for tag in &io.requires {
                if !produced.contains(tag) {
                    required.insert(*tag);
                }
            }
            produced.extend(io.produces);
        }
        Ok(required.into_iter().collect())
    }

    /// Capability set after executing the first `up_to_index + 1` steps,
    /// starting from the stack's required inputs.
    pub fn available_io(&self, stack: &Stack, up_to_index: usize) -> PipelineResult<IoSet> {
        let mut available: IoSet = self.required_inputs(stack)?.into_iter().collect();
        for step in stack.steps.iter().take(up_to_index + 1) {
            available.extend(self.registry.get_or_err(&step.processor_id)?.io().produces);
        }
        Ok(available)
    }

    /// Every swap must map between registered, IO-compatible processors.
    pub fn validate_swaps(&self, swaps: &HashMap<String, String>) -> PipelineResult<()> {
        for (from, to) in swaps {
            self.registry.get_or_err(from)?;
            self.registry.get_or_err(to)?;
            if !self.registry.are_swappable(from, to) {
                return Err(PipelineError::IncompatibleSwap {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
        }
        Ok(())
    }

    /// Produce the configured step list: swaps, then inserts (anchor
    /// ties broken by insertion order), then per-step option overlays.
    pub fn apply_config(&self, stack: &Stack, overlay: &StackOverlay) -> PipelineResult<Stack> {
        self.validate_swaps(&overlay.processor_swaps)?;

        let mut steps: Vec<(StackStep, Option<(String, InsertPosition)>)> = stack
            .steps
            .iter()
            .cloned()
            .map(|step| (step, None))
            .collect();

        for (step, _) in &mut steps {
            if let Some(to) = overlay.processor_swaps.get(&step.processor_id) {
                step.processor_id = to.clone();
            }
        }

        for insert in &overlay.insert_processors {
            let (anchor, position) = insert
                .anchor()
                .ok_or_else(|| PipelineError::UnknownAnchor("<unspecified>".to_string()))?;
            self.registry.get_or_err(&insert.processor)?;
            let anchor_index = steps
                .iter()
                .position(|(step, _)| step.processor_id == anchor)
                .ok_or_else(|| PipelineError::UnknownAnchor(anchor.to_string()))?;

            let mut at = match position {
                InsertPosition::Before => anchor_index,
                InsertPosition::After => anchor_index + 1,
            };
            // Later inserts with the same anchor land after earlier ones.
            while let Some((_, Some((a, p)))) = steps.get(at) {
                if a.as_str() == anchor && *p == position {
                    at += 1;
                } else {
                    break;
                }
            }

            steps.insert(
                at,
                (
                    StackStep {
                        processor_id: insert.processor.clone(),
                        options: insert.options.clone(),
                    },
                    Some((anchor.to_string(), position)),
                ),
            );
        }

        let mut steps: Vec<StackStep> = steps.into_iter().map(|(step, _)| step).collect();
        for step in &mut steps {
            if let Some(extra) = overlay.processor_options.get(&step.processor_id) {
                step.options = Some(merge_options(step.options.take(), extra.clone()));
            }
        }

        Ok(Stack::new(stack.id.clone(), stack.name.clone(), steps))
    }

    /// Configure, validate and run the stack over `data`.
    pub async fn execute(
        &self,
        stack: &Stack,
        ctx: &ProcessorContext,
        overlay: Option<&StackOverlay>,
        mut data: PipelineData,
    ) -> PipelineResult<PipelineData> {
        let configured = match overlay {
            Some(overlay) => self.apply_config(stack, overlay)?,
            None => stack.clone(),
        };

        let initial = data.capabilities();
        self.check(&configured, &initial)?;

        let total_steps = configured.steps.len() as u32;
        info!(
            job_id = %ctx.job_id(),
            stack = %configured.id,
            steps = total_steps,
            "executing stack"
        );

        for (index, step) in configured.steps.iter().enumerate() {
            if ctx.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let processor = self.registry.get_or_err(&step.processor_id)?;
            ctx.timer.start_step(processor.display_name());
            debug!(
                job_id = %ctx.job_id(),
                processor = %step.processor_id,
                step = index + 1,
                "executing step"
            );

            if let Some(band) = progress::band_for(processor.id()) {
                ctx.report_progress(
                    ProgressUpdate::new(processor.status_key(), band.start)
                        .with_step(index as u32 + 1, total_steps),
                );
            }

            match processor.execute(ctx, &data, step.options.as_ref()).await {
                Ok(patch) => data.apply(patch),
                Err(err) => {
                    ctx.timer.end_step();
                    if let Some(extensions) = &err.extensions {
                        debug!(
                            job_id = %ctx.job_id(),
                            processor = %step.processor_id,
                            %extensions,
                            "step failure details"
                        );
                    }
                    return Err(PipelineError::StepFailed {
                        processor: step.processor_id.clone(),
                        message: err.message,
                    });
                }
            }
        }

        ctx.timer.end_step();
        Ok(data)
    }
}

/// Merge step options with an overlay bag; the overlay wins at leaves,
/// objects merge key-wise.
fn merge_options(base: Option<Value>, overlay: Value) -> Value {
    match (base, overlay) {
        (Some(Value::Object(mut base)), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => merge_options(Some(existing), value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn option_overlay_wins_at_leaves() {
        let merged = merge_options(
            Some(json!({"a": {"keep": 1, "replace": 1}, "b": 2})),
            json!({"a": {"replace": 9}, "c": 3}),
        );
        assert_eq!(merged["a"]["keep"], 1);
        assert_eq!(merged["a"]["replace"], 9);
        assert_eq!(merged["b"], 2);
        assert_eq!(merged["c"], 3);
    }
}
