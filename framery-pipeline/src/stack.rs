use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::Value;

use crate::processors::ids;

/// One step of a stack: a processor invocation with optional options.
#[derive(Debug, Clone, PartialEq)]
pub struct StackStep {
    pub processor_id: String,
    pub options: Option<Value>,
}

impl StackStep {
    pub fn new(processor_id: impl Into<String>) -> Self {
        Self {
            processor_id: processor_id.into(),
            options: None,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }
}

/// An ordered list of processor invocations.
#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    pub id: String,
    pub name: String,
    pub steps: Vec<StackStep>,
}

impl Stack {
    pub fn new(id: impl Into<String>, name: impl Into<String>, steps: Vec<StackStep>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            steps,
        }
    }

    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.processor_id.as_str()).collect()
    }
}

/// Fallback stack when neither the job nor the call site picks one.
pub const DEFAULT_STACK: &str = "product-frames";

/// Stack templates plus the strategy -> default-stack mapping.
///
/// The process-wide instance (see [`global`]) is populated once at
/// startup; tests build their own libraries.
#[derive(Default)]
pub struct StackLibrary {
    stacks: RwLock<HashMap<String, Stack>>,
    strategy_defaults: RwLock<HashMap<String, String>>,
}

impl StackLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// A library pre-loaded with the built-in templates.
    pub fn with_defaults() -> Self {
        let library = Self::new();
        library.install_defaults();
        library
    }

    pub fn install_defaults(&self) {
        self.register(product_frames_stack());
        self.register(frames_only_stack());
        self.register(minimal_stack());
        self.set_default_for_strategy("full", DEFAULT_STACK);
        self.set_default_for_strategy("frames", "frames-only");
    }

    pub fn register(&self, stack: Stack) {
        self.stacks.write().insert(stack.id.clone(), stack);
    }

    pub fn set_default_for_strategy(&self, strategy: impl Into<String>, stack_id: impl Into<String>) {
        self.strategy_defaults
            .write()
            .insert(strategy.into(), stack_id.into());
    }

    pub fn get(&self, id: &str) -> Option<Stack> {
        self.stacks.read().get(id).cloned()
    }

    pub fn has(&self, id: &str) -> bool {
        self.stacks.read().contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.stacks.read().keys().cloned().collect()
    }

    /// Default stack id for a strategy; unknown or missing strategies
    /// fall back to [`DEFAULT_STACK`].
    pub fn default_for(&self, strategy: Option<&str>) -> String {
        strategy
            .and_then(|s| self.strategy_defaults.read().get(s).cloned())
            .unwrap_or_else(|| DEFAULT_STACK.to_string())
    }

    /// Remove every template. Tests only.
    pub fn clear(&self) {
        self.stacks.write().clear();
        self.strategy_defaults.write().clear();
    }
}

static GLOBAL: Lazy<Arc<StackLibrary>> = Lazy::new(|| Arc::new(StackLibrary::new()));

/// Process-wide template table, populated once by the worker entry point.
pub fn global() -> Arc<StackLibrary> {
    GLOBAL.clone()
}

/// Install the built-in templates into the process-wide table.
pub fn install_default_stacks() {
    GLOBAL.install_defaults();
}

/// Full product pipeline: frames in, commercial images out.
fn product_frames_stack() -> Stack {
    Stack::new(
        "product-frames",
        "Product frames and commercial images",
        vec![
            StackStep::new(ids::DOWNLOAD),
            StackStep::new(ids::EXTRACT_FRAMES),
            StackStep::new(ids::SCORE_FRAMES),
            StackStep::new(ids::FILTER_BY_SCORE),
            StackStep::new(ids::PHOTOROOM_BG_REMOVE),
            StackStep::new(ids::CLASSIFY_FRAMES),
            StackStep::new(ids::EXTRACT_PRODUCT),
            StackStep::new(ids::UPLOAD_FRAMES),
            StackStep::new(ids::GENERATE_COMMERCIAL),
            StackStep::new(ids::COMPLETE_JOB),
        ],
    )
}

/// Frames pipeline without product extraction or commercial rendering.
fn frames_only_stack() -> Stack {
    Stack::new(
        "frames-only",
        "Curated frames only",
        vec![
            StackStep::new(ids::DOWNLOAD),
            StackStep::new(ids::EXTRACT_FRAMES),
            StackStep::new(ids::SCORE_FRAMES),
            StackStep::new(ids::FILTER_BY_SCORE),
            StackStep::new(ids::UPLOAD_FRAMES),
            StackStep::new(ids::COMPLETE_JOB),
        ],
    )
}

/// Smallest useful stack; mostly exercised by tests and smoke runs.
fn minimal_stack() -> Stack {
    Stack::new(
        "minimal",
        "Download and extract",
        vec![
            StackStep::new(ids::DOWNLOAD),
            StackStep::new(ids::EXTRACT_FRAMES),
            StackStep::new(ids::COMPLETE_JOB),
        ],
    )
}
