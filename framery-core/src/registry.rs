use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::warn;

use crate::error::RegistryError;
use crate::io::IoTag;
use crate::processor::{Processor, ProcessorSummary};

/// Insertion-ordered map from processor id to processor instance.
///
/// The process-wide instance (see [`global`]) is populated once at
/// startup and treated as immutable afterwards; `clear` exists for
/// tests. Cloning shares the processor instances, so a snapshot of the
/// global is cheap.
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn Processor>>,
    order: Vec<String>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor. Overwriting an existing id logs a warning
    /// but still replaces the instance; the original position is kept.
    pub fn register(&mut self, processor: Arc<dyn Processor>) {
        let id = processor.id().to_string();
        if self.processors.insert(id.clone(), processor).is_some() {
            warn!(processor = %id, "overwriting registered processor");
        } else {
            self.order.push(id);
        }
    }

    pub fn register_all(&mut self, processors: impl IntoIterator<Item = Arc<dyn Processor>>) {
        for processor in processors {
            self.register(processor);
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Processor>> {
        self.processors.get(id).cloned()
    }

    pub fn get_or_err(&self, id: &str) -> Result<Arc<dyn Processor>, RegistryError> {
        self.get(id)
            .ok_or_else(|| RegistryError::NotRegistered(id.to_string()))
    }

    pub fn has(&self, id: &str) -> bool {
        self.processors.contains_key(id)
    }

    /// Registered ids in insertion order.
    pub fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Registered processors in insertion order.
    pub fn all(&self) -> Vec<Arc<dyn Processor>> {
        self.order
            .iter()
            .filter_map(|id| self.processors.get(id).cloned())
            .collect()
    }

    /// Processors whose `produces` contains the tag, in insertion order.
    pub fn producers(&self, tag: IoTag) -> Vec<Arc<dyn Processor>> {
        self.all()
            .into_iter()
            .filter(|p| p.io().produces.contains(&tag))
            .collect()
    }

    /// Processors whose `requires` contains the tag, in insertion order.
    pub fn consumers(&self, tag: IoTag) -> Vec<Arc<dyn Processor>> {
        self.all()
            .into_iter()
            .filter(|p| p.io().requires.contains(&tag))
            .collect()
    }

    /// True iff both ids are registered and have equal IO multisets.
    pub fn are_swappable(&self, a: &str, b: &str) -> bool {
        match (self.get(a), self.get(b)) {
            (Some(a), Some(b)) => a.io().matches(&b.io()),
            _ => false,
        }
    }

    pub fn summary(&self) -> Vec<ProcessorSummary> {
        self.all()
            .iter()
            .map(|p| {
                let io = p.io();
                ProcessorSummary {
                    id: p.id().to_string(),
                    display_name: p.display_name().to_string(),
                    requires: io.requires,
                    produces: io.produces,
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Remove every registration. Tests only.
    pub fn clear(&mut self) {
        self.processors.clear();
        self.order.clear();
    }
}

static GLOBAL: Lazy<RwLock<ProcessorRegistry>> =
    Lazy::new(|| RwLock::new(ProcessorRegistry::new()));

/// Process-wide registry, populated once by the worker entry point.
pub fn global() -> &'static RwLock<ProcessorRegistry> {
    &GLOBAL
}

/// Register the given processors into the process-wide registry.
pub fn install(processors: impl IntoIterator<Item = Arc<dyn Processor>>) {
    GLOBAL.write().register_all(processors);
}
