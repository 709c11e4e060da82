//! Hooks for the external services the processors lean on.
//!
//! Concrete adapters (frame extraction via ffmpeg, scoring and
//! classification via a vision model, background removal, commercial
//! rendering) live outside this crate. Each hook has a no-op default so
//! the pipeline shape runs without any provider wired in: extraction
//! yields no frames, scoring and classification leave frames untouched,
//! and the image hooks report "unavailable", which keeps the original
//! image in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use framery_core::{Frame, ProcessorContext, ProcessorError};

/// One frame produced by an extractor.
#[derive(Debug, Clone)]
pub struct ExtractedFrame {
    pub path: PathBuf,
    pub timestamp_secs: f64,
    pub is_best_per_second: bool,
}

#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Extract candidate frames from `video` into `out_dir`.
    async fn extract(
        &self,
        ctx: &ProcessorContext,
        video: &Path,
        out_dir: &Path,
    ) -> Result<Vec<ExtractedFrame>, ProcessorError>;
}

#[async_trait]
pub trait FrameScorer: Send + Sync {
    /// Score one frame; `None` means the provider had no opinion.
    async fn score(
        &self,
        ctx: &ProcessorContext,
        frame: &Frame,
    ) -> Result<Option<f64>, ProcessorError>;
}

#[async_trait]
pub trait FrameClassifier: Send + Sync {
    /// Classify one frame; the attribute shape is provider-owned.
    async fn classify(
        &self,
        ctx: &ProcessorContext,
        frame: &Frame,
    ) -> Result<Option<Value>, ProcessorError>;
}

#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    /// `Ok(None)` means the provider is unavailable; the caller keeps
    /// the original image.
    async fn remove_background(
        &self,
        ctx: &ProcessorContext,
        frame: &Frame,
        out_dir: &Path,
    ) -> Result<Option<PathBuf>, ProcessorError>;
}

#[async_trait]
pub trait ProductExtractor: Send + Sync {
    /// Cut the product out of a frame; `Ok(None)` keeps the original.
    async fn extract_product(
        &self,
        ctx: &ProcessorContext,
        frame: &Frame,
        out_dir: &Path,
    ) -> Result<Option<PathBuf>, ProcessorError>;
}

#[async_trait]
pub trait CommercialRenderer: Send + Sync {
    /// Render one commercial version of a frame; `Ok(None)` skips it.
    async fn render(
        &self,
        ctx: &ProcessorContext,
        frame: &Frame,
        version: &str,
        out_dir: &Path,
    ) -> Result<Option<PathBuf>, ProcessorError>;
}

/// Stands in for every hook when no provider is configured.
pub struct NoopProvider;

#[async_trait]
impl FrameExtractor for NoopProvider {
    async fn extract(
        &self,
        _ctx: &ProcessorContext,
        _video: &Path,
        _out_dir: &Path,
    ) -> Result<Vec<ExtractedFrame>, ProcessorError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl FrameScorer for NoopProvider {
    async fn score(
        &self,
        _ctx: &ProcessorContext,
        _frame: &Frame,
    ) -> Result<Option<f64>, ProcessorError> {
        Ok(None)
    }
}

#[async_trait]
impl FrameClassifier for NoopProvider {
    async fn classify(
        &self,
        _ctx: &ProcessorContext,
        _frame: &Frame,
    ) -> Result<Option<Value>, ProcessorError> {
        Ok(None)
    }
}

#[async_trait]
impl BackgroundRemover for NoopProvider {
    async fn remove_background(
        &self,
        _ctx: &ProcessorContext,
        _frame: &Frame,
        _out_dir: &Path,
    ) -> Result<Option<PathBuf>, ProcessorError> {
        Ok(None)
    }
}

#[async_trait]
impl ProductExtractor for NoopProvider {
    async fn extract_product(
        &self,
        _ctx: &ProcessorContext,
        _frame: &Frame,
        _out_dir: &Path,
    ) -> Result<Option<PathBuf>, ProcessorError> {
        Ok(None)
    }
}

#[async_trait]
impl CommercialRenderer for NoopProvider {
    async fn render(
        &self,
        _ctx: &ProcessorContext,
        _frame: &Frame,
        _version: &str,
        _out_dir: &Path,
    ) -> Result<Option<PathBuf>, ProcessorError> {
        Ok(None)
    }
}

/// Bundle of the provider hooks the processor set is built from.
#[derive(Clone)]
pub struct Providers {
    pub extractor: Arc<dyn FrameExtractor>,
    pub scorer: Arc<dyn FrameScorer>,
    pub classifier: Arc<dyn FrameClassifier>,
    pub background_remover: Arc<dyn BackgroundRemover>,
    pub product_extractor: Arc<dyn ProductExtractor>,
    pub commercial_renderer: Arc<dyn CommercialRenderer>,
}

impl Default for Providers {
    fn default() -> Self {
        let noop = Arc::new(NoopProvider);
        Self {
            extractor: noop.clone(),
            scorer: noop.clone(),
            classifier: noop.clone(),
            background_remover: noop.clone(),
            product_extractor: noop.clone(),
            commercial_renderer: noop,
        }
    }
}
