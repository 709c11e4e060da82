//! The built-in processor set.
//!
//! Everything that talks to an external service does so through the
//! hooks in [`crate::providers`]; the processors here own the flow
//! shape: loading the frame spine, bounded fan-out, partial-failure
//! policy, progress reporting and envelope updates.

pub mod bg_remove;
pub mod classify_frames;
pub mod complete_job;
pub mod download;
pub mod extract_frames;
pub mod extract_product;
pub mod filter_by_score;
pub mod generate_commercial;
pub mod rotate_image;
pub mod score_frames;
pub mod upload_frames;

use std::sync::Arc;

use framery_blob::BlobStore;
use framery_core::{JobStore, Processor};

use crate::providers::Providers;

pub use bg_remove::BgRemoveProcessor;
pub use classify_frames::ClassifyFramesProcessor;
pub use complete_job::{derive_result, CompleteJobProcessor};
pub use download::DownloadProcessor;
pub use extract_frames::ExtractFramesProcessor;
pub use extract_product::ExtractProductProcessor;
pub use filter_by_score::FilterByScoreProcessor;
pub use generate_commercial::GenerateCommercialProcessor;
pub use rotate_image::RotateImageProcessor;
pub use score_frames::ScoreFramesProcessor;
pub use upload_frames::UploadFramesProcessor;

/// Processor ids, as used in stacks, swaps and inserts.
pub mod ids {
    pub const DOWNLOAD: &str = "download";
    pub const EXTRACT_FRAMES: &str = "extract-frames";
    pub const SCORE_FRAMES: &str = "score-frames";
    pub const FILTER_BY_SCORE: &str = "filter-by-score";
    pub const CLASSIFY_FRAMES: &str = "classify-frames";
    pub const PHOTOROOM_BG_REMOVE: &str = "photoroom-bg-remove";
    pub const CLAID_BG_REMOVE: &str = "claid-bg-remove";
    pub const ROTATE_IMAGE: &str = "rotate-image";
    pub const EXTRACT_PRODUCT: &str = "extract-product";
    pub const UPLOAD_FRAMES: &str = "upload-frames";
    pub const GENERATE_COMMERCIAL: &str = "generate-commercial";
    pub const COMPLETE_JOB: &str = "complete-job";
}

/// The full processor set, wired to its collaborators. Registered into
/// the process-wide registry at worker startup.
pub fn default_processors(
    store: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobStore>,
    providers: Providers,
) -> Vec<Arc<dyn Processor>> {
    vec![
        Arc::new(DownloadProcessor::new(blobs.clone())),
        Arc::new(ExtractFramesProcessor::new(providers.extractor.clone())),
        Arc::new(ScoreFramesProcessor::new(providers.scorer.clone())),
        Arc::new(FilterByScoreProcessor::new()),
        Arc::new(ClassifyFramesProcessor::new(providers.classifier.clone())),
        Arc::new(BgRemoveProcessor::photoroom(
            providers.background_remover.clone(),
        )),
        Arc::new(BgRemoveProcessor::claid(
            providers.background_remover.clone(),
        )),
        Arc::new(RotateImageProcessor::new()),
        Arc::new(ExtractProductProcessor::new(
            providers.product_extractor.clone(),
        )),
        Arc::new(UploadFramesProcessor::new(blobs.clone(), store.clone())),
        Arc::new(GenerateCommercialProcessor::new(
            providers.commercial_renderer.clone(),
            blobs,
        )),
        Arc::new(CompleteJobProcessor::new(store)),
    ]
}

/// Content type from a file extension, for blob uploads.
pub(crate) fn content_type_for(path: &std::path::Path) -> Option<&'static str> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => Some("image/jpeg"),
        Some("png") => Some("image/png"),
        Some("webp") => Some("image/webp"),
        Some("mp4") => Some("video/mp4"),
        Some("mov") => Some("video/quicktime"),
        _ => None,
    }
}
