use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::io::{IoSet, IoTag};

/// Metadata key holding the final job result.
pub const META_RESULT: &str = "result";
/// Metadata key holding the token-usage summary.
pub const META_TOKEN_USAGE: &str = "tokenUsage";
/// Metadata key holding the commercial-image URL map.
pub const META_COMMERCIAL_URLS: &str = "commercialImageUrls";
/// Metadata key holding structured failure details.
pub const META_EXTENSIONS: &str = "extensions";

/// Source video descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoSource {
    /// Where the video came from (s3 key URL or http URL).
    pub source_url: Option<String>,
    /// Local path once downloaded into the job's work directory.
    pub local_path: Option<PathBuf>,
    /// Probe metadata (duration, dimensions), shape owned by the extractor.
    pub metadata: Option<Value>,
}

impl VideoSource {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            source_url: Some(url.into()),
            ..Self::default()
        }
    }
}

/// One frame in the envelope's spine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub id: String,
    pub path: PathBuf,
    pub remote_url: Option<String>,
    pub timestamp_secs: f64,
    pub score: Option<f64>,
    pub classification: Option<Value>,
    pub is_best_per_second: bool,
    pub is_final_selection: bool,
    /// Persistent row id, when the frame has been recorded by the store.
    pub db_id: Option<String>,
}

impl Frame {
    pub fn new(path: impl Into<PathBuf>, timestamp_secs: f64) -> Self {
        let id = Uuid::new_v4().to_string();
        Self {
            db_id: Some(id.clone()),
            id,
            path: path.into(),
            remote_url: None,
            timestamp_secs,
            score: None,
            classification: None,
            is_best_per_second: false,
            is_final_selection: false,
        }
    }
}

/// A commercial render derived from a final frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommercialImage {
    pub frame_id: String,
    pub version: String,
    pub path: Option<PathBuf>,
    pub remote_url: Option<String>,
}

/// The mutable accumulator threaded through processors for one job.
///
/// The `frames` field is the single authoritative frame spine; processors
/// read and replace it rather than stashing copies under `metadata`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineData {
    pub video: Option<VideoSource>,
    pub frames: Vec<Frame>,
    pub commercial_images: Vec<CommercialImage>,
    /// Free-form auxiliary values (result, token usage, extensions).
    pub metadata: Map<String, Value>,
}

impl PipelineData {
    pub fn with_video_url(url: impl Into<String>) -> Self {
        Self {
            video: Some(VideoSource::from_url(url)),
            ..Self::default()
        }
    }

    /// Infer the capability set currently satisfied by the envelope.
    pub fn capabilities(&self) -> IoSet {
        let mut set = IoSet::new();
        if let Some(video) = &self.video {
            if video.source_url.is_some() || video.local_path.is_some() {
                set.insert(IoTag::Video);
            }
        }
        if !self.frames.is_empty() {
            set.insert(IoTag::Frames);
            set.insert(IoTag::Images);
            if self.frames.iter().any(|f| f.score.is_some()) {
                set.insert(IoTag::FrameScores);
            }
            if self.frames.iter().any(|f| f.classification.is_some()) {
                set.insert(IoTag::FrameClassifications);
            }
        }
        if !self.commercial_images.is_empty() {
            set.insert(IoTag::CommercialImages);
        }
        set
    }

    /// Frames marked as the final selection.
    pub fn final_frames(&self) -> Vec<&Frame> {
        self.frames.iter().filter(|f| f.is_final_selection).collect()
    }

    /// Merge a processor's patch: shallow replacement at the top level,
    /// key-wise deep merge for `metadata`.
    pub fn apply(&mut self, patch: DataPatch) {
        if let Some(video) = patch.video {
            self.video = Some(video);
        }
        if let Some(frames) = patch.frames {
            self.frames = frames;
        }
        if let Some(commercial) = patch.commercial_images {
            self.commercial_images = commercial;
        }
        if let Some(metadata) = patch.metadata {
            deep_merge(&mut self.metadata, metadata);
        }
    }
}

/// Additions/replacements a processor returns on success.
///
/// `None` fields leave the envelope untouched.
#[derive(Debug, Clone, Default)]
pub struct DataPatch {
    pub video: Option<VideoSource>,
    pub frames: Option<Vec<Frame>>,
    pub commercial_images: Option<Vec<CommercialImage>>,
    pub metadata: Option<Map<String, Value>>,
}

impl DataPatch {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_video(mut self, video: VideoSource) -> Self {
        self.video = Some(video);
        self
    }

    pub fn with_frames(mut self, frames: Vec<Frame>) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn with_commercial_images(mut self, images: Vec<CommercialImage>) -> Self {
        self.commercial_images = Some(images);
        self
    }

    pub fn with_metadata_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }
}

/// Key-wise merge: objects merge recursively, everything else replaces.
fn deep_merge(dest: &mut Map<String, Value>, src: Map<String, Value>) {
    for (key, value) in src {
        match (dest.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                dest.insert(key, value);
            }
        }
    }
}
