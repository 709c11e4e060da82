use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Capability tags carried by the pipeline data envelope.
///
/// A tag asserts that the envelope currently holds a usable value for the
/// named kind of data, not that a field has a particular concrete type.
/// The set is closed: processors can only declare tags listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IoTag {
    /// A source video (remote URL and/or local file).
    #[serde(rename = "video")]
    Video,
    /// Frame image files on disk.
    #[serde(rename = "images")]
    Images,
    /// The frame spine: per-frame records with timestamps and flags.
    #[serde(rename = "frames")]
    Frames,
    /// Per-frame quality scores.
    #[serde(rename = "frames.scores")]
    FrameScores,
    /// Per-frame classification attributes.
    #[serde(rename = "frames.classifications")]
    FrameClassifications,
    /// Product cut-outs extracted from frames.
    #[serde(rename = "images.product")]
    ProductImages,
    /// Commercial renders derived from final frames.
    #[serde(rename = "images.commercial")]
    CommercialImages,
    /// Free-form text (prompts, captions).
    #[serde(rename = "text")]
    Text,
}

impl IoTag {
    /// Every tag in the vocabulary, in declaration order.
    pub const ALL: [IoTag; 8] = [
        IoTag::Video,
        IoTag::Images,
        IoTag::Frames,
        IoTag::FrameScores,
        IoTag::FrameClassifications,
        IoTag::ProductImages,
        IoTag::CommercialImages,
        IoTag::Text,
    ];

    /// Wire name of the tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            IoTag::Video => "video",
            IoTag::Images => "images",
            IoTag::Frames => "frames",
            IoTag::FrameScores => "frames.scores",
            IoTag::FrameClassifications => "frames.classifications",
            IoTag::ProductImages => "images.product",
            IoTag::CommercialImages => "images.commercial",
            IoTag::Text => "text",
        }
    }
}

impl fmt::Display for IoTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A capability set: the tags currently satisfied by the envelope.
pub type IoSet = BTreeSet<IoTag>;

/// IO declaration of a processor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoSpec {
    /// Tags that must be present before the processor runs.
    pub requires: Vec<IoTag>,
    /// Tags the processor makes satisfiable on success.
    pub produces: Vec<IoTag>,
}

impl IoSpec {
    pub fn new(requires: impl Into<Vec<IoTag>>, produces: impl Into<Vec<IoTag>>) -> Self {
        Self {
            requires: requires.into(),
            produces: produces.into(),
        }
    }

    /// Sorted copies of both tag lists, for multiset comparison.
    pub fn signature(&self) -> (Vec<IoTag>, Vec<IoTag>) {
        let mut requires = self.requires.clone();
        let mut produces = self.produces.clone();
        requires.sort();
        produces.sort();
        (requires, produces)
    }

    /// True iff both specs have equal `requires` and `produces` multisets.
    pub fn matches(&self, other: &IoSpec) -> bool {
        self.signature() == other.signature()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_wire_names_round_trip() {
        for tag in IoTag::ALL {
            let json = serde_json::to_string(&tag).unwrap();
            assert_eq!(json, format!("\"{}\"", tag.as_str()));
            let back: IoTag = serde_json::from_str(&json).unwrap();
            assert_eq!(back, tag);
        }
    }

    #[test]
    fn signature_ignores_declaration_order() {
        let a = IoSpec::new([IoTag::Frames, IoTag::Images], [IoTag::FrameScores]);
        let b = IoSpec::new([IoTag::Images, IoTag::Frames], [IoTag::FrameScores]);
        assert!(a.matches(&b));

        let c = IoSpec::new([IoTag::Images], [IoTag::FrameScores]);
        assert!(!a.matches(&c));
    }
}
