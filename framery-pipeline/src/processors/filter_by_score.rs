use std::cmp::Ordering;
use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use framery_core::{
    DataPatch, IoSpec, IoTag, JobStatus, PipelineData, Processor, ProcessorContext, ProcessorError,
};

use crate::processors::ids;
use crate::progress;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FilterOptions {
    top_k_percent: f64,
    min_frames: usize,
    max_frames: usize,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            top_k_percent: 0.2,
            min_frames: 3,
            max_frames: 24,
        }
    }
}

/// Keeps the top-scoring frames and marks them as the final selection.
///
/// Keeps `ceil(N * topKPercent)` bounded below by `minFrames` and above
/// by `maxFrames` (the upper bound wins when the two conflict), never
/// more than N. Missing scores count as 0; ties keep the original
/// frame order.
#[derive(Default)]
pub struct FilterByScoreProcessor;

impl FilterByScoreProcessor {
    pub fn new() -> Self {
        Self
    }

    fn parse_options(options: Option<&Value>) -> Result<FilterOptions, ProcessorError> {
        match options {
            None => Ok(FilterOptions::default()),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|err| ProcessorError::new(format!("invalid filter options: {err}"))),
        }
    }

    /// Indexes of the kept frames, in original order.
    fn select(frames_scores: &[Option<f64>], opts: &FilterOptions) -> HashSet<usize> {
        let n = frames_scores.len();
        // max-then-min stays total when the option bag carries
        // minFrames > maxFrames; the upper bound wins.
        let k = ((n as f64 * opts.top_k_percent).ceil() as usize)
            .max(opts.min_frames)
            .min(opts.max_frames)
            .min(n);

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            let score_a = frames_scores[a].unwrap_or(0.0);
            let score_b = frames_scores[b].unwrap_or(0.0);
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(Ordering::Equal)
                .then(a.cmp(&b))
        });
        order.into_iter().take(k).collect()
    }
}

#[async_trait]
impl Processor for FilterByScoreProcessor {
    fn id(&self) -> &str {
        ids::FILTER_BY_SCORE
    }

    fn display_name(&self) -> &str {
        "Filter frames by score"
    }

    fn status_key(&self) -> JobStatus {
        JobStatus::Scoring
    }

    fn io(&self) -> IoSpec {
        IoSpec::new([IoTag::Frames, IoTag::FrameScores], [IoTag::Frames])
    }

    async fn execute(
        &self,
        ctx: &ProcessorContext,
        data: &PipelineData,
        options: Option<&Value>,
    ) -> Result<DataPatch, ProcessorError> {
        let opts = Self::parse_options(options)?;
        let scores: Vec<Option<f64>> = data.frames.iter().map(|f| f.score).collect();
        let keep = Self::select(&scores, &opts);

        let frames: Vec<_> = data
            .frames
            .iter()
            .enumerate()
            .map(|(index, frame)| {
                let mut frame = frame.clone();
                frame.is_final_selection = keep.contains(&index);
                frame
            })
            .collect();

        info!(
            job_id = %ctx.job_id(),
            kept = keep.len(),
            total = frames.len(),
            "final frame selection"
        );
        ctx.report_percentage(JobStatus::Scoring, progress::SCORE_FRAMES.end);

        Ok(DataPatch::empty().with_frames(frames))
    }
}
