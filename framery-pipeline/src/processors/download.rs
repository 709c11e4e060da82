use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use framery_blob::{keys, BlobStore};
use framery_core::{
    DataPatch, IoSpec, IoTag, JobStatus, PipelineData, Processor, ProcessorContext, ProcessorError,
};

use crate::processors::ids;
use crate::progress;

/// Materialises the source video into the job's work directory.
///
/// Managed keys (`s3://...` or managed http URLs) come from the blob
/// store; anything else is fetched over http(s).
pub struct DownloadProcessor {
    blobs: Arc<dyn BlobStore>,
    http: reqwest::Client,
}

impl DownloadProcessor {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            http: reqwest::Client::new(),
        }
    }

    fn dest_path(ctx: &ProcessorContext, url: &str) -> PathBuf {
        let name = url
            .rsplit('/')
            .next()
            .map(|n| n.split(['?', '#']).next().unwrap_or(n))
            .filter(|n| !n.is_empty())
            .unwrap_or("source.mp4");
        ctx.dirs.video.join(name)
    }
}

#[async_trait]
impl Processor for DownloadProcessor {
    fn id(&self) -> &str {
        ids::DOWNLOAD
    }

    fn display_name(&self) -> &str {
        "Download video"
    }

    fn status_key(&self) -> JobStatus {
        JobStatus::Processing
    }

    fn io(&self) -> IoSpec {
        IoSpec::new([IoTag::Video], [IoTag::Video])
    }

    async fn execute(
        &self,
        ctx: &ProcessorContext,
        data: &PipelineData,
        _options: Option<&Value>,
    ) -> Result<DataPatch, ProcessorError> {
        let mut video = data
            .video
            .clone()
            .ok_or_else(|| ProcessorError::new("no video source on the envelope"))?;
        let url = video
            .source_url
            .clone()
            .ok_or_else(|| ProcessorError::new("video source has no URL"))?;

        if ctx.is_cancelled() {
            return Err(ProcessorError::new("cancelled"));
        }

        let dest = Self::dest_path(ctx, &url);
        let bytes = if let Some(key) = keys::managed_key_from_url(&url) {
            let token = ctx.timer.begin_operation("blob-download", Some(&key));
            let bytes = self
                .blobs
                .get(&key)
                .await
                .map_err(|err| ProcessorError::new(format!("fetching {key}: {err}")))?;
            ctx.timer.end_operation(token);
            bytes
        } else if url.starts_with("http://") || url.starts_with("https://") {
            let token = ctx.timer.begin_operation("http-download", Some(&url));
            let response = self
                .http
                .get(&url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|err| ProcessorError::new(format!("fetching {url}: {err}")))?;
            let bytes = response
                .bytes()
                .await
                .map_err(|err| ProcessorError::new(format!("reading {url}: {err}")))?;
            ctx.timer.end_operation(token);
            bytes
        } else {
            return Err(ProcessorError::new(format!(
                "unsupported video source URL: {url}"
            )));
        };

        tokio::fs::write(&dest, &bytes).await?;
        debug!(
            job_id = %ctx.job_id(),
            path = %dest.display(),
            size = bytes.len(),
            "video downloaded"
        );

        ctx.report_percentage(JobStatus::Processing, progress::DOWNLOAD.end);
        video.local_path = Some(dest);
        Ok(DataPatch::empty().with_video(video))
    }
}
