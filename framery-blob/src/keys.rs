//! Blob key conventions shared by every backend.

/// Prefix for user-uploaded source videos.
pub const UPLOADS_PREFIX: &str = "uploads/";
/// Prefix for per-job artifacts.
pub const JOBS_PREFIX: &str = "jobs/";

/// Key for an uploaded source video.
pub fn upload_key(file_name: &str) -> String {
    format!("{UPLOADS_PREFIX}{file_name}")
}

/// Key for a final frame of a job.
pub fn frame_key(job_id: &str, file_name: &str) -> String {
    format!("{JOBS_PREFIX}{job_id}/frames/{file_name}")
}

/// Key for a commercial render of a job.
pub fn commercial_key(job_id: &str, file_name: &str) -> String {
    format!("{JOBS_PREFIX}{job_id}/commercial/{file_name}")
}

/// True iff the key points at a user upload (source-video cleanup candidate).
pub fn is_upload_key(key: &str) -> bool {
    key.starts_with(UPLOADS_PREFIX)
}

/// Extract the managed storage key from a source URL, if it has one.
///
/// Understands `s3://bucket/key` and http(s) URLs whose path is a managed
/// key (`uploads/...` or `jobs/...`). Anything else is not ours to manage.
pub fn managed_key_from_url(url: &str) -> Option<String> {
    if let Some(rest) = url.strip_prefix("s3://") {
        let (_bucket, key) = rest.split_once('/')?;
        return is_managed(key).then(|| key.to_string());
    }
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let (_host, path) = rest.split_once('/')?;
    let key = path.split(['?', '#']).next().unwrap_or(path);
    is_managed(key).then(|| key.to_string())
}

fn is_managed(key: &str) -> bool {
    key.starts_with(UPLOADS_PREFIX) || key.starts_with(JOBS_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_builders_follow_conventions() {
        assert_eq!(upload_key("v.mp4"), "uploads/v.mp4");
        assert_eq!(frame_key("j1", "f0.jpg"), "jobs/j1/frames/f0.jpg");
        assert_eq!(
            commercial_key("j1", "f0-square.jpg"),
            "jobs/j1/commercial/f0-square.jpg"
        );
        assert!(is_upload_key("uploads/v.mp4"));
        assert!(!is_upload_key("jobs/j1/frames/f0.jpg"));
    }

    #[test]
    fn managed_keys_are_recognised_in_urls() {
        assert_eq!(
            managed_key_from_url("s3://bucket/uploads/v.mp4").as_deref(),
            Some("uploads/v.mp4")
        );
        assert_eq!(
            managed_key_from_url("https://blobs.test/jobs/j1/frames/f0.jpg?expires=60").as_deref(),
            Some("jobs/j1/frames/f0.jpg")
        );
        assert_eq!(managed_key_from_url("https://example.com/video.mp4"), None);
        assert_eq!(managed_key_from_url("ftp://host/uploads/v.mp4"), None);
    }
}
