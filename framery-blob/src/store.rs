use async_trait::async_trait;
use bytes::Bytes;

use crate::BlobResult;

/// Shortest allowed presign expiry.
pub const MIN_EXPIRY_SECS: u64 = 60;
/// Longest expiry for user-upload presigns.
pub const MAX_UPLOAD_EXPIRY_SECS: u64 = 86_400;
/// Longest expiry for API-consumed presigns.
pub const MAX_API_EXPIRY_SECS: u64 = 3_600;

/// Clamp a user-upload presign expiry into `[60 s, 86400 s]`.
pub fn clamp_upload_expiry(expires_in_secs: u64) -> u64 {
    expires_in_secs.clamp(MIN_EXPIRY_SECS, MAX_UPLOAD_EXPIRY_SECS)
}

/// Clamp an API presign expiry into `[60 s, 3600 s]`.
pub fn clamp_api_expiry(expires_in_secs: u64) -> u64 {
    expires_in_secs.clamp(MIN_EXPIRY_SECS, MAX_API_EXPIRY_SECS)
}

/// Core blob operations the pipeline performs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a blob; returns its canonical URL.
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> BlobResult<String>;

    /// Fetch a blob's content.
    async fn get(&self, key: &str) -> BlobResult<Bytes>;

    /// Delete a blob; deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> BlobResult<()>;

    async fn exists(&self, key: &str) -> BlobResult<bool>;

    /// Presigned read URL; implementations apply [`clamp_api_expiry`].
    async fn sign_get(&self, key: &str, expires_in_secs: u64) -> BlobResult<String>;

    /// Presigned write URL for user uploads; implementations apply
    /// [`clamp_upload_expiry`].
    async fn sign_put(
        &self,
        key: &str,
        content_type: Option<&str>,
        expires_in_secs: u64,
    ) -> BlobResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiries_are_clamped_into_their_ranges() {
        assert_eq!(clamp_upload_expiry(1), 60);
        assert_eq!(clamp_upload_expiry(3_600), 3_600);
        assert_eq!(clamp_upload_expiry(1_000_000), 86_400);

        assert_eq!(clamp_api_expiry(0), 60);
        assert_eq!(clamp_api_expiry(600), 600);
        assert_eq!(clamp_api_expiry(86_400), 3_600);
    }
}
