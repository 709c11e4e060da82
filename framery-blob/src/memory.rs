use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use crate::store::{clamp_api_expiry, clamp_upload_expiry, BlobStore};
use crate::{BlobError, BlobResult};

struct StoredObject {
    bytes: Bytes,
    #[allow(dead_code)]
    content_type: Option<String>,
}

/// In-memory backend for tests and development.
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    base_url: String,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::with_base_url("https://blobs.test")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            base_url: base_url.into(),
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    /// Test helper: number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Test helper: keys in the store.
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> BlobResult<String> {
        if key.is_empty() || key.starts_with('/') {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        debug!(%key, size = bytes.len(), "storing blob");
        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.map(str::to_string),
            },
        );
        Ok(self.url_for(key))
    }

    async fn get(&self, key: &str) -> BlobResult<Bytes> {
        self.objects
            .read()
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        self.objects.write().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        Ok(self.objects.read().contains_key(key))
    }

    async fn sign_get(&self, key: &str, expires_in_secs: u64) -> BlobResult<String> {
        let expires = clamp_api_expiry(expires_in_secs);
        Ok(format!("{}?expires={}", self.url_for(key), expires))
    }

    async fn sign_put(
        &self,
        key: &str,
        _content_type: Option<&str>,
        expires_in_secs: u64,
    ) -> BlobResult<String> {
        let expires = clamp_upload_expiry(expires_in_secs);
        Ok(format!("{}?expires={}&method=put", self.url_for(key), expires))
    }
}
