//! # framery-blob: Object-Storage Surface
//!
//! The pipeline core touches object storage through a deliberately narrow
//! surface: put/get/delete plus presigned URLs. Real deployments back this
//! with S3-compatible storage; the in-memory backend here serves tests and
//! development.
//!
//! Key layout is fixed across backends:
//!
//! - `uploads/*` — user-uploaded source videos (cleanup candidates)
//! - `jobs/<jobId>/frames/*` — final frame selections
//! - `jobs/<jobId>/commercial/*` — commercial renders

pub mod error;
pub mod keys;
pub mod memory;
pub mod store;

pub use error::{BlobError, BlobResult};
pub use memory::MemoryBlobStore;
pub use store::{clamp_api_expiry, clamp_upload_expiry, BlobStore};
