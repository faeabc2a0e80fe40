//! Object storage operations trait
//!
//! `ObjectOperations` is the seam between the transfer engine and the
//! transport: the engine drives these primitives and never touches the
//! wire itself. `Client` implements the trait over the AWS SDK; tests
//! implement it in memory.

use crate::error::Result;
use crate::types::{CompleteMultipartResult, ObjectStat, PartTag};
use async_trait::async_trait;
use bytes::Bytes;

/// Primitives the transfer engine is built from
#[async_trait]
pub trait ObjectOperations: Send + Sync {
    /// Fetch object metadata (size, mtime, ETag). Fails with
    /// `StorageError::NotFound` when the object does not exist.
    async fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectStat>;

    /// Download the inclusive byte range `[start, end]` of an object
    async fn get_object_range(&self, bucket: &str, key: &str, start: u64, end: u64)
        -> Result<Bytes>;

    /// Upload a whole object in one request
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<()>;

    /// Download a whole object in one request
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes>;

    /// Delete an object
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Start a multipart upload session, returning its id
    async fn initiate_multipart(&self, bucket: &str, key: &str) -> Result<String>;

    /// Upload one part within a session, returning the part's ETag
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String>;

    /// Finalize a session from its accumulated part tags.
    /// Callers pass `parts` sorted by part number.
    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartTag],
    ) -> Result<CompleteMultipartResult>;

    /// Abort a session, discarding its uploaded parts
    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()>;
}
