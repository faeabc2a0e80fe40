//! Checkpointed multipart upload orchestrator

use crate::client::Client;
use crate::error::{Result, StorageError};
use crate::operations::ObjectOperations;
use crate::transfer::checkpoint::{Checkpoint, CheckpointStore, TargetStat, UPLOAD_MAGIC};
use crate::transfer::partition::{split_range, Part};
use crate::transfer::pool::{aggregate_results, run_pool};
use crate::transfer::{TransferRequest, UPLOAD_CHECKPOINT_SUFFIX};
use crate::types::PartTag;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Result of a completed upload
#[derive(Debug, Clone)]
pub struct UploadResult {
    /// Target bucket
    pub bucket: String,

    /// Target object key
    pub key: String,

    /// ETag of the assembled object
    pub etag: Option<String>,

    /// Location URL of the assembled object
    pub location: Option<String>,
}

/// Drives checkpointed multipart uploads against any [`ObjectOperations`]
/// implementation
pub struct Uploader {
    ops: Arc<dyn ObjectOperations>,
}

impl Uploader {
    /// Create an uploader over the given store
    pub fn new(ops: Arc<dyn ObjectOperations>) -> Self {
        Self { ops }
    }

    /// Upload `request.local_file` to `request.bucket/request.key` as a
    /// multipart session, resuming from a checkpoint when one is present
    /// and still valid.
    ///
    /// On partial failure the first failed part's error is returned and
    /// the checkpoint file is kept, so the next call re-transfers only
    /// the missing parts.
    pub async fn transfer(&self, request: &TransferRequest) -> Result<UploadResult> {
        request.validate()?;

        let fresh = TargetStat::of_local_file(&request.local_file).await?;
        let checkpoint_path = request.checkpoint_path(UPLOAD_CHECKPOINT_SUFFIX);

        let checkpoint = self
            .load_or_build(request, &fresh, checkpoint_path.as_deref())
            .await?;
        let upload_id = checkpoint.upload_id.clone().ok_or_else(|| {
            StorageError::MultipartUpload("checkpoint carries no session id".to_string())
        })?;
        let parts = checkpoint.parts.clone();

        tracing::debug!(
            bucket = %request.bucket,
            key = %request.key,
            parts = parts.len(),
            pending = checkpoint.incomplete_count(),
            task_num = request.task_num,
            "starting upload"
        );

        let store = Arc::new(CheckpointStore::new(checkpoint, checkpoint_path));
        store.dump().await?;

        let handler = {
            let ops = self.ops.clone();
            let bucket = request.bucket.clone();
            let key = request.key.clone();
            let local_file = request.local_file.clone();
            let upload_id = upload_id.clone();

            move |part: Part| {
                let ops = ops.clone();
                let bucket = bucket.clone();
                let key = key.clone();
                let local_file = local_file.clone();
                let upload_id = upload_id.clone();

                async move {
                    let data = read_part(&local_file, part.offset, part.size).await?;
                    let etag = ops
                        .upload_part(&bucket, &key, &upload_id, part.number, data)
                        .await?;
                    Ok(Some(PartTag::new(part.number, etag)))
                }
            }
        };

        let results = run_pool(&parts, request.task_num, store.clone(), handler).await;
        aggregate_results(parts.len(), &results)?;

        // Finalize: the service assembles the object from the sorted tags.
        let mut tags = store.part_tags().await;
        tags.sort_by_key(|t| t.part_number);

        let completed = self
            .ops
            .complete_multipart(&request.bucket, &request.key, &upload_id, &tags)
            .await?;

        store.remove_file().await;

        tracing::info!(
            bucket = %request.bucket,
            key = %request.key,
            size = fresh.size,
            "upload complete"
        );

        Ok(UploadResult {
            bucket: request.bucket.clone(),
            key: request.key.clone(),
            etag: completed.etag,
            location: completed.location,
        })
    }

    /// Resume from a trustworthy checkpoint, or rebuild from scratch.
    /// Unreadable or stale checkpoints are deleted and never fatal.
    async fn load_or_build(
        &self,
        request: &TransferRequest,
        fresh: &TargetStat,
        checkpoint_path: Option<&Path>,
    ) -> Result<Checkpoint> {
        if let Some(path) = checkpoint_path {
            match CheckpointStore::load(path).await {
                Ok(checkpoint)
                    if checkpoint.is_valid(UPLOAD_MAGIC, fresh)
                        && checkpoint.matches_target(
                            &request.bucket,
                            &request.key,
                            &request.local_file,
                        ) =>
                {
                    tracing::debug!(
                        path = ?path,
                        pending = checkpoint.incomplete_count(),
                        "resuming upload from checkpoint"
                    );
                    return Ok(checkpoint);
                }
                Ok(_) => {
                    tracing::warn!(path = ?path, "checkpoint is stale, rebuilding");
                    remove_stale(path).await;
                }
                Err(e) => {
                    tracing::debug!(path = ?path, error = %e, "checkpoint unusable, rebuilding");
                    remove_stale(path).await;
                }
            }
        }

        self.build_fresh(request, fresh).await
    }

    async fn build_fresh(
        &self,
        request: &TransferRequest,
        fresh: &TargetStat,
    ) -> Result<Checkpoint> {
        let parts = split_range(fresh.size, request.part_size, 1);
        let upload_id = self
            .ops
            .initiate_multipart(&request.bucket, &request.key)
            .await?;

        Ok(Checkpoint::new_upload(
            request.local_file.clone(),
            request.bucket.clone(),
            request.key.clone(),
            fresh.clone(),
            parts,
            upload_id,
        ))
    }
}

impl Client {
    /// Upload a local file as a checkpointed multipart transfer
    pub async fn upload_file(&self, request: &TransferRequest) -> Result<UploadResult> {
        Uploader::new(Arc::new(self.clone())).transfer(request).await
    }
}

/// Read exactly one part's span from the source file. Each task opens
/// its own handle, so no seek position is shared across tasks.
async fn read_part(path: &Path, offset: u64, size: u64) -> Result<Bytes> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(offset)).await?;

    let mut buffer = vec![0u8; size as usize];
    file.read_exact(&mut buffer).await?;
    Ok(Bytes::from(buffer))
}

async fn remove_stale(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::debug!(path = ?path, error = %e, "could not remove stale checkpoint");
    }
}
