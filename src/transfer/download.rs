//! Checkpointed multipart download orchestrator

use crate::client::Client;
use crate::error::{Result, StorageError};
use crate::operations::ObjectOperations;
use crate::transfer::checkpoint::{Checkpoint, CheckpointStore, TargetStat, DOWNLOAD_MAGIC};
use crate::transfer::partition::{split_range, Part};
use crate::transfer::pool::{aggregate_results, run_pool};
use crate::transfer::{append_suffix, TransferRequest, DOWNLOAD_CHECKPOINT_SUFFIX};
use crate::types::ObjectStat;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

/// Result of a completed download
#[derive(Debug, Clone)]
pub struct DownloadResult {
    /// Source bucket
    pub bucket: String,

    /// Source object key
    pub key: String,

    /// Remote object metadata the download was taken against
    pub stat: ObjectStat,
}

/// Drives checkpointed multipart downloads against any
/// [`ObjectOperations`] implementation
pub struct Downloader {
    ops: Arc<dyn ObjectOperations>,
}

impl Downloader {
    /// Create a downloader over the given store
    pub fn new(ops: Arc<dyn ObjectOperations>) -> Self {
        Self { ops }
    }

    /// Download `request.bucket/request.key` into `request.local_file`,
    /// resuming from a checkpoint when one is present and still valid.
    ///
    /// Parts land in a `<local file>.tmp` sibling; only a fully
    /// assembled file is moved onto the destination, so the destination
    /// is never observed half-written. A pre-existing destination is
    /// replaced on success and untouched on failure.
    pub async fn transfer(&self, request: &TransferRequest) -> Result<DownloadResult> {
        request.validate()?;

        let checkpoint_path = request.checkpoint_path(DOWNLOAD_CHECKPOINT_SUFFIX);
        let temp_file = append_suffix(&request.local_file, "tmp");

        let (checkpoint, object) = self
            .load_or_build(request, &temp_file, checkpoint_path.as_deref())
            .await?;
        let parts = checkpoint.parts.clone();

        tracing::debug!(
            bucket = %request.bucket,
            key = %request.key,
            size = object.size,
            parts = parts.len(),
            pending = checkpoint.incomplete_count(),
            task_num = request.task_num,
            "starting download"
        );

        let store = Arc::new(CheckpointStore::new(checkpoint, checkpoint_path));
        store.dump().await?;

        let handler = {
            let ops = self.ops.clone();
            let bucket = request.bucket.clone();
            let key = request.key.clone();
            let temp_file = temp_file.clone();

            move |part: Part| {
                let ops = ops.clone();
                let bucket = bucket.clone();
                let key = key.clone();
                let temp_file = temp_file.clone();

                async move {
                    if part.size == 0 {
                        return Ok(None);
                    }

                    let data = ops
                        .get_object_range(&bucket, &key, part.offset, part.range_end())
                        .await?;
                    if data.len() as u64 != part.size {
                        return Err(StorageError::InvalidRange(format!(
                            "short range response for part {}: got {} bytes, expected {}",
                            part.number,
                            data.len(),
                            part.size
                        )));
                    }

                    write_part(&temp_file, part.offset, &data).await?;
                    Ok(None)
                }
            }
        };

        let results = run_pool(&parts, request.task_num, store.clone(), handler).await;
        aggregate_results(parts.len(), &results)?;

        finalize_into(&temp_file, &request.local_file).await?;
        store.remove_file().await;

        tracing::info!(
            bucket = %request.bucket,
            key = %request.key,
            size = object.size,
            "download complete"
        );

        Ok(DownloadResult {
            bucket: request.bucket.clone(),
            key: request.key.clone(),
            stat: object,
        })
    }

    /// Resume from a trustworthy checkpoint, or rebuild from scratch.
    /// The remote stat is the validity reference; a missing object also
    /// invalidates any lingering checkpoint before the error surfaces.
    async fn load_or_build(
        &self,
        request: &TransferRequest,
        temp_file: &Path,
        checkpoint_path: Option<&Path>,
    ) -> Result<(Checkpoint, ObjectStat)> {
        let object = match self.ops.stat_object(&request.bucket, &request.key).await {
            Ok(object) => object,
            Err(e) => {
                if let Some(path) = checkpoint_path {
                    remove_stale(path).await;
                }
                return Err(e);
            }
        };
        let fresh = TargetStat::of_object(&object);

        if let Some(path) = checkpoint_path {
            let temp_intact = temp_file_intact(temp_file, fresh.size).await;
            match CheckpointStore::load(path).await {
                Ok(checkpoint)
                    if temp_intact
                        && checkpoint.is_valid(DOWNLOAD_MAGIC, &fresh)
                        && checkpoint.matches_target(
                            &request.bucket,
                            &request.key,
                            &request.local_file,
                        ) =>
                {
                    tracing::debug!(
                        path = ?path,
                        pending = checkpoint.incomplete_count(),
                        "resuming download from checkpoint"
                    );
                    return Ok((checkpoint, object));
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

        let checkpoint = self.build_fresh(request, &fresh, temp_file).await?;
        Ok((checkpoint, object))
    }

    async fn build_fresh(
        &self,
        request: &TransferRequest,
        fresh: &TargetStat,
        temp_file: &Path,
    ) -> Result<Checkpoint> {
        let parts = split_range(fresh.size, request.part_size, 0);

        // Pre-size the temp file so every task can write its disjoint
        // range without coordination.
        let file = tokio::fs::File::create(temp_file).await?;
        file.set_len(fresh.size).await?;

        Ok(Checkpoint::new_download(
            request.local_file.clone(),
            request.bucket.clone(),
            request.key.clone(),
            fresh.clone(),
            parts,
        ))
    }
}

impl Client {
    /// Download an object as a checkpointed multipart transfer
    pub async fn download_file(&self, request: &TransferRequest) -> Result<DownloadResult> {
        Downloader::new(Arc::new(self.clone()))
            .transfer(request)
            .await
    }
}

/// Write one part's bytes at its offset. Each task opens its own handle,
/// and parts cover disjoint ranges, so concurrent writers need no lock.
async fn write_part(path: &Path, offset: u64, data: &Bytes) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
    file.seek(std::io::SeekFrom::Start(offset)).await?;
    file.write_all(data).await?;
    file.flush().await?;
    Ok(())
}

/// A checkpoint is only as good as the temp file holding its completed
/// parts; a vanished or resized temp file forces a rebuild.
async fn temp_file_intact(path: &Path, expected_size: u64) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.len() == expected_size,
        Err(_) => false,
    }
}

/// Move the assembled temp file onto the destination. Rename is the
/// atomic fast path; a cross-device rename falls back to copy + delete.
async fn finalize_into(temp_file: &Path, destination: &Path) -> Result<()> {
    match tokio::fs::rename(temp_file, destination).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::debug!(error = %e, "rename failed, falling back to copy");
            tokio::fs::copy(temp_file, destination).await?;
            tokio::fs::remove_file(temp_file).await?;
            Ok(())
        }
    }
}

async fn remove_stale(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::debug!(path = ?path, error = %e, "could not remove stale checkpoint");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_part_positions_correctly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dest.bin.tmp");
        let file = tokio::fs::File::create(&path).await.unwrap();
        file.set_len(10).await.unwrap();

        write_part(&path, 4, &Bytes::from_static(b"abc"))
            .await
            .unwrap();

        let contents = tokio::fs::read(&path).await.unwrap();
        assert_eq!(contents.len(), 10);
        assert_eq!(&contents[4..7], b"abc");
    }

    #[tokio::test]
    async fn test_temp_file_intact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dest.bin.tmp");

        assert!(!temp_file_intact(&path, 10).await);

        let file = tokio::fs::File::create(&path).await.unwrap();
        file.set_len(10).await.unwrap();
        assert!(temp_file_intact(&path, 10).await);
        assert!(!temp_file_intact(&path, 11).await);
    }

    #[tokio::test]
    async fn test_finalize_replaces_existing_destination() {
        let dir = tempdir().unwrap();
        let temp = dir.path().join("dest.bin.tmp");
        let dest = dir.path().join("dest.bin");

        tokio::fs::write(&temp, b"fresh contents").await.unwrap();
        tokio::fs::write(&dest, b"old contents").await.unwrap();

        finalize_into(&temp, &dest).await.unwrap();

        let contents = tokio::fs::read(&dest).await.unwrap();
        assert_eq!(&contents[..], b"fresh contents");
        assert!(!temp.exists());
    }
}
