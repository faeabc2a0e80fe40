//! Persisted transfer checkpoints
//!
//! A checkpoint records enough state to resume an interrupted multipart
//! transfer: the target's identity, a stat snapshot taken when the
//! attempt started, the full part list with completion flags, and (for
//! uploads) the session id and accumulated part ETags. It is persisted
//! after every completed part, so a crash loses at most one part of
//! work.
//!
//! The file is an engine-private blob: a typed JSON record carrying a
//! format magic and a SHA-256 content hash. Anything that fails to
//! deserialize into the expected shape, or whose hash or magic does not
//! match, is discarded and the transfer starts fresh.

use crate::error::{Result, StorageError};
use crate::transfer::partition::Part;
use crate::types::{ObjectStat, PartTag};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::Mutex;

/// Format tag for upload checkpoints
pub(crate) const UPLOAD_MAGIC: &str = "cirrus:upload:1";

/// Format tag for download checkpoints
pub(crate) const DOWNLOAD_MAGIC: &str = "cirrus:download:1";

/// Snapshot of the transfer target taken at checkpoint creation:
/// the remote object for downloads, the local file for uploads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetStat {
    /// Target size in bytes
    pub size: u64,

    /// Modification timestamp
    pub modified: Option<SystemTime>,

    /// Content digest (remote ETag for downloads; not computed for
    /// local files, where size + mtime carry the staleness signal)
    pub digest: Option<String>,
}

impl TargetStat {
    /// Stat a local file (upload target)
    pub async fn of_local_file(path: &Path) -> Result<Self> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(Self {
            size: meta.len(),
            modified: meta.modified().ok(),
            digest: None,
        })
    }

    /// Snapshot a remote object stat (download target)
    pub fn of_object(stat: &ObjectStat) -> Self {
        Self {
            size: stat.size,
            modified: stat.last_modified,
            digest: stat.etag.clone(),
        }
    }
}

/// Resumable transfer state, one per in-flight transfer attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Format tag distinguishing upload/download checkpoints and versions
    magic: String,

    /// SHA-256 over the rest of the record, verified on load
    content_hash: String,

    /// Local file participating in the transfer
    pub local_file: PathBuf,

    /// Target bucket
    pub bucket: String,

    /// Target object key
    pub key: String,

    /// Target snapshot at checkpoint creation
    pub target_stat: TargetStat,

    /// Part list; membership is fixed for the attempt, only `completed`
    /// flags (and upload tags) mutate
    pub parts: Vec<Part>,

    /// Multipart session id (uploads only)
    pub upload_id: Option<String>,

    /// Accumulated part ETags needed to finalize (uploads only)
    pub part_tags: Vec<PartTag>,
}

impl Checkpoint {
    /// Create a fresh upload checkpoint
    pub fn new_upload(
        local_file: PathBuf,
        bucket: String,
        key: String,
        target_stat: TargetStat,
        parts: Vec<Part>,
        upload_id: String,
    ) -> Self {
        Self {
            magic: UPLOAD_MAGIC.to_string(),
            content_hash: String::new(),
            local_file,
            bucket,
            key,
            target_stat,
            parts,
            upload_id: Some(upload_id),
            part_tags: Vec::new(),
        }
    }

    /// Create a fresh download checkpoint
    pub fn new_download(
        local_file: PathBuf,
        bucket: String,
        key: String,
        target_stat: TargetStat,
        parts: Vec<Part>,
    ) -> Self {
        Self {
            magic: DOWNLOAD_MAGIC.to_string(),
            content_hash: String::new(),
            local_file,
            bucket,
            key,
            target_stat,
            parts,
            upload_id: None,
            part_tags: Vec::new(),
        }
    }

    /// SHA-256 hex over the record with the hash field emptied
    fn structural_hash(&self) -> Result<String> {
        let mut probe = self.clone();
        probe.content_hash = String::new();
        let bytes = serde_json::to_vec(&probe)
            .map_err(|e| StorageError::Checkpoint(format!("serialization failed: {}", e)))?;
        let digest = Sha256::digest(&bytes);
        Ok(hex::encode(digest))
    }

    /// Recompute and store the content hash (called before every dump)
    fn seal(&mut self) -> Result<()> {
        self.content_hash = self.structural_hash()?;
        Ok(())
    }

    /// Validity gate: the checkpoint may be trusted only if its magic
    /// and content hash check out and the target has not changed since
    /// it was written
    pub fn is_valid(&self, expected_magic: &str, fresh: &TargetStat) -> bool {
        if self.magic != expected_magic {
            return false;
        }
        match self.structural_hash() {
            Ok(hash) => self.content_hash == hash && self.target_stat == *fresh,
            Err(_) => false,
        }
    }

    /// Check the checkpoint describes the same transfer as the request
    pub fn matches_target(&self, bucket: &str, key: &str, local_file: &Path) -> bool {
        self.bucket == bucket && self.key == key && self.local_file == local_file
    }

    /// Number of parts still awaiting transfer
    pub fn incomplete_count(&self) -> usize {
        self.parts.iter().filter(|p| !p.completed).count()
    }

    fn mark_completed(&mut self, number: i32, tag: Option<PartTag>) -> Result<()> {
        let part = self
            .parts
            .iter_mut()
            .find(|p| p.number == number)
            .ok_or_else(|| {
                StorageError::Checkpoint(format!("unknown part number {}", number))
            })?;
        part.completed = true;

        if let Some(tag) = tag {
            self.part_tags.retain(|t| t.part_number != tag.part_number);
            self.part_tags.push(tag);
        }

        Ok(())
    }
}

/// Shared, internally synchronized holder for one transfer's checkpoint.
///
/// All mutation goes through `complete_part`, which marks the part and
/// persists under a single lock hold, so concurrent part tasks can never
/// lose a completion flag or interleave a partially-updated file.
pub struct CheckpointStore {
    inner: Mutex<Checkpoint>,
    path: Option<PathBuf>,
}

impl CheckpointStore {
    /// Wrap a checkpoint; `path` is None when checkpointing is disabled
    pub fn new(checkpoint: Checkpoint, path: Option<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(checkpoint),
            path,
        }
    }

    /// Load a checkpoint from disk. Every failure mode (missing file,
    /// unreadable, foreign or truncated content) comes back as
    /// `StorageError::Checkpoint`; callers discard and rebuild.
    pub async fn load(path: &Path) -> Result<Checkpoint> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::Checkpoint(format!("cannot read {:?}: {}", path, e)))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::Checkpoint(format!("cannot parse {:?}: {}", path, e)))
    }

    /// Persist the current state if checkpointing is enabled.
    /// Failure here is fatal to the transfer.
    pub async fn dump(&self) -> Result<()> {
        let mut checkpoint = self.inner.lock().await;
        if let Some(path) = &self.path {
            Self::write_atomic(&mut checkpoint, path).await?;
        }
        Ok(())
    }

    /// Mark one part completed (recording its tag for uploads) and
    /// persist, all under one lock hold
    pub async fn complete_part(&self, number: i32, tag: Option<PartTag>) -> Result<()> {
        let mut checkpoint = self.inner.lock().await;
        checkpoint.mark_completed(number, tag)?;
        if let Some(path) = &self.path {
            Self::write_atomic(&mut checkpoint, path).await?;
        }
        Ok(())
    }

    /// Accumulated upload part tags
    pub async fn part_tags(&self) -> Vec<PartTag> {
        self.inner.lock().await.part_tags.clone()
    }

    /// Clone of the current checkpoint state
    pub async fn snapshot(&self) -> Checkpoint {
        self.inner.lock().await.clone()
    }

    /// Delete the checkpoint file after a successful transfer.
    /// Best effort: the transfer already succeeded, a leftover file
    /// will fail the validity gate on the next call anyway.
    pub async fn remove_file(&self) {
        if let Some(path) = &self.path {
            if let Err(e) = tokio::fs::remove_file(path).await {
                tracing::debug!(path = ?path, error = %e, "could not remove checkpoint file");
            }
        }
    }

    /// Seal and write the checkpoint, then rename over the target so a
    /// reader never observes a partially-written file
    async fn write_atomic(checkpoint: &mut Checkpoint, path: &Path) -> Result<()> {
        checkpoint.seal()?;

        let json = serde_json::to_vec_pretty(&*checkpoint)
            .map_err(|e| StorageError::Io(format!("checkpoint serialization failed: {}", e)))?;

        let tmp = scratch_path(path);
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

/// Sibling scratch path for the write-then-rename dance
fn scratch_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".new");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::partition::split_range;
    use tempfile::tempdir;

    fn sample_stat() -> TargetStat {
        TargetStat {
            size: 1000,
            modified: Some(SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000)),
            digest: Some("etag-1".to_string()),
        }
    }

    fn sample_upload_checkpoint() -> Checkpoint {
        Checkpoint::new_upload(
            PathBuf::from("/data/big.bin"),
            "my-bucket".to_string(),
            "remote/big.bin".to_string(),
            sample_stat(),
            split_range(1000, 300, 1),
            "session-42".to_string(),
        )
    }

    #[tokio::test]
    async fn test_dump_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin.ucp");

        let store = CheckpointStore::new(sample_upload_checkpoint(), Some(path.clone()));
        store.dump().await.unwrap();

        let loaded = CheckpointStore::load(&path).await.unwrap();
        assert!(loaded.is_valid(UPLOAD_MAGIC, &sample_stat()));
        assert_eq!(loaded.bucket, "my-bucket");
        assert_eq!(loaded.key, "remote/big.bin");
        assert_eq!(loaded.parts.len(), 4);
        assert_eq!(loaded.upload_id.as_deref(), Some("session-42"));
        assert_eq!(loaded.incomplete_count(), 4);
    }

    #[tokio::test]
    async fn test_complete_part_persists_progress() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin.ucp");

        let store = CheckpointStore::new(sample_upload_checkpoint(), Some(path.clone()));
        store.dump().await.unwrap();
        store
            .complete_part(2, Some(PartTag::new(2, "etag-p2".to_string())))
            .await
            .unwrap();

        let loaded = CheckpointStore::load(&path).await.unwrap();
        assert!(loaded.is_valid(UPLOAD_MAGIC, &sample_stat()));
        assert_eq!(loaded.incomplete_count(), 3);
        assert!(loaded.parts.iter().any(|p| p.number == 2 && p.completed));
        assert_eq!(loaded.part_tags, vec![PartTag::new(2, "etag-p2".to_string())]);
    }

    #[tokio::test]
    async fn test_complete_part_replaces_duplicate_tag() {
        let store = CheckpointStore::new(sample_upload_checkpoint(), None);
        store
            .complete_part(1, Some(PartTag::new(1, "first".to_string())))
            .await
            .unwrap();
        store
            .complete_part(1, Some(PartTag::new(1, "second".to_string())))
            .await
            .unwrap();

        let tags = store.part_tags().await;
        assert_eq!(tags, vec![PartTag::new(1, "second".to_string())]);
    }

    #[tokio::test]
    async fn test_complete_part_unknown_number() {
        let store = CheckpointStore::new(sample_upload_checkpoint(), None);
        let result = store.complete_part(99, None).await;
        assert!(matches!(result, Err(StorageError::Checkpoint(_))));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let result = CheckpointStore::load(&dir.path().join("absent.ucp")).await;
        assert!(matches!(result, Err(StorageError::Checkpoint(_))));
    }

    #[tokio::test]
    async fn test_load_garbage_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.ucp");
        tokio::fs::write(&path, b"not a checkpoint").await.unwrap();

        let result = CheckpointStore::load(&path).await;
        assert!(matches!(result, Err(StorageError::Checkpoint(_))));
    }

    #[tokio::test]
    async fn test_load_foreign_json_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foreign.ucp");
        tokio::fs::write(&path, br#"{"command": "rm -rf /", "args": []}"#)
            .await
            .unwrap();

        let result = CheckpointStore::load(&path).await;
        assert!(matches!(result, Err(StorageError::Checkpoint(_))));
    }

    #[tokio::test]
    async fn test_flipped_byte_fails_validity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin.ucp");

        let store = CheckpointStore::new(sample_upload_checkpoint(), Some(path.clone()));
        store.dump().await.unwrap();

        // Flip a byte inside a string value; the record still parses but
        // the content hash no longer matches.
        let mut bytes = tokio::fs::read(&path).await.unwrap();
        let pos = bytes
            .windows(9)
            .position(|w| w == b"my-bucket")
            .expect("bucket name present");
        bytes[pos] = b'x';
        tokio::fs::write(&path, &bytes).await.unwrap();

        let loaded = CheckpointStore::load(&path).await.unwrap();
        assert!(!loaded.is_valid(UPLOAD_MAGIC, &sample_stat()));
    }

    #[test]
    fn test_magic_mismatch_fails_validity() {
        let mut download = Checkpoint::new_download(
            PathBuf::from("/data/big.bin"),
            "my-bucket".to_string(),
            "remote/big.bin".to_string(),
            sample_stat(),
            split_range(1000, 300, 0),
        );
        download.seal().unwrap();
        assert!(!download.is_valid(UPLOAD_MAGIC, &sample_stat()));
        assert!(download.is_valid(DOWNLOAD_MAGIC, &sample_stat()));
    }

    #[test]
    fn test_changed_stat_fails_validity() {
        let mut checkpoint = sample_upload_checkpoint();
        checkpoint.seal().unwrap();

        let mut grown = sample_stat();
        grown.size = 2000;
        assert!(!checkpoint.is_valid(UPLOAD_MAGIC, &grown));

        let mut touched = sample_stat();
        touched.modified =
            Some(SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_001));
        assert!(!checkpoint.is_valid(UPLOAD_MAGIC, &touched));

        let mut retagged = sample_stat();
        retagged.digest = Some("etag-2".to_string());
        assert!(!checkpoint.is_valid(UPLOAD_MAGIC, &retagged));
    }

    #[test]
    fn test_matches_target() {
        let checkpoint = sample_upload_checkpoint();
        assert!(checkpoint.matches_target(
            "my-bucket",
            "remote/big.bin",
            Path::new("/data/big.bin")
        ));
        assert!(!checkpoint.matches_target(
            "other-bucket",
            "remote/big.bin",
            Path::new("/data/big.bin")
        ));
        assert!(!checkpoint.matches_target(
            "my-bucket",
            "remote/other.bin",
            Path::new("/data/big.bin")
        ));
    }

    #[tokio::test]
    async fn test_dump_disabled_writes_nothing() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(sample_upload_checkpoint(), None);
        store.dump().await.unwrap();
        store.complete_part(1, None).await.unwrap();

        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 0);
    }

    #[tokio::test]
    async fn test_no_scratch_file_left_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin.ucp");

        let store = CheckpointStore::new(sample_upload_checkpoint(), Some(path.clone()));
        store.dump().await.unwrap();

        assert!(path.exists());
        assert!(!scratch_path(&path).exists());
    }
}
