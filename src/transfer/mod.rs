//! Checkpointed, parallel multipart transfer engine
//!
//! Two structurally identical engines, [`Uploader`] and [`Downloader`],
//! split a large object into fixed-size parts, transfer parts on a
//! bounded pool of concurrent tasks, persist progress to an on-disk
//! checkpoint after every part, and resume interrupted transfers as
//! long as the target has not changed in between.
//!
//! # Example
//!
//! ```ignore
//! use cirrus::{Client, ClientConfig, TransferRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(ClientConfig::new()).await?;
//!
//!     let request = TransferRequest::new("my-bucket", "backups/big.bin", "/data/big.bin")
//!         .part_size(16 * 1024 * 1024)
//!         .task_num(8)
//!         .enable_checkpoint(true);
//!
//!     // Re-running after an interruption picks up where it left off.
//!     client.upload_file(&request).await?;
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod download;
pub mod partition;
pub mod pool;
pub mod upload;

pub use checkpoint::{Checkpoint, CheckpointStore, TargetStat};
pub use download::{DownloadResult, Downloader};
pub use partition::{split_range, Part, MAX_PART_COUNT};
pub use pool::PartResult;
pub use upload::{UploadResult, Uploader};

use crate::config::{is_valid_bucket_name, DEFAULT_PART_SIZE, DEFAULT_TASK_NUM, MAX_TASK_NUM};
use crate::error::{Result, StorageError};
use std::path::{Path, PathBuf};

/// File suffix for upload checkpoints (`<local file>.ucp`)
pub const UPLOAD_CHECKPOINT_SUFFIX: &str = "ucp";

/// File suffix for download checkpoints (`<local file>.dcp`)
pub const DOWNLOAD_CHECKPOINT_SUFFIX: &str = "dcp";

/// One transfer's parameters, immutable for the duration of the call
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Target bucket
    pub bucket: String,

    /// Target object key
    pub key: String,

    /// Local file: source for uploads, destination for downloads
    pub local_file: PathBuf,

    /// Requested part size in bytes (the engine may grow it to keep the
    /// part count under the cap)
    pub part_size: u64,

    /// Number of concurrent part-transfer tasks
    pub task_num: usize,

    /// Persist progress and resume across calls
    pub enable_checkpoint: bool,

    /// Checkpoint file location; defaults to `<local file>.<suffix>`
    /// when checkpointing is enabled and no path is given
    pub checkpoint_file: Option<PathBuf>,
}

impl TransferRequest {
    /// Create a request with default part size, one worker, and
    /// checkpointing disabled
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        local_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            local_file: local_file.into(),
            part_size: DEFAULT_PART_SIZE,
            task_num: DEFAULT_TASK_NUM,
            enable_checkpoint: false,
            checkpoint_file: None,
        }
    }

    /// Set the part size in bytes
    pub fn part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size;
        self
    }

    /// Set the number of concurrent part-transfer tasks
    pub fn task_num(mut self, task_num: usize) -> Self {
        self.task_num = task_num;
        self
    }

    /// Enable or disable checkpointing
    pub fn enable_checkpoint(mut self, enable: bool) -> Self {
        self.enable_checkpoint = enable;
        self
    }

    /// Set an explicit checkpoint file path (implies checkpointing)
    pub fn checkpoint_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_file = Some(path.into());
        self.enable_checkpoint = true;
        self
    }

    /// Validate the request before any work starts
    pub fn validate(&self) -> Result<()> {
        if !is_valid_bucket_name(&self.bucket) {
            return Err(StorageError::InvalidBucketName(self.bucket.clone()));
        }

        if self.key.is_empty() {
            return Err(StorageError::InvalidConfig(
                "object key cannot be empty".to_string(),
            ));
        }

        if self.part_size == 0 {
            return Err(StorageError::InvalidConfig(
                "part size must be positive".to_string(),
            ));
        }

        if self.task_num == 0 {
            return Err(StorageError::InvalidConfig(
                "task number must be at least 1".to_string(),
            ));
        }

        if self.task_num > MAX_TASK_NUM {
            return Err(StorageError::InvalidConfig(format!(
                "task number {} exceeds maximum {}",
                self.task_num, MAX_TASK_NUM
            )));
        }

        Ok(())
    }

    /// Resolved checkpoint path, or None when checkpointing is disabled
    pub(crate) fn checkpoint_path(&self, suffix: &str) -> Option<PathBuf> {
        if !self.enable_checkpoint {
            return None;
        }
        Some(match &self.checkpoint_file {
            Some(path) => path.clone(),
            None => append_suffix(&self.local_file, suffix),
        })
    }
}

/// `<path>.<suffix>` without replacing the existing extension
pub(crate) fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
