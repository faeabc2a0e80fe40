/*!
 * Cirrus - client library for S3-compatible object storage
 *
 * Provides a typed async API over the service's REST operations and a
 * checkpointed, parallel multipart transfer engine:
 * - Fixed-size partitioning with an upper bound on part count
 * - Bounded pools of concurrent part-transfer tasks
 * - Crash-resumable progress persisted to a checkpoint file
 * - Validity gating against targets that changed between attempts
 * - Partial-failure isolation across independently failing parts
 * - Support for custom endpoints (MinIO, LocalStack, etc.)
 */

pub mod client;
pub mod config;
pub mod error;
pub mod operations;
pub mod retry;
pub mod transfer;
pub mod types;

// Re-export commonly used types
pub use client::Client;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{Result, StorageError};
pub use operations::ObjectOperations;
pub use retry::RetryPolicy;
pub use transfer::{
    DownloadResult, Downloader, TransferRequest, UploadResult, Uploader,
};
pub use types::{CompleteMultipartResult, ObjectStat, PartTag};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
