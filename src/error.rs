//! Error types for storage operations

use std::io;
use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur while talking to the storage service or while
/// driving a checkpointed transfer
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// AWS SDK error
    #[error("SDK error: {0}")]
    Sdk(String),

    /// Service error with a specific error code
    #[error("service error ({code}): {message}")]
    Service { code: String, message: String },

    /// Object not found in bucket
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Bucket not found or not accessible
    #[error("bucket not found or not accessible: {0}")]
    BucketNotFound(String),

    /// Access denied error
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid bucket name
    #[error("invalid bucket name: {0}")]
    InvalidBucketName(String),

    /// Multipart session error (initiate/complete rejected, missing ETag)
    #[error("multipart upload error: {0}")]
    MultipartUpload(String),

    /// Checkpoint file unreadable, untrusted, or stale.
    /// Recovered internally by rebuilding; never surfaced from `transfer`.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// I/O error (local file, checkpoint persistence)
    #[error("I/O error: {0}")]
    Io(String),

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// Timeout error
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Invalid range request
    #[error("invalid range: {0}")]
    InvalidRange(String),
}

impl StorageError {
    /// Check if the error is worth retrying at the request layer
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Network(_) => true,
            StorageError::Timeout(_) => true,
            StorageError::Io(_) => true,
            StorageError::Sdk(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("connection reset")
                    || lower.contains("connection timed out")
                    || lower.contains("broken pipe")
                    || lower.contains("connection refused")
                    || lower.contains("temporarily unavailable")
            }
            StorageError::Service { code, .. } => is_retryable_code(code),
            _ => false,
        }
    }
}

// Convert io::Error to StorageError
impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

/// Check if a service error code is retryable
pub(crate) fn is_retryable_code(code: &str) -> bool {
    matches!(
        code,
        "RequestTimeout"
            | "ServiceUnavailable"
            | "InternalError"
            | "SlowDown"
            | "RequestTimeTooSkewed"
    )
}

/// Convert AWS SDK errors to StorageError
impl<E> From<aws_sdk_s3::error::SdkError<E>> for StorageError
where
    E: std::error::Error + 'static,
{
    fn from(error: aws_sdk_s3::error::SdkError<E>) -> Self {
        match error {
            aws_sdk_s3::error::SdkError::DispatchFailure(e) => {
                StorageError::Network(format!("network dispatch failure: {:?}", e))
            }
            aws_sdk_s3::error::SdkError::ResponseError(e) => {
                StorageError::Network(format!("response error: {:?}", e))
            }
            aws_sdk_s3::error::SdkError::TimeoutError(e) => {
                StorageError::Timeout(format!("request timed out: {:?}", e))
            }
            aws_sdk_s3::error::SdkError::ServiceError(e) => {
                let err_str = format!("{:?}", e);

                if err_str.contains("NoSuchKey") {
                    StorageError::Service {
                        code: "NoSuchKey".to_string(),
                        message: "The specified key does not exist".to_string(),
                    }
                } else if err_str.contains("NoSuchBucket") {
                    StorageError::Service {
                        code: "NoSuchBucket".to_string(),
                        message: "The specified bucket does not exist".to_string(),
                    }
                } else if err_str.contains("NoSuchUpload") {
                    StorageError::Service {
                        code: "NoSuchUpload".to_string(),
                        message: "The specified multipart upload does not exist".to_string(),
                    }
                } else if err_str.contains("AccessDenied") {
                    StorageError::AccessDenied("access denied to resource".to_string())
                } else {
                    StorageError::Service {
                        code: "Unknown".to_string(),
                        message: err_str,
                    }
                }
            }
            _ => StorageError::Sdk(format!("{:?}", error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(StorageError::Network("connection lost".to_string()).is_retryable());
        assert!(StorageError::Timeout("timed out".to_string()).is_retryable());
        assert!(StorageError::Io("short read".to_string()).is_retryable());
        assert!(!StorageError::InvalidConfig("bad".to_string()).is_retryable());
        assert!(!StorageError::Checkpoint("stale".to_string()).is_retryable());
    }

    #[test]
    fn test_sdk_network_errors_retryable() {
        assert!(StorageError::Sdk("connection reset by peer".to_string()).is_retryable());
        assert!(StorageError::Sdk("Connection timed out".to_string()).is_retryable());
        assert!(StorageError::Sdk("broken pipe".to_string()).is_retryable());
        assert!(!StorageError::Sdk("invalid argument".to_string()).is_retryable());
    }

    #[test]
    fn test_retryable_codes() {
        assert!(is_retryable_code("RequestTimeout"));
        assert!(is_retryable_code("ServiceUnavailable"));
        assert!(is_retryable_code("InternalError"));
        assert!(is_retryable_code("SlowDown"));
        assert!(!is_retryable_code("NoSuchKey"));
        assert!(!is_retryable_code("AccessDenied"));
    }

    #[test]
    fn test_service_error_retryable() {
        let err = StorageError::Service {
            code: "SlowDown".to_string(),
            message: "slow".to_string(),
        };
        assert!(err.is_retryable());

        let err = StorageError::Service {
            code: "NoSuchKey".to_string(),
            message: "not found".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: StorageError = io_err.into();
        assert!(matches!(err, StorageError::Io(_)));
    }

    #[test]
    fn test_error_display_formats() {
        let err = StorageError::NotFound {
            bucket: "my-bucket".to_string(),
            key: "my-key".to_string(),
        };
        assert_eq!(format!("{}", err), "object not found: my-bucket/my-key");

        let err = StorageError::Service {
            code: "SlowDown".to_string(),
            message: "rate limited".to_string(),
        };
        assert_eq!(format!("{}", err), "service error (SlowDown): rate limited");

        let err = StorageError::Checkpoint("magic mismatch".to_string());
        assert_eq!(format!("{}", err), "checkpoint error: magic mismatch");
    }
}
