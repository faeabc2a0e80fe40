//! Configuration types for the storage client

use crate::error::{Result, StorageError};
use serde::{Deserialize, Serialize};

/// Default multipart part size (8 MB)
pub const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;

/// Minimum multipart part size accepted by the service (100 KB)
pub const MIN_PART_SIZE: u64 = 100 * 1024;

/// Maximum multipart part size (5 GB)
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Default number of concurrent part-transfer tasks
pub const DEFAULT_TASK_NUM: usize = 1;

/// Maximum number of concurrent part-transfer tasks
pub const MAX_TASK_NUM: usize = 1000;

/// Storage client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Region (e.g., "us-east-1")
    pub region: Option<String>,

    /// Custom endpoint URL (for S3-compatible services like MinIO)
    pub endpoint: Option<String>,

    /// Access key ID (optional - uses credential chain if not provided)
    pub access_key: Option<String>,

    /// Secret access key (optional - uses credential chain if not provided)
    pub secret_key: Option<String>,

    /// Session token (for temporary credentials)
    pub session_token: Option<String>,

    /// Path-style addressing (required for some S3-compatible services)
    pub force_path_style: bool,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Maximum retry attempts for part-level requests
    pub max_retries: u32,
}

impl ClientConfig {
    /// Create a config with defaults (credential chain, 5 minute timeout)
    pub fn new() -> Self {
        Self {
            region: None,
            endpoint: None,
            access_key: None,
            secret_key: None,
            session_token: None,
            force_path_style: false,
            timeout_seconds: 300,
            max_retries: 3,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(StorageError::InvalidConfig(
                "Both access_key and secret_key must be provided together".to_string(),
            ));
        }

        if self.timeout_seconds == 0 {
            return Err(StorageError::InvalidConfig(
                "Request timeout must be at least 1 second".to_string(),
            ));
        }

        Ok(())
    }

    /// Check if using custom endpoint (S3-compatible service)
    pub fn is_custom_endpoint(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Check if using explicit credentials
    pub fn has_explicit_credentials(&self) -> bool {
        self.access_key.is_some() && self.secret_key.is_some()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for ClientConfig
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self {
            config: ClientConfig::new(),
        }
    }

    /// Set the region
    pub fn region(mut self, region: String) -> Self {
        self.config.region = Some(region);
        self
    }

    /// Set custom endpoint (for MinIO, LocalStack, etc.)
    pub fn endpoint(mut self, endpoint: String) -> Self {
        self.config.endpoint = Some(endpoint);
        self
    }

    /// Set credentials explicitly
    pub fn credentials(mut self, access_key: String, secret_key: String) -> Self {
        self.config.access_key = Some(access_key);
        self.config.secret_key = Some(secret_key);
        self
    }

    /// Set session token (for temporary credentials)
    pub fn session_token(mut self, token: String) -> Self {
        self.config.session_token = Some(token);
        self
    }

    /// Enable path-style addressing
    pub fn force_path_style(mut self, force: bool) -> Self {
        self.config.force_path_style = force;
        self
    }

    /// Set request timeout
    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.config.timeout_seconds = seconds;
        self
    }

    /// Set maximum retry attempts
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a bucket name according to the service's rules
pub(crate) fn is_valid_bucket_name(name: &str) -> bool {
    let len = name.len();

    // Length check: 3-63 characters
    if !(3..=63).contains(&len) {
        return false;
    }

    // Must start and end with lowercase letter or number
    let first = name.chars().next().unwrap();
    let last = name.chars().last().unwrap();
    if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
        return false;
    }
    if !last.is_ascii_lowercase() && !last.is_ascii_digit() {
        return false;
    }

    // Only lowercase letters, numbers, hyphens, and periods
    for c in name.chars() {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' && c != '.' {
            return false;
        }
    }

    // Cannot have consecutive periods
    if name.contains("..") {
        return false;
    }

    // Cannot be formatted as IP address
    if name.split('.').count() == 4 && name.split('.').all(|s| s.parse::<u8>().is_ok()) {
        return false;
    }

    true
}
