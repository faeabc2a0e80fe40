//! Type definitions for storage operations

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Object metadata as reported by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStat {
    /// Object key (path within bucket)
    pub key: String,

    /// Object size in bytes
    pub size: u64,

    /// Last modified timestamp
    pub last_modified: Option<SystemTime>,

    /// ETag (entity tag) - often MD5 hash
    pub etag: Option<String>,

    /// Content type
    pub content_type: Option<String>,
}

/// ETag recorded for one uploaded part, needed to finalize the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartTag {
    /// Part number (1-indexed)
    pub part_number: i32,

    /// ETag returned by the service for this part
    pub etag: String,
}

impl PartTag {
    /// Create a new part tag
    pub fn new(part_number: i32, etag: String) -> Self {
        Self { part_number, etag }
    }
}

/// Result of completing a multipart upload
#[derive(Debug, Clone)]
pub struct CompleteMultipartResult {
    /// ETag of the assembled object
    pub etag: Option<String>,

    /// Location URL of the assembled object
    pub location: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_tag_new() {
        let tag = PartTag::new(3, "etag-abc".to_string());
        assert_eq!(tag.part_number, 3);
        assert_eq!(tag.etag, "etag-abc");
    }

    #[test]
    fn test_object_stat_serialization() {
        let stat = ObjectStat {
            key: "test/file.txt".to_string(),
            size: 12345,
            last_modified: None,
            etag: Some("abc123".to_string()),
            content_type: Some("text/plain".to_string()),
        };

        let json = serde_json::to_string(&stat).expect("Failed to serialize ObjectStat");
        let deserialized: ObjectStat =
            serde_json::from_str(&json).expect("Failed to deserialize ObjectStat");

        assert_eq!(deserialized, stat);
    }
}
