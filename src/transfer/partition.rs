//! Partitioning of a byte range into fixed-size transfer parts

use serde::{Deserialize, Serialize};

/// Hard cap on the number of parts in one transfer. When a requested
/// part size would produce this many parts or more, the effective part
/// size grows until the count fits.
pub const MAX_PART_COUNT: u64 = 10_000;

/// One contiguous byte sub-range of the object being transferred
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// Part number (0-based for downloads, 1-based for uploads)
    pub number: i32,

    /// Byte offset of the part within the object
    pub offset: u64,

    /// Part length in bytes
    pub size: u64,

    /// Whether the part has been transferred
    pub completed: bool,
}

impl Part {
    /// Inclusive end offset, as used in HTTP range requests.
    /// Meaningless for zero-length parts.
    pub fn range_end(&self) -> u64 {
        self.offset + self.size.saturating_sub(1)
    }
}

/// Split `[0, total)` into ordered parts of `part_size` bytes (last part
/// short), numbering them from `first_number`.
///
/// A zero-length input yields a single zero-length part so that both
/// engines have something deterministic to drive to completion.
pub fn split_range(total: u64, part_size: u64, first_number: i32) -> Vec<Part> {
    if total == 0 {
        return vec![Part {
            number: first_number,
            offset: 0,
            size: 0,
            completed: false,
        }];
    }

    let mut size = part_size.max(1);
    if total.div_ceil(size) >= MAX_PART_COUNT {
        size = total.div_ceil(MAX_PART_COUNT - 1);
    }

    let mut parts = Vec::with_capacity(total.div_ceil(size) as usize);
    let mut offset = 0u64;
    let mut number = first_number;
    while offset < total {
        let len = size.min(total - offset);
        parts.push(Part {
            number,
            offset,
            size: len,
            completed: false,
        });
        offset += len;
        number += 1;
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers(parts: &[Part], total: u64) {
        let mut expected_offset = 0u64;
        for (i, part) in parts.iter().enumerate() {
            assert_eq!(part.offset, expected_offset, "gap or overlap at part {}", i);
            expected_offset += part.size;
        }
        assert_eq!(expected_offset, total);
    }

    #[test]
    fn test_exact_multiple() {
        let parts = split_range(900, 300, 1);
        assert_eq!(parts.len(), 3);
        assert_covers(&parts, 900);
        assert_eq!(parts[0].number, 1);
        assert_eq!(parts[2].number, 3);
    }

    #[test]
    fn test_short_last_part() {
        // 1000 bytes in 300-byte parts: [0,300) [300,600) [600,900) [900,1000)
        let parts = split_range(1000, 300, 0);
        assert_eq!(parts.len(), 4);
        assert_covers(&parts, 1000);
        assert_eq!(parts[0].offset, 0);
        assert_eq!(parts[0].size, 300);
        assert_eq!(parts[3].offset, 900);
        assert_eq!(parts[3].size, 100);
        assert_eq!(parts[0].number, 0);
        assert_eq!(parts[3].number, 3);
    }

    #[test]
    fn test_short_last_part_upload_numbering() {
        let parts = split_range(1000, 300, 1);
        assert_eq!(parts.len(), 4);
        assert_covers(&parts, 1000);
        assert_eq!(parts[0].number, 1);
        assert_eq!(parts[3].number, 4);
    }

    #[test]
    fn test_single_part_when_size_exceeds_total() {
        let parts = split_range(100, 4096, 1);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].size, 100);
        assert_covers(&parts, 100);
    }

    #[test]
    fn test_zero_length_yields_one_empty_part() {
        let parts = split_range(0, 300, 1);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].number, 1);
        assert_eq!(parts[0].offset, 0);
        assert_eq!(parts[0].size, 0);
        assert!(!parts[0].completed);
    }

    #[test]
    fn test_part_count_capped() {
        // 25000 bytes in 1-byte parts would be 25000 parts; the cap grows
        // the part size instead.
        let parts = split_range(25_000, 1, 0);
        assert!((parts.len() as u64) < MAX_PART_COUNT);
        assert_covers(&parts, 25_000);
    }

    #[test]
    fn test_part_count_just_under_cap_untouched() {
        let parts = split_range(9_999, 1, 0);
        assert_eq!(parts.len(), 9_999);
        assert_covers(&parts, 9_999);
        assert_eq!(parts[0].size, 1);
    }

    #[test]
    fn test_cap_boundary() {
        // Exactly 10000 implied parts triggers the recompute.
        let parts = split_range(10_000, 1, 0);
        assert!((parts.len() as u64) < MAX_PART_COUNT);
        assert_covers(&parts, 10_000);
    }

    #[test]
    fn test_range_end_inclusive() {
        let parts = split_range(1000, 300, 0);
        assert_eq!(parts[0].range_end(), 299);
        assert_eq!(parts[3].range_end(), 999);
    }

    #[test]
    fn test_coverage_property_assorted() {
        for &(total, part_size) in &[
            (1u64, 1u64),
            (5, 2),
            (1024, 100),
            (1_000_000, 8192),
            (123_456, 777),
        ] {
            let parts = split_range(total, part_size, 0);
            assert_covers(&parts, total);
            assert!((parts.len() as u64) < MAX_PART_COUNT);
        }
    }
}
