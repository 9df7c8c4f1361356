// SPDX-License-Identifier: GPL-3.0-only

//! Inclusive sector ranges
//!
//! All sector numbers are signed so that the empty range starting at sector
//! `n` can be written as `(n, n - 1)`, the way partition tables describe it.

use serde::{Deserialize, Serialize};

use crate::common::sectors_to_bytes;

/// Default logical sector size for devices that do not report one
pub const DEFAULT_SECTOR_SIZE: u32 = 512;

/// An inclusive `[first, last]` range of sectors.
///
/// `last == first - 1` denotes an empty range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectorRange {
    /// First sector (inclusive)
    pub first: i64,

    /// Last sector (inclusive)
    pub last: i64,
}

impl SectorRange {
    /// Build a range, returning `None` when `last < first - 1`.
    pub fn new(first: i64, last: i64) -> Option<Self> {
        if first < 0 || last < first - 1 {
            return None;
        }
        Some(Self { first, last })
    }

    /// Empty range positioned at `first`
    pub fn empty_at(first: i64) -> Self {
        Self {
            first,
            last: first - 1,
        }
    }

    /// Range of `length` sectors starting at `first`
    pub fn with_length(first: i64, length: i64) -> Option<Self> {
        if length < 0 {
            return None;
        }
        Self::new(first, first.checked_add(length)? - 1)
    }

    /// Number of sectors covered
    pub fn len(&self) -> i64 {
        self.last - self.first + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0
    }

    /// Whether `[first + offset, first + offset + count - 1]` lies within this range.
    pub fn contains_span(&self, offset: i64, count: i64) -> bool {
        if offset < 0 || count < 0 {
            return false;
        }
        match offset.checked_add(count) {
            Some(end) => end <= self.len(),
            None => false,
        }
    }

    pub fn contains(&self, sector: i64) -> bool {
        sector >= self.first && sector <= self.last
    }

    /// Whether two ranges share at least one sector. Empty ranges never intersect.
    pub fn intersects(&self, other: &SectorRange) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.first <= other.last && other.first <= self.last
    }

    /// Byte span `[start, end)` of this range for the given sector size.
    ///
    /// Computed in `i128` so that open-ended ranges cannot overflow.
    pub fn byte_span(&self, sector_size: u32) -> (i128, i128) {
        (
            sectors_to_bytes(self.first, sector_size),
            sectors_to_bytes(self.last, sector_size) + i128::from(sector_size),
        )
    }

    /// Shift the range so that it starts at `new_first`, keeping its length.
    pub fn moved_to(&self, new_first: i64) -> Self {
        Self {
            first: new_first,
            last: new_first + self.len() - 1,
        }
    }
}

/// Whether two byte spans `[start, end)` share at least one byte.
pub fn byte_spans_intersect(a: (i128, i128), b: (i128, i128)) -> bool {
    a.0 < a.1 && b.0 < b.1 && a.0 < b.1 && b.0 < a.1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_is_inclusive() {
        for (first, last) in [(0, 0), (0, 99), (100, 199), (2048, 1_000_000)] {
            let range = SectorRange::new(first, last).expect("valid range");
            assert_eq!(range.len(), last - first + 1);
        }
    }

    #[test]
    fn empty_range_is_allowed_but_never_intersects() {
        let empty = SectorRange::new(10, 9).expect("empty range is valid");
        assert!(empty.is_empty());
        assert_eq!(empty.len(), 0);
        assert!(!empty.intersects(&SectorRange::new(0, 100).unwrap()));
        assert!(SectorRange::new(10, 8).is_none());
    }

    #[test]
    fn intersects_detects_shared_sectors() {
        let a = SectorRange::new(100, 199).unwrap();
        let b = SectorRange::new(150, 249).unwrap();
        let c = SectorRange::new(200, 299).unwrap();
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn contains_span_checks_relative_bounds() {
        let range = SectorRange::new(100, 199).unwrap();
        assert!(range.contains_span(0, 100));
        assert!(range.contains_span(99, 1));
        assert!(!range.contains_span(99, 2));
        assert!(!range.contains_span(-1, 1));
    }

    #[test]
    fn byte_spans_compare_across_sector_sizes() {
        let small = SectorRange::new(8, 15).unwrap().byte_span(512);
        let large = SectorRange::new(1, 1).unwrap().byte_span(4096);
        assert!(byte_spans_intersect(small, large));

        let after = SectorRange::new(2, 2).unwrap().byte_span(4096);
        assert!(!byte_spans_intersect(small, after));
    }
}
