// SPDX-License-Identifier: GPL-3.0-only

//! Global sector space of a volume group
//!
//! Logical volumes are laid out back to back in enumeration order: volume
//! `i` starts at the sum of the sizes of volumes `0..i`. The prefix sums are
//! computed once when the map is built, from a single listing and a single
//! size query per volume, and never refreshed. Rescan to observe changes.

use storage_types::{LogicalVolumeRecord, SectorRange};
use tracing::{debug, warn};

use super::VolumeManager;

/// Snapshot of a group's volumes and their global base offsets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressMap {
    paths: Vec<String>,
    sizes: Vec<i64>,
    bases: Vec<i64>,
    total: i64,
}

impl AddressMap {
    /// Build from `(path, size)` pairs in enumeration order.
    ///
    /// Negative sizes count as zero.
    pub fn from_sizes<I, S>(volumes: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut map = Self::default();
        for (path, size) in volumes {
            let size = size.max(0);
            map.paths.push(path.into());
            map.sizes.push(size);
            map.bases.push(map.total);
            map.total = map.total.saturating_add(size);
        }
        map
    }

    /// Query `manager` for the volumes of `group`.
    ///
    /// A volume whose size cannot be read occupies no space.
    pub fn scan(manager: &dyn VolumeManager, group: &str) -> Self {
        let paths = manager.list_volume_paths(group);
        let volumes = paths.into_iter().map(|path| {
            let size = manager.volume_extent_count(&path).unwrap_or_else(|| {
                warn!("Size of logical volume {} is unknown, treating it as empty", path);
                0
            });
            (path, size)
        });
        let map = Self::from_sizes(volumes);
        debug!(
            group,
            volumes = map.len(),
            total_extents = map.total,
            "Mapped volume group address space"
        );
        map
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Volume paths in enumeration order
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Global offset of local sector 0 of each volume
    pub fn base_offsets(&self) -> &[i64] {
        &self.bases
    }

    pub fn size_of(&self, index: usize) -> Option<i64> {
        self.sizes.get(index).copied()
    }

    /// Sum of all volume sizes
    pub fn total_sectors(&self) -> i64 {
        self.total
    }

    pub fn index_of(&self, path: &str) -> Option<usize> {
        self.paths.iter().position(|p| p == path)
    }

    /// Global sector of `local` within volume `index`.
    ///
    /// `None` when the volume does not exist or `local` lies outside it.
    pub fn global_offset(&self, index: usize, local: i64) -> Option<i64> {
        let size = *self.sizes.get(index)?;
        if !(0..size).contains(&local) {
            return None;
        }
        Some(self.bases[index] + local)
    }

    pub fn global_offset_of(&self, path: &str, local: i64) -> Option<i64> {
        self.global_offset(self.index_of(path)?, local)
    }

    /// Volume index and local sector holding `global`
    pub fn locate(&self, global: i64) -> Option<(usize, i64)> {
        if !(0..self.total).contains(&global) {
            return None;
        }
        // Empty volumes share their base with the next volume; the last
        // base not above `global` always belongs to a non-empty one.
        let index = self.bases.partition_point(|base| *base <= global) - 1;
        Some((index, global - self.bases[index]))
    }

    /// Records for every volume, in enumeration order
    pub fn records(&self) -> Vec<LogicalVolumeRecord> {
        self.paths
            .iter()
            .zip(&self.sizes)
            .zip(&self.bases)
            .map(|((path, size), base)| LogicalVolumeRecord {
                path: path.clone(),
                size_in_sectors: *size,
                local_range: SectorRange {
                    first: 0,
                    last: size - 1,
                },
                global_base: *base,
            })
            .collect()
    }
}
