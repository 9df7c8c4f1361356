// SPDX-License-Identifier: GPL-3.0-only

//! Partition records and partition tables
//!
//! A `PartitionTable` is the flat view of one device: the records it holds
//! are sorted by first sector and, after `update_unallocated`, cover the
//! usable range with no gaps.

use serde::{Deserialize, Serialize};

use crate::{FilesystemInfo, FilesystemType, SectorRange};

/// Partition table kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionTableKind {
    /// MBR/DOS
    Msdos,

    /// GPT (GUID Partition Table)
    Gpt,

    /// Synthetic table of a volume-managed device
    Vmd,
}

impl PartitionTableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Msdos => "msdos",
            Self::Gpt => "gpt",
            Self::Vmd => "vmd",
        }
    }
}

/// Role a record plays in its table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionRole {
    Primary,
    Extended,
    Logical,
    /// A logical volume presented as a partition
    LvmLv,
    /// Free space between or after partitions
    Unallocated,
}

/// Partition flags relevant to the partition model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionFlag {
    Boot,
    Lvm,
    Raid,
    Hidden,
    Esp,
}

/// One entry of a partition table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRecord {
    /// Device node path (e.g. "/dev/vg0/root"); empty for unallocated space
    pub path: String,

    pub role: PartitionRole,

    /// Range in the table's address space
    pub range: SectorRange,

    pub filesystem: FilesystemInfo,

    pub flags: Vec<PartitionFlag>,

    pub mount_point: Option<String>,

    pub mounted: bool,
}

impl PartitionRecord {
    /// Synthetic free-space record covering `range`
    pub fn unallocated(range: SectorRange) -> Self {
        Self {
            path: String::new(),
            role: PartitionRole::Unallocated,
            range,
            filesystem: FilesystemInfo::new(
                FilesystemType::Unknown,
                SectorRange {
                    first: 0,
                    last: range.len() - 1,
                },
            ),
            flags: Vec::new(),
            mount_point: None,
            mounted: false,
        }
    }

    pub fn length(&self) -> i64 {
        self.range.len()
    }

    pub fn is_unallocated(&self) -> bool {
        self.role == PartitionRole::Unallocated
    }
}

/// A device's partition table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionTable {
    pub kind: PartitionTableKind,

    pub first_usable: i64,

    pub last_usable: i64,

    partitions: Vec<PartitionRecord>,
}

impl PartitionTable {
    pub fn new(kind: PartitionTableKind, first_usable: i64, last_usable: i64) -> Self {
        Self {
            kind,
            first_usable,
            last_usable,
            partitions: Vec::new(),
        }
    }

    pub fn partitions(&self) -> &[PartitionRecord] {
        &self.partitions
    }

    /// Records that are not synthetic free space
    pub fn allocated(&self) -> impl Iterator<Item = &PartitionRecord> {
        self.partitions.iter().filter(|p| !p.is_unallocated())
    }

    pub fn append(&mut self, record: PartitionRecord) {
        self.partitions.push(record);
    }

    pub fn find_by_path(&self, path: &str) -> Option<&PartitionRecord> {
        self.partitions.iter().find(|p| p.path == path)
    }

    pub fn remove_by_path(&mut self, path: &str) -> Option<PartitionRecord> {
        let index = self.partitions.iter().position(|p| p.path == path)?;
        Some(self.partitions.remove(index))
    }

    /// Record covering the given sector, if any
    pub fn find_at(&self, sector: i64) -> Option<&PartitionRecord> {
        self.partitions.iter().find(|p| p.range.contains(sector))
    }

    /// Total sectors not covered by allocated records
    pub fn free_sectors(&self) -> i64 {
        self.partitions
            .iter()
            .filter(|p| p.is_unallocated())
            .map(PartitionRecord::length)
            .sum()
    }

    /// Recompute synthetic free-space records.
    ///
    /// Existing unallocated records are dropped, allocated records are sorted
    /// by first sector and every gap within `[first_usable, last_usable]` is
    /// filled with a new unallocated record.
    pub fn update_unallocated(&mut self) {
        let mut allocated: Vec<PartitionRecord> = self
            .partitions
            .drain(..)
            .filter(|p| !p.is_unallocated())
            .collect();
        allocated.sort_by_key(|p| p.range.first);

        let mut result = Vec::with_capacity(allocated.len() * 2 + 1);
        let mut cursor = self.first_usable;

        for record in allocated {
            if record.range.first > cursor {
                let gap_end = (record.range.first - 1).min(self.last_usable);
                if gap_end >= cursor {
                    result.push(PartitionRecord::unallocated(SectorRange {
                        first: cursor,
                        last: gap_end,
                    }));
                }
            }
            cursor = cursor.max(record.range.last + 1);
            result.push(record);
        }

        if cursor <= self.last_usable {
            result.push(PartitionRecord::unallocated(SectorRange {
                first: cursor,
                last: self.last_usable,
            }));
        }

        self.partitions = result;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lv(path: &str, first: i64, last: i64) -> PartitionRecord {
        let range = SectorRange::new(first, last).unwrap();
        PartitionRecord {
            path: path.to_string(),
            role: PartitionRole::LvmLv,
            range,
            filesystem: FilesystemInfo::new(
                FilesystemType::Ext4,
                SectorRange::new(0, last - first).unwrap(),
            ),
            flags: vec![PartitionFlag::Lvm],
            mount_point: None,
            mounted: false,
        }
    }

    #[test]
    fn tail_free_space_is_added() {
        let mut table = PartitionTable::new(PartitionTableKind::Vmd, 0, 499);
        table.append(lv("/dev/vg0/a", 0, 99));
        table.append(lv("/dev/vg0/b", 100, 299));
        table.update_unallocated();

        let parts = table.partitions();
        assert_eq!(parts.len(), 3);
        assert!(parts[2].is_unallocated());
        assert_eq!(parts[2].range, SectorRange::new(300, 499).unwrap());
        assert_eq!(table.free_sectors(), 200);
    }

    #[test]
    fn gaps_are_filled_and_records_sorted() {
        let mut table = PartitionTable::new(PartitionTableKind::Msdos, 2048, 9999);
        table.append(lv("/dev/sda2", 5000, 5999));
        table.append(lv("/dev/sda1", 2048, 3999));
        table.update_unallocated();
        table.update_unallocated();

        let roles: Vec<_> = table.partitions().iter().map(|p| p.role).collect();
        assert_eq!(
            roles,
            vec![
                PartitionRole::LvmLv,
                PartitionRole::Unallocated,
                PartitionRole::LvmLv,
                PartitionRole::Unallocated,
            ]
        );
        assert_eq!(table.partitions()[1].range, SectorRange::new(4000, 4999).unwrap());
        assert_eq!(table.free_sectors(), 1000 + 4000);
    }

    #[test]
    fn full_table_has_no_free_space() {
        let mut table = PartitionTable::new(PartitionTableKind::Vmd, 0, 99);
        table.append(lv("/dev/vg0/a", 0, 99));
        table.update_unallocated();
        assert_eq!(table.partitions().len(), 1);
        assert_eq!(table.free_sectors(), 0);
        assert!(table.find_at(50).is_some());
        assert!(table.remove_by_path("/dev/vg0/a").is_some());
    }
}
