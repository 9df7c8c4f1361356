// SPDX-License-Identifier: GPL-3.0-only

//! LVM (Logical Volume Manager) types
//!
//! A volume group is addressed in extents: one "sector" of the synthetic
//! partition table built for a group is one extent of `extent_size` bytes.

use serde::{Deserialize, Serialize};

use crate::{PartitionTable, SectorRange};

/// Placeholder used when the volume manager does not report a UUID
pub const UNKNOWN_UUID: &str = "---";

/// Volume group information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeGroupInfo {
    /// Volume group name
    pub name: String,

    /// Device node (e.g., "/dev/vg0")
    pub device_node: String,

    /// Volume group UUID
    pub uuid: String,

    /// Bytes per extent, if known
    pub extent_size: Option<i64>,

    /// Total extents, if known
    pub total_extents: Option<i64>,

    /// Free extents, if known
    pub free_extents: Option<i64>,

    /// Physical volume device paths backing this group
    pub physical_volumes: Vec<String>,
}

impl VolumeGroupInfo {
    /// Allocated extents, when both totals are known
    pub fn allocated_extents(&self) -> Option<i64> {
        Some(self.total_extents? - self.free_extents?)
    }

    /// Total size in bytes, when known
    pub fn size_bytes(&self) -> Option<i64> {
        self.total_extents?.checked_mul(self.extent_size?)
    }

    /// Get usage percentage (0-100)
    pub fn usage_percent(&self) -> u32 {
        match (self.allocated_extents(), self.total_extents) {
            (Some(used), Some(total)) if total > 0 => {
                ((used as f64 / total as f64) * 100.0) as u32
            }
            _ => 0,
        }
    }
}

/// A logical volume as seen during one scan of its group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalVolumeRecord {
    /// Device path (e.g., "/dev/vg0/lv0")
    pub path: String,

    /// Size in extents; zero when the volume manager could not report it
    pub size_in_sectors: i64,

    /// Local addressing of the volume, always starting at 0
    pub local_range: SectorRange,

    /// Base offset of local sector 0 in the group's global address space
    pub global_base: i64,
}

impl LogicalVolumeRecord {
    /// Range occupied in the group's global address space
    pub fn global_range(&self) -> SectorRange {
        self.local_range.moved_to(self.global_base)
    }

    /// Get a display name for this logical volume
    pub fn display_name(&self) -> String {
        match self.path.strip_prefix("/dev/") {
            Some(stripped) => stripped.to_string(),
            None => self.path.clone(),
        }
    }
}

/// A volume group presented as a device with a partition table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeManagedDevice {
    pub group: VolumeGroupInfo,

    /// Logical volumes in enumeration order
    pub volumes: Vec<LogicalVolumeRecord>,

    pub table: PartitionTable,
}

impl VolumeManagedDevice {
    /// Logical sector size of the synthetic device (one extent)
    pub fn logical_sector_size(&self) -> Option<i64> {
        self.group.extent_size
    }

    /// Sum of all volume sizes
    pub fn allocated_sectors(&self) -> i64 {
        self.volumes.iter().map(|v| v.size_in_sectors).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(total: Option<i64>, free: Option<i64>) -> VolumeGroupInfo {
        VolumeGroupInfo {
            name: "vg0".to_string(),
            device_node: "/dev/vg0".to_string(),
            uuid: UNKNOWN_UUID.to_string(),
            extent_size: Some(4 * 1024 * 1024),
            total_extents: total,
            free_extents: free,
            physical_volumes: vec!["/dev/sda2".to_string()],
        }
    }

    #[test]
    fn allocation_requires_known_counts() {
        assert_eq!(group(Some(100), Some(25)).allocated_extents(), Some(75));
        assert_eq!(group(Some(100), Some(25)).usage_percent(), 75);
        assert_eq!(group(None, Some(25)).allocated_extents(), None);
        assert_eq!(group(None, None).usage_percent(), 0);
        assert_eq!(
            group(Some(10), Some(0)).size_bytes(),
            Some(10 * 4 * 1024 * 1024)
        );
    }

    #[test]
    fn global_range_shifts_local_range() {
        let record = LogicalVolumeRecord {
            path: "/dev/vg0/home".to_string(),
            size_in_sectors: 200,
            local_range: SectorRange::new(0, 199).unwrap(),
            global_base: 100,
        };
        assert_eq!(record.global_range(), SectorRange::new(100, 299).unwrap());
        assert_eq!(record.display_name(), "vg0/home");
    }
}
