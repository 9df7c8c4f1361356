// SPDX-License-Identifier: GPL-3.0-only

//! Partition-table view of a volume group
//!
//! The table is addressed in extents. Logical volumes become `LvmLv` records
//! at their global offsets; whatever the volumes leave of `[0, total - 1]`
//! becomes unallocated records.

use storage_types::{
    FilesystemInfo, LogicalVolumeRecord, PartitionFlag, PartitionRecord, PartitionRole,
    PartitionTable, PartitionTableKind, UNKNOWN_UUID, VolumeGroupInfo, VolumeManagedDevice,
};
use tracing::{info, warn};

use super::{AddressMap, VolumeManager};
use crate::filesystem::FilesystemProbe;
use crate::mounts::MountTable;

/// Everything a scan queries, passed explicitly
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub volumes: &'a dyn VolumeManager,
    pub filesystems: &'a dyn FilesystemProbe,
    pub mounts: &'a dyn MountTable,
}

/// Read group metadata and build its device view.
///
/// Every call rescans; nothing is carried over from earlier scans.
pub fn scan_volume_group(name: &str, collaborators: &Collaborators<'_>) -> VolumeManagedDevice {
    let manager = collaborators.volumes;
    let group = VolumeGroupInfo {
        name: name.to_string(),
        device_node: format!("/dev/{name}"),
        uuid: manager
            .group_uuid(name)
            .unwrap_or_else(|| UNKNOWN_UUID.to_string()),
        extent_size: manager.group_extent_size(name),
        total_extents: manager.group_total_extents(name),
        free_extents: manager.group_free_extents(name),
        physical_volumes: manager.physical_volume_paths(name),
    };

    let map = AddressMap::scan(manager, name);
    let total = match group.total_extents {
        Some(total) if total >= map.total_sectors() => total,
        Some(total) => {
            warn!(
                "Volume group {} reports {} extents but its volumes use {}",
                name,
                total,
                map.total_sectors()
            );
            map.total_sectors()
        }
        None => {
            warn!("Extent count of volume group {} is unknown", name);
            map.total_sectors()
        }
    };

    let volumes = map.records();
    let mut table = PartitionTable::new(PartitionTableKind::Vmd, 0, total - 1);
    for volume in &volumes {
        table.append(volume_partition(volume, group.extent_size, collaborators));
    }
    table.update_unallocated();

    info!(
        group = name,
        volumes = volumes.len(),
        total_extents = total,
        free_extents = table.free_sectors(),
        "Scanned volume group"
    );

    VolumeManagedDevice {
        group,
        volumes,
        table,
    }
}

fn volume_partition(
    volume: &LogicalVolumeRecord,
    extent_size: Option<i64>,
    collaborators: &Collaborators<'_>,
) -> PartitionRecord {
    let path = volume.path.as_str();
    let mounted = collaborators.mounts.is_mounted(path);
    let mount_point = collaborators.mounts.mount_point_of(path);

    let probe = collaborators.filesystems;
    let fs_type = probe.detect_type(path);
    let mut filesystem = FilesystemInfo::new(fs_type, volume.local_range);

    if mounted
        && let (Some(mount_point), Some(extent_size)) = (&mount_point, extent_size)
    {
        filesystem.sectors_used = probe.used_sectors(path, mount_point, extent_size);
    }
    if probe.supports_label_query(fs_type) {
        filesystem.label = probe.read_label(path);
    }
    filesystem.uuid = probe.read_uuid(path);

    PartitionRecord {
        path: volume.path.clone(),
        role: PartitionRole::LvmLv,
        range: volume.global_range(),
        filesystem,
        flags: vec![PartitionFlag::Lvm],
        mount_point,
        mounted,
    }
}
