// SPDX-License-Identifier: GPL-3.0-only

//! Volume groups presented as partitioned devices
//!
//! - `VolumeManager`: metadata queries answered by the volume manager
//! - `AddressMap`: per-scan prefix sums placing every logical volume in the
//!   group's global sector space
//! - `scan_volume_group`: builds the partition-table view of a group
//! - `LvmCli`: `VolumeManager` backed by the `lvm` command-line tool

pub mod device;
pub mod lvm_tools;
pub mod translator;

#[cfg(test)]
pub(crate) mod fake;

pub use device::{Collaborators, scan_volume_group};
pub use lvm_tools::LvmCli;
pub use translator::AddressMap;

/// Volume manager metadata.
///
/// Failed queries yield an empty list or `None`; callers treat that as
/// unknown rather than as an error.
pub trait VolumeManager {
    /// Logical volume device paths of `group`, in enumeration order
    fn list_volume_paths(&self, group: &str) -> Vec<String>;

    /// Size of a logical volume in extents
    fn volume_extent_count(&self, path: &str) -> Option<i64>;

    /// Bytes per extent of `group`
    fn group_extent_size(&self, group: &str) -> Option<i64>;

    fn group_total_extents(&self, group: &str) -> Option<i64>;

    fn group_free_extents(&self, group: &str) -> Option<i64>;

    fn group_uuid(&self, group: &str) -> Option<String>;

    /// Physical volumes backing `group`
    fn physical_volume_paths(&self, group: &str) -> Vec<String>;
}
