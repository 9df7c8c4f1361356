// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for sector-level partition management
//!
//! This crate defines the data shared by the I/O layer and its callers:
//!
//! - `SectorRange` → inclusive sector addressing used everywhere
//! - `FilesystemType` / `FilesystemInfo` → what lives inside a partition
//! - `PartitionRecord` / `PartitionTable` → flat per-device view, including
//!   synthetic free-space records
//! - `VolumeGroupInfo` / `LogicalVolumeRecord` / `VolumeManagedDevice` →
//!   a volume group presented as a partitioned device
//!
//! All types are plain data and serialize with serde so they can be printed
//! as JSON or carried over any transport.

pub mod common;
pub mod filesystem;
pub mod lvm;
pub mod partition;
pub mod sector;

pub use common::{bytes_to_pretty, pretty_to_bytes, sectors_to_bytes};
pub use filesystem::{FilesystemInfo, FilesystemType};
pub use lvm::{LogicalVolumeRecord, UNKNOWN_UUID, VolumeGroupInfo, VolumeManagedDevice};
pub use partition::{
    PartitionFlag, PartitionRecord, PartitionRole, PartitionTable, PartitionTableKind,
};
pub use sector::{DEFAULT_SECTOR_SIZE, SectorRange, byte_spans_intersect};
