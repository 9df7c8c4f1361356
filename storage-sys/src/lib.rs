// SPDX-License-Identifier: GPL-3.0-only

//! Low-level system operations for sector-level partition management
//!
//! This crate touches raw storage directly:
//! - Sector sources and targets over block devices and image files
//! - The overlap-safe chunked copy engine and the jobs built on it
//! - Address translation and partition-table views for LVM volume groups
//! - Mount state and filesystem detection used to annotate partitions
//!
//! Device access requires elevated privileges; nothing here escalates them.

pub mod config;
pub mod copy;
pub mod error;
pub mod filesystem;
pub mod lvm;
pub mod mounts;
pub mod progress;

pub use config::EngineConfig;
pub use copy::{
    BackendId, CancelFlag, CopyDirection, CopyEngine, CopyFailure, CopyOutcome, CopyReport,
    CopySource, CopyTarget, DeviceSource, DeviceTarget, FileSource, FileTarget, NoProgress,
    ProgressSink, backup_to_file, move_within_device, restore_from_file, spawn_copy_job,
};
pub use error::{ErrorClass, Result, SysError};
pub use filesystem::{BlkidProbe, FilesystemProbe};
pub use lvm::{AddressMap, Collaborators, LvmCli, VolumeManager, scan_volume_group};
pub use mounts::{MountSnapshot, MountTable};
pub use progress::ProgressTracker;
