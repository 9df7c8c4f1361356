// SPDX-License-Identifier: GPL-3.0-only

//! Sector-addressed copy sources, targets and the engine that moves data
//! between them.
//!
//! A source or target owns at most one backend handle, acquired by `open()`
//! and released when the value is dropped. Offsets passed to
//! `read_sectors`/`write_sectors` are relative to the backend's own range,
//! never absolute device sectors.

pub mod device;
pub mod engine;
pub mod file;
pub mod handle;
pub mod jobs;
pub mod worker;

#[cfg(test)]
pub(crate) mod memory;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use storage_types::{SectorRange, byte_spans_intersect};

use crate::Result;

pub use device::{DeviceSource, DeviceTarget};
pub use engine::{CopyDirection, CopyEngine, CopyFailure, CopyOutcome, CopyReport};
pub use file::{FileSource, FileTarget};
pub use handle::{Access, BackendHandle, logical_sector_size};
pub use jobs::{backup_to_file, move_within_device, restore_from_file};
pub use worker::{CopyJob, JobHandle, ProgressUpdate, spawn_copy_job};

/// Identity of the physical storage behind a backend.
///
/// Two backends alias each other exactly when their ids are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendId {
    /// Block device, identified by its device number (`st_rdev`)
    BlockDevice { rdev: u64 },

    /// Regular file, identified by filesystem device and inode
    File { dev: u64, ino: u64 },

    /// Storage that lives outside the filesystem namespace
    Other(u64),
}

/// Read side of a copy
pub trait CopySource {
    /// Acquire the backend handle. Calling it on an open source is a no-op.
    fn open(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Native sector size in bytes
    fn sector_size(&self) -> u32;

    /// Read `num_sectors` sectors starting `read_offset` sectors into this
    /// source's range. `buffer` must hold at least `num_sectors * sector_size()` bytes.
    fn read_sectors(&mut self, buffer: &mut [u8], read_offset: i64, num_sectors: i64)
    -> Result<()>;

    fn first_sector(&self) -> i64;

    fn last_sector(&self) -> i64;

    fn length(&self) -> i64 {
        self.last_sector() - self.first_sector() + 1
    }

    /// Storage identity, known once the source is open
    fn backend_id(&self) -> Option<BackendId>;

    /// Human-readable backend name used in errors and logs
    fn describe(&self) -> String;

    /// Whether this source and `target` share physical storage and their
    /// byte ranges intersect.
    fn overlaps(&self, target: &dyn CopyTarget) -> bool {
        match (self.backend_id(), target.backend_id()) {
            (Some(ours), Some(theirs)) if ours == theirs => {
                let source_span = SectorRange {
                    first: self.first_sector(),
                    last: self.last_sector(),
                }
                .byte_span(self.sector_size());
                let target_span = target.writable_range().byte_span(target.sector_size());
                byte_spans_intersect(source_span, target_span)
            }
            _ => false,
        }
    }
}

/// Write side of a copy
pub trait CopyTarget {
    /// Acquire the backend handle. Calling it on an open target is a no-op.
    fn open(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Native sector size in bytes
    fn sector_size(&self) -> u32;

    /// Write `num_sectors` sectors from `buffer`, starting `write_offset`
    /// sectors into this target.
    fn write_sectors(&mut self, buffer: &[u8], write_offset: i64, num_sectors: i64) -> Result<()>;

    fn first_sector(&self) -> i64;

    /// Fixed last sector for device targets; sectors written so far for
    /// append-only targets.
    fn last_sector(&self) -> i64;

    /// High-water mark of relative sectors written
    fn sectors_written(&self) -> i64;

    /// Absolute sectors this target may write to
    fn writable_range(&self) -> SectorRange;

    /// Storage identity, known once the target is open
    fn backend_id(&self) -> Option<BackendId>;

    /// Human-readable backend name used in errors and logs
    fn describe(&self) -> String;

    /// Whether `prepare` throws away what the backend held before the copy.
    /// Such a target must never share storage with its source.
    fn replaces_contents(&self) -> bool {
        false
    }

    /// Called once the copy has been validated, before the first chunk
    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    /// Make written data durable. Called once after the last chunk.
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Receives `(sectors_transferred, total_sectors)` after every chunk
pub trait ProgressSink {
    fn progress(&mut self, sectors_transferred: i64, total_sectors: i64);
}

impl<F> ProgressSink for F
where
    F: FnMut(i64, i64),
{
    fn progress(&mut self, sectors_transferred: i64, total_sectors: i64) {
        self(sectors_transferred, total_sectors)
    }
}

/// Progress sink that discards every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn progress(&mut self, _sectors_transferred: i64, _total_sectors: i64) {}
}

/// Cooperative cancellation signal, checked by the engine between chunks
#[derive(Debug, Default, Clone)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
