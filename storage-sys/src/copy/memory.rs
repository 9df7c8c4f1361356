// SPDX-License-Identifier: GPL-3.0-only

//! Test doubles: in-memory sector backends with call logging and fault
//! injection, and scratch files standing in for block devices.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use storage_types::SectorRange;

use super::{BackendId, CopySource, CopyTarget};
use crate::error::{Result, SysError};

static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Deterministic byte for `offset` of an image filled with the test pattern
pub(crate) fn pattern_byte(offset: usize) -> u8 {
    let sector = offset / 512;
    ((sector * 31 + offset % 512) % 251) as u8
}

pub(crate) fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(pattern_byte).collect()
}

/// Plain file under the temp dir, removed on drop
pub(crate) struct ScratchFile {
    path: PathBuf,
    sector_size: usize,
}

impl ScratchFile {
    fn create(contents: &[u8], sector_size: usize) -> Self {
        let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "storage-sys-scratch-{}-{unique}.img",
            std::process::id()
        ));
        fs::write(&path, contents).expect("write scratch file");
        Self { path, sector_size }
    }

    pub(crate) fn with_pattern(sectors: usize, sector_size: usize) -> Self {
        Self::create(&pattern(sectors * sector_size), sector_size)
    }

    pub(crate) fn zeroed(sectors: usize, sector_size: usize) -> Self {
        Self::create(&vec![0u8; sectors * sector_size], sector_size)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of `count` sectors starting at `first`
    pub(crate) fn sectors(&self, first: usize, count: usize) -> Vec<u8> {
        let data = fs::read(&self.path).expect("read scratch file");
        data[first * self.sector_size..(first + count) * self.sector_size].to_vec()
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Shared in-memory storage
#[derive(Clone)]
pub(crate) struct MemoryDisk {
    id: u64,
    data: Arc<Mutex<Vec<u8>>>,
}

impl MemoryDisk {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self {
            id: COUNTER.fetch_add(1, Ordering::Relaxed),
            data: Arc::new(Mutex::new(data)),
        }
    }

    pub(crate) fn with_pattern(len: usize) -> Self {
        Self::new(pattern(len))
    }

    pub(crate) fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }
}

/// Calls observed by a memory backend, shared with the test
#[derive(Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<(i64, i64)>>>);

impl CallLog {
    pub(crate) fn calls(&self) -> Vec<(i64, i64)> {
        self.0.lock().unwrap().clone()
    }

    fn push(&self, offset: i64, count: i64) {
        self.0.lock().unwrap().push((offset, count));
    }

    fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

pub(crate) struct MemorySource {
    disk: MemoryDisk,
    sector_size: u32,
    range: SectorRange,
    open: bool,
    pub(crate) reads: CallLog,
    /// 1-based read call that fails
    pub(crate) fail_on_read: Option<usize>,
}

impl MemorySource {
    pub(crate) fn new(disk: &MemoryDisk, sector_size: u32, range: SectorRange) -> Self {
        Self {
            disk: disk.clone(),
            sector_size,
            range,
            open: false,
            reads: CallLog::default(),
            fail_on_read: None,
        }
    }
}

impl CopySource for MemorySource {
    fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn read_sectors(
        &mut self,
        buffer: &mut [u8],
        read_offset: i64,
        num_sectors: i64,
    ) -> Result<()> {
        self.reads.push(read_offset, num_sectors);
        if self.fail_on_read == Some(self.reads.len()) {
            return Err(SysError::SectorIo {
                backend: self.describe(),
                sector: self.range.first + read_offset,
                source: std::io::Error::other("injected read failure"),
            });
        }
        if !self.range.contains_span(read_offset, num_sectors) {
            return Err(SysError::BoundsViolation {
                backend: self.describe(),
                offset: read_offset,
                count: num_sectors,
                length: self.range.len(),
            });
        }
        let size = self.sector_size as usize;
        let start = (self.range.first + read_offset) as usize * size;
        let len = num_sectors as usize * size;
        let data = self.disk.data.lock().unwrap();
        buffer[..len].copy_from_slice(&data[start..start + len]);
        Ok(())
    }

    fn first_sector(&self) -> i64 {
        self.range.first
    }

    fn last_sector(&self) -> i64 {
        self.range.last
    }

    fn backend_id(&self) -> Option<BackendId> {
        self.open.then_some(BackendId::Other(self.disk.id))
    }

    fn describe(&self) -> String {
        format!("memory:{}", self.disk.id)
    }
}

pub(crate) struct MemoryTarget {
    disk: MemoryDisk,
    sector_size: u32,
    range: SectorRange,
    open: bool,
    sectors_written: i64,
    pub(crate) writes: CallLog,
    /// 1-based write call that fails
    pub(crate) fail_on_write: Option<usize>,
    pub(crate) synced: bool,
}

impl MemoryTarget {
    pub(crate) fn new(disk: &MemoryDisk, sector_size: u32, range: SectorRange) -> Self {
        Self {
            disk: disk.clone(),
            sector_size,
            range,
            open: false,
            sectors_written: 0,
            writes: CallLog::default(),
            fail_on_write: None,
            synced: false,
        }
    }
}

impl CopyTarget for MemoryTarget {
    fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn write_sectors(&mut self, buffer: &[u8], write_offset: i64, num_sectors: i64) -> Result<()> {
        self.writes.push(write_offset, num_sectors);
        if self.fail_on_write == Some(self.writes.len()) {
            return Err(SysError::ShortTransfer {
                backend: self.describe(),
                op: "write",
                sector: self.range.first + write_offset,
                expected: num_sectors as usize * self.sector_size as usize,
                actual: 0,
            });
        }
        if !self.range.contains_span(write_offset, num_sectors) {
            return Err(SysError::BoundsViolation {
                backend: self.describe(),
                offset: write_offset,
                count: num_sectors,
                length: self.range.len(),
            });
        }
        let size = self.sector_size as usize;
        let start = (self.range.first + write_offset) as usize * size;
        let len = num_sectors as usize * size;
        let mut data = self.disk.data.lock().unwrap();
        data[start..start + len].copy_from_slice(&buffer[..len]);
        self.sectors_written = self.sectors_written.max(write_offset + num_sectors);
        Ok(())
    }

    fn first_sector(&self) -> i64 {
        self.range.first
    }

    fn last_sector(&self) -> i64 {
        self.range.last
    }

    fn sectors_written(&self) -> i64 {
        self.sectors_written
    }

    fn writable_range(&self) -> SectorRange {
        self.range
    }

    fn backend_id(&self) -> Option<BackendId> {
        self.open.then_some(BackendId::Other(self.disk.id))
    }

    fn describe(&self) -> String {
        format!("memory:{}", self.disk.id)
    }

    fn sync(&mut self) -> Result<()> {
        self.synced = true;
        Ok(())
    }
}
