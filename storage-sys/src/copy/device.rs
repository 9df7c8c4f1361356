// SPDX-License-Identifier: GPL-3.0-only

//! Device-backed sources and targets restricted to a fixed sector range

use std::path::{Path, PathBuf};

use storage_types::SectorRange;
use tracing::warn;

use super::handle::{Access, BackendHandle};
use super::{BackendId, CopySource, CopyTarget};
use crate::error::{Result, SysError};

/// Read `[first, last]` of a device (or of a device image file)
#[derive(Debug)]
pub struct DeviceSource {
    path: PathBuf,
    sector_size: u32,
    range: SectorRange,
    handle: Option<BackendHandle>,
}

impl DeviceSource {
    pub fn new(path: impl Into<PathBuf>, sector_size: u32, range: SectorRange) -> Self {
        Self {
            path: path.into(),
            sector_size,
            range,
            handle: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn range(&self) -> SectorRange {
        self.range
    }

    /// Release the backend handle early
    pub fn close(&mut self) {
        self.handle = None;
    }
}

impl CopySource for DeviceSource {
    fn open(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let handle = BackendHandle::open(&self.path, Access::Read)?;
        check_geometry(&handle, self.sector_size, self.range)?;
        self.handle = Some(handle);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
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
        let handle = self.handle.as_ref().ok_or_else(|| SysError::NotOpen {
            backend: self.path.display().to_string(),
        })?;
        let len = checked_span(
            &self.path,
            self.range,
            self.sector_size,
            read_offset,
            num_sectors,
            buffer.len(),
        )?;
        handle.read_sectors_at(
            &mut buffer[..len],
            self.range.first + read_offset,
            self.sector_size,
        )
    }

    fn first_sector(&self) -> i64 {
        self.range.first
    }

    fn last_sector(&self) -> i64 {
        self.range.last
    }

    fn backend_id(&self) -> Option<BackendId> {
        self.handle.as_ref().map(BackendHandle::id)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Write into `[first, last]` of a device (or of a device image file)
#[derive(Debug)]
pub struct DeviceTarget {
    path: PathBuf,
    sector_size: u32,
    range: SectorRange,
    sync_on_close: bool,
    sectors_written: i64,
    handle: Option<BackendHandle>,
}

impl DeviceTarget {
    pub fn new(path: impl Into<PathBuf>, sector_size: u32, range: SectorRange) -> Self {
        Self {
            path: path.into(),
            sector_size,
            range,
            sync_on_close: true,
            sectors_written: 0,
            handle: None,
        }
    }

    /// Whether `sync()` flushes the device (default: true)
    pub fn with_sync_on_close(mut self, sync_on_close: bool) -> Self {
        self.sync_on_close = sync_on_close;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn close(&mut self) {
        self.handle = None;
    }
}

impl CopyTarget for DeviceTarget {
    fn open(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let handle = BackendHandle::open(&self.path, Access::Write)?;
        check_geometry(&handle, self.sector_size, self.range)?;
        self.handle = Some(handle);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn write_sectors(&mut self, buffer: &[u8], write_offset: i64, num_sectors: i64) -> Result<()> {
        let handle = self.handle.as_ref().ok_or_else(|| SysError::NotOpen {
            backend: self.path.display().to_string(),
        })?;
        let len = checked_span(
            &self.path,
            self.range,
            self.sector_size,
            write_offset,
            num_sectors,
            buffer.len(),
        )?;
        handle.write_sectors_at(
            &buffer[..len],
            self.range.first + write_offset,
            self.sector_size,
        )?;
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
        self.handle.as_ref().map(BackendHandle::id)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn sync(&mut self) -> Result<()> {
        match (&self.handle, self.sync_on_close) {
            (Some(handle), true) => handle.sync(),
            _ => Ok(()),
        }
    }
}

/// Validate that `range` fits the opened backend and that the configured
/// sector size agrees with what a block device reports.
fn check_geometry(handle: &BackendHandle, sector_size: u32, range: SectorRange) -> Result<()> {
    let backend = handle.path().display().to_string();

    if sector_size == 0 || !sector_size.is_power_of_two() {
        return Err(SysError::InvalidArgument(format!(
            "sector size {sector_size} of {backend} is not a power of two"
        )));
    }

    if let Some(reported) = handle.logical_sector_size()
        && reported != sector_size
    {
        warn!(
            "{} reports {} byte sectors, caller assumed {}",
            backend, reported, sector_size
        );
        return Err(SysError::InvalidArgument(format!(
            "{backend} has {reported} byte sectors, not {sector_size}"
        )));
    }

    let device_sectors = (handle.size_bytes() / u64::from(sector_size)) as i64;
    if range.first < 0 || range.last >= device_sectors {
        return Err(SysError::BoundsViolation {
            backend,
            offset: range.first,
            count: range.len(),
            length: device_sectors,
        });
    }
    Ok(())
}

/// Bounds-check a relative span and return its length in bytes.
fn checked_span(
    path: &Path,
    range: SectorRange,
    sector_size: u32,
    offset: i64,
    num_sectors: i64,
    buffer_len: usize,
) -> Result<usize> {
    if !range.contains_span(offset, num_sectors) {
        return Err(SysError::BoundsViolation {
            backend: path.display().to_string(),
            offset,
            count: num_sectors,
            length: range.len(),
        });
    }

    let len = (num_sectors as usize)
        .checked_mul(sector_size as usize)
        .filter(|len| *len <= buffer_len)
        .ok_or_else(|| {
            SysError::InvalidArgument(format!(
                "buffer of {buffer_len} bytes cannot hold {num_sectors} sectors of {sector_size} bytes"
            ))
        })?;
    Ok(len)
}
