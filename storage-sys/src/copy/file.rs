// SPDX-License-Identifier: GPL-3.0-only

//! Plain-file sources and targets holding flat sector images
//!
//! Image files carry no header: byte `n * sector_size` of the file is
//! relative sector `n`.

use std::path::{Path, PathBuf};

use storage_types::SectorRange;

use super::handle::{Access, BackendHandle};
use super::{BackendId, CopySource, CopyTarget};
use crate::error::{Result, SysError};

/// Write a flat image file.
///
/// The file is created on open when missing and emptied only when the copy
/// starts, after it has been checked against the source.
#[derive(Debug)]
pub struct FileTarget {
    path: PathBuf,
    sector_size: u32,
    sync_on_close: bool,
    sectors_written: i64,
    handle: Option<BackendHandle>,
}

impl FileTarget {
    pub fn new(path: impl Into<PathBuf>, sector_size: u32) -> Self {
        Self {
            path: path.into(),
            sector_size,
            sync_on_close: true,
            sectors_written: 0,
            handle: None,
        }
    }

    pub fn with_sync_on_close(mut self, sync_on_close: bool) -> Self {
        self.sync_on_close = sync_on_close;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CopyTarget for FileTarget {
    fn open(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        if self.sector_size == 0 || !self.sector_size.is_power_of_two() {
            return Err(SysError::InvalidArgument(format!(
                "sector size {} is not a power of two",
                self.sector_size
            )));
        }
        self.handle = Some(BackendHandle::open(&self.path, Access::Create)?);
        self.sectors_written = 0;
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

        if write_offset < 0 || num_sectors < 0 {
            return Err(SysError::BoundsViolation {
                backend: self.path.display().to_string(),
                offset: write_offset,
                count: num_sectors,
                length: self.sectors_written,
            });
        }

        let len = (num_sectors as usize)
            .checked_mul(self.sector_size as usize)
            .filter(|len| *len <= buffer.len())
            .ok_or_else(|| {
                SysError::InvalidArgument(format!(
                    "buffer of {} bytes cannot hold {} sectors",
                    buffer.len(),
                    num_sectors
                ))
            })?;

        handle.write_sectors_at(&buffer[..len], write_offset, self.sector_size)?;
        self.sectors_written = self.sectors_written.max(write_offset + num_sectors);
        Ok(())
    }

    fn first_sector(&self) -> i64 {
        0
    }

    fn last_sector(&self) -> i64 {
        self.sectors_written
    }

    fn sectors_written(&self) -> i64 {
        self.sectors_written
    }

    fn writable_range(&self) -> SectorRange {
        SectorRange {
            first: 0,
            last: i64::MAX - 1,
        }
    }

    fn backend_id(&self) -> Option<BackendId> {
        self.handle.as_ref().map(BackendHandle::id)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn replaces_contents(&self) -> bool {
        true
    }

    fn prepare(&mut self) -> Result<()> {
        let handle = self.handle.as_mut().ok_or_else(|| SysError::NotOpen {
            backend: self.path.display().to_string(),
        })?;
        handle.truncate()?;
        self.sectors_written = 0;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        match (&self.handle, self.sync_on_close) {
            (Some(handle), true) => handle.sync(),
            _ => Ok(()),
        }
    }
}

/// Read a flat image file; its length is the whole sectors it holds
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    sector_size: u32,
    length: i64,
    handle: Option<BackendHandle>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, sector_size: u32) -> Self {
        Self {
            path: path.into(),
            sector_size,
            length: 0,
            handle: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CopySource for FileSource {
    fn open(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        if self.sector_size == 0 || !self.sector_size.is_power_of_two() {
            return Err(SysError::InvalidArgument(format!(
                "sector size {} is not a power of two",
                self.sector_size
            )));
        }
        let handle = BackendHandle::open(&self.path, Access::Read)?;
        self.length = (handle.size_bytes() / u64::from(self.sector_size)) as i64;
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

        let range = SectorRange {
            first: 0,
            last: self.length - 1,
        };
        if !range.contains_span(read_offset, num_sectors) {
            return Err(SysError::BoundsViolation {
                backend: self.path.display().to_string(),
                offset: read_offset,
                count: num_sectors,
                length: self.length,
            });
        }

        let len = (num_sectors as usize)
            .checked_mul(self.sector_size as usize)
            .filter(|len| *len <= buffer.len())
            .ok_or_else(|| {
                SysError::InvalidArgument(format!(
                    "buffer of {} bytes cannot hold {} sectors",
                    buffer.len(),
                    num_sectors
                ))
            })?;

        handle.read_sectors_at(&mut buffer[..len], read_offset, self.sector_size)
    }

    fn first_sector(&self) -> i64 {
        0
    }

    fn last_sector(&self) -> i64 {
        self.length - 1
    }

    fn backend_id(&self) -> Option<BackendId> {
        self.handle.as_ref().map(BackendHandle::id)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copy::memory::ScratchFile;

    #[test]
    fn out_of_order_writes_extend_the_high_water_mark() {
        let scratch = ScratchFile::zeroed(0, 512);
        let mut target = FileTarget::new(scratch.path(), 512).with_sync_on_close(false);
        target.open().unwrap();

        let block = vec![7u8; 4 * 512];
        target.write_sectors(&block, 8, 4).unwrap();
        assert_eq!(target.sectors_written(), 12);
        target.write_sectors(&block, 0, 4).unwrap();
        assert_eq!(target.sectors_written(), 12);
        assert_eq!(target.last_sector(), 12);
        assert_eq!(target.first_sector(), 0);

        let written = std::fs::metadata(scratch.path()).unwrap().len();
        assert_eq!(written, 12 * 512);
        assert_eq!(scratch.sectors(4, 4), vec![0u8; 4 * 512]);
    }

    #[test]
    fn file_source_length_counts_whole_sectors() {
        let scratch = ScratchFile::with_pattern(10, 512);
        let mut source = FileSource::new(scratch.path(), 1024);
        source.open().unwrap();
        assert_eq!(source.length(), 5);
        assert_eq!(source.first_sector(), 0);
        assert_eq!(source.last_sector(), 4);

        let mut buffer = vec![0u8; 1024];
        source.read_sectors(&mut buffer, 4, 1).unwrap();
        assert_eq!(buffer, scratch.sectors(8, 2));
        assert!(source.read_sectors(&mut buffer, 5, 1).is_err());
    }

    #[test]
    fn existing_image_is_kept_until_the_copy_starts() {
        let scratch = ScratchFile::with_pattern(8, 512);
        let before = scratch.sectors(0, 8);
        let mut target = FileTarget::new(scratch.path(), 512).with_sync_on_close(false);
        target.open().unwrap();
        assert_eq!(scratch.sectors(0, 8), before);

        target.prepare().unwrap();
        assert_eq!(std::fs::metadata(scratch.path()).unwrap().len(), 0);
        assert_eq!(target.sectors_written(), 0);
    }

    #[test]
    fn writes_before_open_fail() {
        let scratch = ScratchFile::zeroed(0, 512);
        let mut target = FileTarget::new(scratch.path(), 512);
        assert!(matches!(
            target.write_sectors(&[0u8; 512], 0, 1),
            Err(SysError::NotOpen { .. })
        ));
    }
}
