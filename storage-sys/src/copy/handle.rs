// SPDX-License-Identifier: GPL-3.0-only

//! Exclusive, scoped handles on block devices and plain files
//!
//! A `BackendHandle` is opened once and closed when dropped. It knows the
//! identity of the storage behind it, the size of that storage and, for block
//! devices, the kernel-reported logical sector size.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::fd::AsRawFd;
use std::os::unix::fs::{FileExt, FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};

use storage_types::DEFAULT_SECTOR_SIZE;
use tracing::{debug, warn};

use super::BackendId;
use crate::error::{Result, SysError};

const BLKSSZGET: libc::c_ulong = 0x1268;
const BLKGETSIZE64: libc::c_ulong = 0x80081272;

/// How a backend is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Existing device or file, read-only
    Read,
    /// Existing device or file, write-only; never created or truncated
    Write,
    /// Plain file, created when missing; existing contents are kept until
    /// `truncate` is called
    Create,
}

/// Owned handle on an open device or file
#[derive(Debug)]
pub struct BackendHandle {
    file: File,
    path: PathBuf,
    id: BackendId,
    access: Access,
    block_device: bool,
    size_bytes: u64,
    logical_sector_size: Option<u32>,
}

impl BackendHandle {
    pub fn open(path: &Path, access: Access) -> Result<Self> {
        let backend = path.display().to_string();
        let mut options = OpenOptions::new();
        match access {
            Access::Read => {
                options.read(true);
            }
            Access::Write => {
                options.write(true);
            }
            Access::Create => {
                options.write(true).create(true).truncate(false);
            }
        }

        let file = options
            .open(path)
            .map_err(|e| SysError::from_open(&backend, e))?;
        let metadata = file
            .metadata()
            .map_err(|e| SysError::from_open(&backend, e))?;

        let block_device = metadata.file_type().is_block_device();
        let id = if block_device {
            BackendId::BlockDevice {
                rdev: metadata.rdev(),
            }
        } else {
            BackendId::File {
                dev: metadata.dev(),
                ino: metadata.ino(),
            }
        };

        let (size_bytes, logical_sector_size) = if block_device {
            (
                block_device_size(&file, &backend)?,
                Some(block_sector_size(&file, &backend)?),
            )
        } else {
            (metadata.len(), None)
        };

        debug!(
            backend = %backend,
            ?access,
            ?id,
            size_bytes,
            "Opened backend handle"
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            id,
            access,
            block_device,
            size_bytes,
            logical_sector_size,
        })
    }

    pub fn id(&self) -> BackendId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_block_device(&self) -> bool {
        self.block_device
    }

    /// Size of the device, or of the file at the time it was opened
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Kernel-reported logical sector size; `None` for plain files
    pub fn logical_sector_size(&self) -> Option<u32> {
        self.logical_sector_size
    }

    /// Fill `buffer` from absolute sector `sector`.
    pub fn read_sectors_at(&self, buffer: &mut [u8], sector: i64, sector_size: u32) -> Result<()> {
        let offset = byte_offset(sector, sector_size)?;
        let mut done = 0;
        while done < buffer.len() {
            match self.file.read_at(&mut buffer[done..], offset + done as u64) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.sector_error(sector, e)),
            }
        }

        if done < buffer.len() {
            return Err(SysError::ShortTransfer {
                backend: self.path.display().to_string(),
                op: "read",
                sector,
                expected: buffer.len(),
                actual: done,
            });
        }
        Ok(())
    }

    /// Write all of `buffer` at absolute sector `sector`.
    pub fn write_sectors_at(&self, buffer: &[u8], sector: i64, sector_size: u32) -> Result<()> {
        let offset = byte_offset(sector, sector_size)?;
        let mut done = 0;
        while done < buffer.len() {
            match self.file.write_at(&buffer[done..], offset + done as u64) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.sector_error(sector, e)),
            }
        }

        if done < buffer.len() {
            return Err(SysError::ShortTransfer {
                backend: self.path.display().to_string(),
                op: "write",
                sector,
                expected: buffer.len(),
                actual: done,
            });
        }
        Ok(())
    }

    /// Drop everything stored in a plain file
    pub fn truncate(&mut self) -> Result<()> {
        if self.block_device {
            return Err(SysError::InvalidArgument(format!(
                "{} is a block device and cannot be truncated",
                self.path.display()
            )));
        }
        self.file.set_len(0).map_err(|e| self.sector_error(0, e))?;
        self.size_bytes = 0;
        debug!(backend = %self.path.display(), "Truncated backend");
        Ok(())
    }

    /// Flush written data to stable storage
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all().map_err(|e| self.sector_error(-1, e))
    }

    fn sector_error(&self, sector: i64, source: std::io::Error) -> SysError {
        SysError::SectorIo {
            backend: self.path.display().to_string(),
            sector,
            source,
        }
    }
}

impl Drop for BackendHandle {
    fn drop(&mut self) {
        debug!(backend = %self.path.display(), access = ?self.access, "Released backend handle");
    }
}

/// Logical sector size of the device at `path`.
///
/// Plain files report `DEFAULT_SECTOR_SIZE`.
pub fn logical_sector_size(path: &Path) -> Result<u32> {
    let handle = BackendHandle::open(path, Access::Read)?;
    Ok(handle
        .logical_sector_size()
        .unwrap_or(DEFAULT_SECTOR_SIZE))
}

fn byte_offset(sector: i64, sector_size: u32) -> Result<u64> {
    u64::try_from(sector)
        .ok()
        .and_then(|s| s.checked_mul(u64::from(sector_size)))
        .ok_or_else(|| SysError::InvalidArgument(format!("sector {sector} is not addressable")))
}

fn block_device_size(file: &File, backend: &str) -> Result<u64> {
    let mut size: u64 = 0;
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), BLKGETSIZE64 as _, &mut size) };
    if ret == -1 {
        let error = std::io::Error::last_os_error();
        warn!("BLKGETSIZE64 failed on {}: {}", backend, error);
        return Err(SysError::OpenFailed {
            backend: backend.to_string(),
            source: error,
        });
    }
    Ok(size)
}

fn block_sector_size(file: &File, backend: &str) -> Result<u32> {
    let mut size: libc::c_int = 0;
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), BLKSSZGET as _, &mut size) };
    if ret == -1 {
        let error = std::io::Error::last_os_error();
        warn!("BLKSSZGET failed on {}: {}", backend, error);
        return Err(SysError::OpenFailed {
            backend: backend.to_string(),
            source: error,
        });
    }
    u32::try_from(size)
        .ok()
        .filter(|s| *s > 0)
        .ok_or_else(|| SysError::InvalidArgument(format!("{backend} reports sector size {size}")))
}
