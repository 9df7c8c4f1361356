// SPDX-License-Identifier: GPL-3.0-only

//! Filesystem detection for partition records
//!
//! Used only to annotate records; never involved in copying data.

use std::path::Path;
use std::process::Command;

use storage_types::FilesystemType;
use tracing::{debug, warn};

/// Filesystem queries on a device path
pub trait FilesystemProbe {
    fn detect_type(&self, path: &str) -> FilesystemType;

    fn read_label(&self, path: &str) -> Option<String>;

    fn read_uuid(&self, _path: &str) -> Option<String> {
        None
    }

    /// Whether labels of `fs_type` can be read at all
    fn supports_label_query(&self, fs_type: FilesystemType) -> bool {
        fs_type.supports_label()
    }

    /// Sectors in use by the filesystem mounted at `mount_point`
    fn used_sectors(&self, path: &str, mount_point: &str, sector_size: i64) -> Option<i64>;
}

/// `FilesystemProbe` backed by `blkid` and `statvfs`
#[derive(Debug, Clone)]
pub struct BlkidProbe {
    command: String,
}

impl Default for BlkidProbe {
    fn default() -> Self {
        Self::new("blkid")
    }
}

impl BlkidProbe {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn from_config(config: &crate::config::EngineConfig) -> Self {
        Self::new(config.blkid_command.clone())
    }

    /// Value of one blkid tag. `Ok(None)` when the device carries no
    /// recognised signature.
    fn tag(&self, path: &str, tag: &str) -> Result<Option<String>, String> {
        if !cfg!(feature = "blkid-tools") {
            return Err(format!("{} support disabled", self.command));
        }
        let output = Command::new(&self.command)
            .args(["-o", "value", "-s", tag, path])
            .output()
            .map_err(|e| format!("{}: {}", self.command, e))?;

        match output.status.code() {
            Some(0) => {
                let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
                Ok((!value.is_empty()).then_some(value))
            }
            // blkid exits with 2 when nothing was found
            Some(2) => Ok(None),
            _ => Err(String::from_utf8_lossy(&output.stderr).trim().to_string()),
        }
    }
}

impl FilesystemProbe for BlkidProbe {
    fn detect_type(&self, path: &str) -> FilesystemType {
        match self.tag(path, "TYPE") {
            Ok(Some(tag)) if tag == "vfat" => {
                let version = self
                    .tag(path, "VERSION")
                    .map_err(|e| debug!("Cannot read FAT version of {}: {}", path, e))
                    .ok()
                    .flatten();
                FilesystemType::from_blkid_tags(&tag, version.as_deref())
            }
            Ok(Some(tag)) => FilesystemType::from_blkid_tag(&tag),
            Ok(None) => FilesystemType::Unformatted,
            Err(e) => {
                warn!("Cannot detect filesystem on {}: {}", path, e);
                FilesystemType::Unknown
            }
        }
    }

    fn read_label(&self, path: &str) -> Option<String> {
        self.tag(path, "LABEL")
            .map_err(|e| debug!("Cannot read label of {}: {}", path, e))
            .ok()
            .flatten()
    }

    fn read_uuid(&self, path: &str) -> Option<String> {
        self.tag(path, "UUID")
            .map_err(|e| debug!("Cannot read UUID of {}: {}", path, e))
            .ok()
            .flatten()
    }

    fn used_sectors(&self, _path: &str, mount_point: &str, sector_size: i64) -> Option<i64> {
        used_bytes(Path::new(mount_point)).map(|bytes| bytes / sector_size.max(1))
    }
}

/// Bytes in use on the filesystem mounted at `mount_point`
pub fn used_bytes(mount_point: &Path) -> Option<i64> {
    let stat = nix::sys::statvfs::statvfs(mount_point)
        .map_err(|e| debug!("statvfs {} failed: {}", mount_point.display(), e))
        .ok()?;
    let fragment = stat.fragment_size() as u64;
    let used_blocks = (stat.blocks() as u64).saturating_sub(stat.blocks_free() as u64);
    i64::try_from(used_blocks.saturating_mul(fragment)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_blkid_reports_unknown() {
        let probe = BlkidProbe::new("/nonexistent/blkid");
        assert_eq!(probe.detect_type("/dev/null"), FilesystemType::Unknown);
        assert_eq!(probe.read_label("/dev/null"), None);
        assert_eq!(probe.read_uuid("/dev/null"), None);
    }

    #[test]
    fn label_support_follows_the_type() {
        let probe = BlkidProbe::default();
        assert!(probe.supports_label_query(FilesystemType::Ext4));
        assert!(!probe.supports_label_query(FilesystemType::Unformatted));
    }

    #[test]
    fn used_space_of_a_mounted_filesystem() {
        let used = used_bytes(Path::new("/")).unwrap();
        assert!(used >= 0);
        assert_eq!(used_bytes(Path::new("/nonexistent/mount")), None);

        let probe = BlkidProbe::default();
        assert!(probe.used_sectors("/dev/root", "/", 512).is_some());
        assert_eq!(probe.used_sectors("/dev/root", "/nonexistent/mount", 512), None);
    }
}
