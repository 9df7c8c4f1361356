// SPDX-License-Identifier: GPL-3.0-only

//! Mount state of block devices
//!
//! Current mounts come from `/proc/self/mountinfo`, possible mount points
//! from `/etc/fstab`. Device paths are compared after resolving
//! `UUID=`/`LABEL=` style sources and canonicalising symlinks, so
//! `/dev/vg0/root` matches `/dev/mapper/vg0-root`.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{Result, SysError};

const MOUNTINFO: &str = "/proc/self/mountinfo";
const FSTAB: &str = "/etc/fstab";

/// Mount state queries
pub trait MountTable {
    fn is_mounted(&self, path: &str) -> bool;

    /// Current mount point, else the one configured in fstab
    fn mount_point_of(&self, path: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Source as written in the table
    pub source: String,
    /// Source resolved to a canonical device path when possible
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
}

/// Mount tables read once
#[derive(Debug, Clone, Default)]
pub struct MountSnapshot {
    current: Vec<MountEntry>,
    possible: Vec<MountEntry>,
}

impl MountSnapshot {
    /// Read the system tables. A missing fstab is not an error.
    pub fn load() -> Result<Self> {
        let mountinfo = fs::read_to_string(MOUNTINFO)?;
        let fstab = fs::read_to_string(FSTAB).unwrap_or_else(|e| {
            debug!("Cannot read {}: {}", FSTAB, e);
            String::new()
        });
        Self::from_tables(&mountinfo, &fstab)
    }

    pub fn from_tables(mountinfo: &str, fstab: &str) -> Result<Self> {
        Ok(Self {
            current: parse_mountinfo(mountinfo)?,
            possible: parse_fstab(fstab),
        })
    }

    pub fn current(&self) -> &[MountEntry] {
        &self.current
    }

    pub fn possible(&self) -> &[MountEntry] {
        &self.possible
    }
}

impl MountTable for MountSnapshot {
    fn is_mounted(&self, path: &str) -> bool {
        let device = canonical(path);
        self.current.iter().any(|entry| entry.device == device)
    }

    fn mount_point_of(&self, path: &str) -> Option<String> {
        let device = canonical(path);
        self.current
            .iter()
            .chain(&self.possible)
            .find(|entry| entry.device == device)
            .map(|entry| entry.mount_point.clone())
    }
}

/// Parse `/proc/self/mountinfo` content
pub fn parse_mountinfo(input: &str) -> Result<Vec<MountEntry>> {
    let mut entries = Vec::new();

    for line in input.lines().filter(|line| !line.trim().is_empty()) {
        let invalid = || SysError::InvalidMountInfoLine(line.to_string());
        let (left, right) = line.split_once(" - ").ok_or_else(invalid)?;

        let mount_point = left.split_whitespace().nth(4).ok_or_else(invalid)?;
        let mut right_fields = right.split_whitespace();
        let fs_type = right_fields.next().ok_or_else(invalid)?;
        let source = right_fields.next().ok_or_else(invalid)?;

        let source = unescape_mount_field(source);
        entries.push(MountEntry {
            device: resolve_source(&source),
            source,
            mount_point: unescape_mount_field(mount_point),
            fs_type: fs_type.to_string(),
        });
    }

    Ok(entries)
}

/// Parse fstab content, skipping comments and entries without a mount point
/// (swap).
pub fn parse_fstab(input: &str) -> Vec<MountEntry> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = unescape_mount_field(fields.next()?);
            let mount_point = unescape_mount_field(fields.next()?);
            let fs_type = fields.next().unwrap_or("auto").to_string();
            if !mount_point.starts_with('/') {
                return None;
            }
            Some(MountEntry {
                device: resolve_source(&source),
                source,
                mount_point,
                fs_type,
            })
        })
        .collect()
}

/// Map `UUID=`, `LABEL=`, `PARTUUID=` and `PARTLABEL=` sources onto their
/// `/dev/disk/by-*` links, then canonicalise.
fn resolve_source(source: &str) -> String {
    const TAGS: [(&str, &str); 4] = [
        ("UUID=", "/dev/disk/by-uuid/"),
        ("LABEL=", "/dev/disk/by-label/"),
        ("PARTUUID=", "/dev/disk/by-partuuid/"),
        ("PARTLABEL=", "/dev/disk/by-partlabel/"),
    ];

    for (tag, dir) in TAGS {
        if let Some(value) = source.strip_prefix(tag) {
            let value = value.trim_matches('"');
            return canonical(&format!("{dir}{value}"));
        }
    }
    canonical(source)
}

fn canonical(path: &str) -> String {
    fs::canonicalize(Path::new(path))
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string())
}

/// Decode the `\NNN` octal escapes the kernel uses for whitespace
fn unescape_mount_field(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut output = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'\\'
            && index + 4 <= bytes.len()
            && bytes[index + 1..index + 4].iter().all(u8::is_ascii_digit)
            && let Ok(num) = u8::from_str_radix(&value[index + 1..index + 4], 8)
        {
            output.push(num);
            index += 4;
            continue;
        }

        output.push(bytes[index]);
        index += 1;
    }

    String::from_utf8_lossy(&output).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copy::memory::ScratchFile;

    const MOUNTINFO_SAMPLE: &str = "\
36 25 8:2 / / rw,relatime - ext4 /dev/nvme0n1p2 rw
37 25 0:5 / /proc rw,nosuid,nodev,noexec,relatime - proc proc rw
41 36 253:1 / /mnt/my\\040data rw,relatime - xfs /dev/vg0/data rw
";

    const FSTAB_SAMPLE: &str = "\
# <file system> <mount point> <type> <options> <dump> <pass>
/dev/vg0/home   /home   ext4   defaults   0 2
/dev/vg0/swap   none    swap   sw         0 0

UUID=0000-test-uuid /boot/efi vfat umask=0077 0 1
";

    #[test]
    fn parses_mountinfo_sources_and_escaped_mount_points() {
        let entries = parse_mountinfo(MOUNTINFO_SAMPLE).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].source, "/dev/vg0/data");
        assert_eq!(entries[2].mount_point, "/mnt/my data");
        assert_eq!(entries[2].fs_type, "xfs");
    }

    #[test]
    fn rejects_malformed_mountinfo() {
        assert!(matches!(
            parse_mountinfo("36 25 8:2 / / rw,relatime ext4 /dev/sda1 rw"),
            Err(SysError::InvalidMountInfoLine(_))
        ));
    }

    #[test]
    fn fstab_skips_comments_and_swap() {
        let entries = parse_fstab(FSTAB_SAMPLE);
        let mount_points: Vec<_> = entries.iter().map(|e| e.mount_point.as_str()).collect();
        assert_eq!(mount_points, vec!["/home", "/boot/efi"]);
        assert_eq!(entries[1].device, "/dev/disk/by-uuid/0000-test-uuid");
    }

    #[test]
    fn current_mounts_take_precedence_over_fstab() {
        let fstab = format!("{FSTAB_SAMPLE}/dev/vg0/data /srv xfs defaults 0 0\n");
        let snapshot = MountSnapshot::from_tables(MOUNTINFO_SAMPLE, &fstab).unwrap();

        assert!(snapshot.is_mounted("/dev/vg0/data"));
        assert_eq!(
            snapshot.mount_point_of("/dev/vg0/data").as_deref(),
            Some("/mnt/my data")
        );

        assert!(!snapshot.is_mounted("/dev/vg0/home"));
        assert_eq!(snapshot.mount_point_of("/dev/vg0/home").as_deref(), Some("/home"));
        assert_eq!(snapshot.mount_point_of("/dev/vg0/swap"), None);
    }

    #[test]
    fn symlinked_sources_match_their_target() {
        let device = ScratchFile::zeroed(1, 512);
        let link = device.path().with_extension("link");
        std::os::unix::fs::symlink(device.path(), &link).unwrap();

        let mountinfo = format!(
            "50 36 7:0 / /mnt/scratch rw - ext4 {} rw\n",
            link.display()
        );
        let snapshot = MountSnapshot::from_tables(&mountinfo, "").unwrap();
        let _ = fs::remove_file(&link);

        let real = fs::canonicalize(device.path()).unwrap();
        assert!(snapshot.is_mounted(&real.to_string_lossy()));
        assert_eq!(
            snapshot.mount_point_of(&real.to_string_lossy()).as_deref(),
            Some("/mnt/scratch")
        );
    }
}
