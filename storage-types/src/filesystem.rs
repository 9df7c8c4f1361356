// SPDX-License-Identifier: GPL-3.0-only

//! Filesystem type catalogue and per-partition filesystem details

use serde::{Deserialize, Serialize};

use crate::SectorRange;

/// Filesystem types known to the partition model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilesystemType {
    #[default]
    Unknown,
    Extended,
    Ext2,
    Ext3,
    Ext4,
    LinuxSwap,
    Fat16,
    Fat32,
    Ntfs,
    ReiserFs,
    Reiser4,
    Xfs,
    Jfs,
    Hfs,
    HfsPlus,
    Ufs,
    Unformatted,
    Btrfs,
    Hpfs,
    Luks,
    Ocfs2,
    Zfs,
    Exfat,
    Nilfs2,
    Lvm2Pv,
    F2fs,
}

impl FilesystemType {
    pub const ALL: [FilesystemType; 26] = [
        FilesystemType::Unknown,
        FilesystemType::Extended,
        FilesystemType::Ext2,
        FilesystemType::Ext3,
        FilesystemType::Ext4,
        FilesystemType::LinuxSwap,
        FilesystemType::Fat16,
        FilesystemType::Fat32,
        FilesystemType::Ntfs,
        FilesystemType::ReiserFs,
        FilesystemType::Reiser4,
        FilesystemType::Xfs,
        FilesystemType::Jfs,
        FilesystemType::Hfs,
        FilesystemType::HfsPlus,
        FilesystemType::Ufs,
        FilesystemType::Unformatted,
        FilesystemType::Btrfs,
        FilesystemType::Hpfs,
        FilesystemType::Luks,
        FilesystemType::Ocfs2,
        FilesystemType::Zfs,
        FilesystemType::Exfat,
        FilesystemType::Nilfs2,
        FilesystemType::Lvm2Pv,
        FilesystemType::F2fs,
    ];

    /// Printable name
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Extended => "extended",
            Self::Ext2 => "ext2",
            Self::Ext3 => "ext3",
            Self::Ext4 => "ext4",
            Self::LinuxSwap => "linuxswap",
            Self::Fat16 => "fat16",
            Self::Fat32 => "fat32",
            Self::Ntfs => "ntfs",
            Self::ReiserFs => "reiser",
            Self::Reiser4 => "reiser4",
            Self::Xfs => "xfs",
            Self::Jfs => "jfs",
            Self::Hfs => "hfs",
            Self::HfsPlus => "hfsplus",
            Self::Ufs => "ufs",
            Self::Unformatted => "unformatted",
            Self::Btrfs => "btrfs",
            Self::Hpfs => "hpfs",
            Self::Luks => "luks",
            Self::Ocfs2 => "ocfs2",
            Self::Zfs => "zfs",
            Self::Exfat => "exfat",
            Self::Nilfs2 => "nilfs2",
            Self::Lvm2Pv => "lvm2 pv",
            Self::F2fs => "f2fs",
        }
    }

    /// Look up a type by its printable name, `Unknown` if not found.
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|fs_type| fs_type.name() == name)
            .unwrap_or(Self::Unknown)
    }

    /// Map a blkid `TYPE` tag to a filesystem type.
    pub fn from_blkid_tag(tag: &str) -> Self {
        match tag {
            "ext2" => Self::Ext2,
            "ext3" => Self::Ext3,
            "ext4" | "ext4dev" => Self::Ext4,
            "swap" => Self::LinuxSwap,
            "fat12" | "fat16" => Self::Fat16,
            "vfat" | "fat32" => Self::Fat32,
            "ntfs" | "ntfs3" => Self::Ntfs,
            "reiserfs" => Self::ReiserFs,
            "reiser4" => Self::Reiser4,
            "xfs" => Self::Xfs,
            "jfs" => Self::Jfs,
            "hfs" => Self::Hfs,
            "hfsplus" => Self::HfsPlus,
            "ufs" => Self::Ufs,
            "btrfs" => Self::Btrfs,
            "hpfs" => Self::Hpfs,
            "crypto_LUKS" => Self::Luks,
            "ocfs2" => Self::Ocfs2,
            "zfs_member" => Self::Zfs,
            "exfat" => Self::Exfat,
            "nilfs2" => Self::Nilfs2,
            "LVM2_member" => Self::Lvm2Pv,
            "f2fs" => Self::F2fs,
            "" => Self::Unformatted,
            _ => Self::Unknown,
        }
    }

    /// Map a blkid `TYPE` tag together with its `VERSION` tag.
    ///
    /// blkid reports every FAT variant as `vfat`; only the version tells
    /// FAT12/16 from FAT32.
    pub fn from_blkid_tags(tag: &str, version: Option<&str>) -> Self {
        match (tag, version) {
            ("vfat", Some(version)) if version.eq_ignore_ascii_case("FAT12") => Self::Fat16,
            ("vfat", Some(version)) if version.eq_ignore_ascii_case("FAT16") => Self::Fat16,
            _ => Self::from_blkid_tag(tag),
        }
    }

    /// All real filesystem types (everything from ext2 on)
    pub fn real_types() -> impl Iterator<Item = FilesystemType> {
        Self::ALL.into_iter().skip(2)
    }

    /// Whether a label can be read for this type
    pub fn supports_label(self) -> bool {
        !matches!(
            self,
            Self::Unknown | Self::Extended | Self::Unformatted | Self::Lvm2Pv | Self::Luks
        )
    }
}

/// Filesystem details attached to a partition record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemInfo {
    pub fs_type: FilesystemType,

    /// Sectors occupied by the filesystem, in the owning volume's local addressing
    pub range: SectorRange,

    /// Sectors in use, if known
    pub sectors_used: Option<i64>,

    pub label: Option<String>,

    pub uuid: Option<String>,
}

impl FilesystemInfo {
    pub fn new(fs_type: FilesystemType, range: SectorRange) -> Self {
        Self {
            fs_type,
            range,
            sectors_used: None,
            label: None,
            uuid: None,
        }
    }

    pub fn length(&self) -> i64 {
        self.range.len()
    }

    /// Move the filesystem to start at `new_first`, keeping its length.
    pub fn move_to(&mut self, new_first: i64) {
        self.range = self.range.moved_to(new_first);
    }
}
