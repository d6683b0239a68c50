use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIs, EnumIter, EnumString, IntoStaticStr};

const MIB: u64 = 1 << 20;

/// Filesystem types the planner knows how to create or reuse.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIs,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FilesystemType {
    Btrfs,
    Ext2,
    Ext3,
    Ext4,
    Xfs,
    Vfat,
    Exfat,
    Ntfs,
    Swap,
    Nfs,
    Tmpfs,
}

impl FilesystemType {
    /// Whether the filesystem lives on a block device.
    pub fn is_blk(self) -> bool {
        !self.is_nodev()
    }

    /// Whether the filesystem does NOT use a block device.
    pub fn is_nodev(self) -> bool {
        matches!(self, FilesystemType::Nfs | FilesystemType::Tmpfs)
    }

    /// Whether the filesystem is commonly used by Windows.
    pub fn is_windows(self) -> bool {
        matches!(
            self,
            FilesystemType::Vfat | FilesystemType::Exfat | FilesystemType::Ntfs
        )
    }

    /// Whether a label can be assigned when formatting.
    pub fn supports_label(self) -> bool {
        self.is_blk()
    }

    /// Whether a single filesystem instance can span several block devices.
    pub fn is_multidevice(self) -> bool {
        self == FilesystemType::Btrfs
    }

    /// Smallest block device, in bytes, the filesystem can be created on.
    pub fn min_size(self) -> u64 {
        match self {
            FilesystemType::Btrfs => 256 * MIB,
            FilesystemType::Xfs => 300 * MIB,
            FilesystemType::Ext2 | FilesystemType::Ext3 | FilesystemType::Ext4 => 2 * MIB,
            FilesystemType::Vfat | FilesystemType::Exfat | FilesystemType::Ntfs => 2 * MIB,
            FilesystemType::Swap => MIB,
            FilesystemType::Nfs | FilesystemType::Tmpfs => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_filesystem_type() {
        let fs: FilesystemType = serde_json::from_str(r#""ext4""#).unwrap();
        assert_eq!(fs, FilesystemType::Ext4);
        assert!(fs.is_blk());
        assert!(!fs.is_nodev());

        assert_eq!(FilesystemType::from_str("XFS").unwrap(), FilesystemType::Xfs);
        assert!(FilesystemType::from_str("zfs").is_err());

        assert!(FilesystemType::Nfs.is_nodev());
        assert!(FilesystemType::Tmpfs.is_nodev());
        assert!(FilesystemType::Btrfs.is_multidevice());
        assert!(FilesystemType::Ntfs.is_windows());
        assert!(!FilesystemType::Tmpfs.supports_label());
    }

    #[test]
    fn test_min_sizes() {
        for fs in FilesystemType::iter().filter(|fs| fs.is_blk()) {
            assert!(fs.min_size() >= MIB, "{fs} has no sensible minimum");
        }
        assert_eq!(FilesystemType::Tmpfs.min_size(), 0);
    }
}
