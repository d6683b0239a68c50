use serde::{Deserialize, Serialize};
use sysdefs::{filesystems::FilesystemType, mount_by::MountBy};

use crate::{
    constants::{ENCRYPTION_OVERHEAD, MIN_DEVICE_SIZE, SWAP_MOUNT_POINT},
    is_default,
    primitives::{disk_size::DiskSize, ids::Sid},
};

/// Existing device a planned device binds to instead of creating a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReuseTarget {
    /// Kernel name of the device, e.g. `/dev/sda2`.
    Name(String),

    /// Storage id of the device.
    Sid(Sid),
}

impl ReuseTarget {
    pub fn name(&self) -> Option<&str> {
        match self {
            ReuseTarget::Name(name) => Some(name),
            ReuseTarget::Sid(_) => None,
        }
    }
}

/// Filesystem related intent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanBeFormatted {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem_type: Option<FilesystemType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fstab_options: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mkfs_options: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_by: Option<MountBy>,

    /// When reusing a device, whether its filesystem is replaced.
    #[serde(default, skip_serializing_if = "is_default")]
    pub reformat: bool,
}

impl CanBeFormatted {
    pub fn is_swap(&self) -> bool {
        self.mount_point.as_deref() == Some(SWAP_MOUNT_POINT)
            || self.filesystem_type == Some(FilesystemType::Swap)
    }

    /// Whether a filesystem will exist on the device.
    pub fn has_filesystem(&self) -> bool {
        self.filesystem_type.is_some()
    }

    /// Smallest size the requested filesystem can live on.
    pub fn filesystem_min_size(&self) -> DiskSize {
        self.filesystem_type
            .map(|fs| DiskSize::b(fs.min_size()))
            .unwrap_or(DiskSize::ZERO)
    }
}

/// Encryption intent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanBeEncrypted {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_password: Option<String>,
}

impl CanBeEncrypted {
    pub fn is_encrypted(&self) -> bool {
        self.encryption_password.is_some()
    }

    /// Space the encryption layer takes from the underlying device.
    pub fn overhead(&self) -> DiskSize {
        if self.is_encrypted() {
            ENCRYPTION_OVERHEAD
        } else {
            DiskSize::ZERO
        }
    }
}

/// Name references to the containers a device is part of.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanBeMember {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lvm_volume_group_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raid_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcache_backing_for: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcache_caching_for: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub btrfs_name: Option<String>,
}

impl CanBeMember {
    pub fn is_member(&self) -> bool {
        self.lvm_volume_group_name.is_some()
            || self.raid_name.is_some()
            || self.bcache_backing_for.is_some()
            || self.bcache_caching_for.is_some()
            || self.btrfs_name.is_some()
    }
}

/// Absolute minimum of a device: the smallest size that still makes sense
/// for its filesystem and encryption.
pub fn absolute_min_size(format: &CanBeFormatted, encryption: &CanBeEncrypted) -> DiskSize {
    format.filesystem_min_size().max(MIN_DEVICE_SIZE) + encryption.overhead()
}
