use serde::{Deserialize, Serialize};
use sysdefs::{
    filesystems::FilesystemType, partition_ids::PartitionId,
    partition_tables::PartitionTableType,
};

use crate::{
    constants::ESP_MOUNT_POINT,
    is_default,
    primitives::{disk_size::DiskSize, ids::PlannedId},
};

use super::{
    common::{absolute_min_size, CanBeEncrypted, CanBeFormatted, CanBeMember, ReuseTarget},
    size::PlannedSize,
};

/// Partition to create, or existing partition to reuse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedPartition {
    pub planned_id: PlannedId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reuse: Option<ReuseTarget>,

    /// Resize the reused partition to `size` instead of keeping it as is.
    #[serde(default, skip_serializing_if = "is_default")]
    pub resize: bool,

    #[serde(default)]
    pub size: PlannedSize,

    #[serde(default)]
    pub format: CanBeFormatted,

    #[serde(default)]
    pub encryption: CanBeEncrypted,

    #[serde(default)]
    pub member: CanBeMember,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_id: Option<PartitionId>,

    /// Must be created as a primary partition.
    #[serde(default, skip_serializing_if = "is_default")]
    pub primary: bool,

    /// Name of the disk the partition must be created on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<String>,

    /// Partition table requested for the hosting disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ptable_type: Option<PartitionTableType>,

    /// Set the legacy boot flag. Only honored on MS-DOS tables.
    #[serde(default, skip_serializing_if = "is_default")]
    pub bootable: bool,
}

impl PlannedPartition {
    pub fn new(planned_id: PlannedId) -> Self {
        Self {
            planned_id,
            reuse: None,
            resize: false,
            size: PlannedSize::default(),
            format: CanBeFormatted::default(),
            encryption: CanBeEncrypted::default(),
            member: CanBeMember::default(),
            partition_id: None,
            primary: false,
            disk: None,
            ptable_type: None,
            bootable: false,
        }
    }

    pub fn is_reused(&self) -> bool {
        self.reuse.is_some()
    }

    pub fn mount_point(&self) -> Option<&str> {
        self.format.mount_point.as_deref()
    }

    /// Partition id to write: the requested one, otherwise derived from how
    /// the partition is used.
    pub fn effective_partition_id(&self) -> PartitionId {
        if let Some(id) = self.partition_id {
            return id;
        }
        if self.member.lvm_volume_group_name.is_some() {
            PartitionId::Lvm
        } else if self.member.raid_name.is_some() {
            PartitionId::Raid
        } else if self.format.is_swap() {
            PartitionId::Swap
        } else if self.mount_point() == Some(ESP_MOUNT_POINT) {
            PartitionId::Esp
        } else {
            match self.format.filesystem_type {
                Some(FilesystemType::Vfat) => PartitionId::Windows,
                Some(FilesystemType::Ntfs) | Some(FilesystemType::Exfat) => PartitionId::Ntfs,
                _ => PartitionId::Linux,
            }
        }
    }

    /// Smallest size the partition can be shrunk to when there is not enough
    /// space for its planned minimum.
    pub fn absolute_min_size(&self) -> DiskSize {
        absolute_min_size(&self.format, &self.encryption)
    }
}

/// Disk used directly, without a partition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedDisk {
    pub planned_id: PlannedId,

    /// Kernel name of the disk.
    pub name: String,

    #[serde(default)]
    pub format: CanBeFormatted,

    #[serde(default)]
    pub encryption: CanBeEncrypted,

    #[serde(default)]
    pub member: CanBeMember,
}

impl PlannedDisk {
    pub fn new(planned_id: PlannedId, name: impl Into<String>) -> Self {
        Self {
            planned_id,
            name: name.into(),
            format: CanBeFormatted::default(),
            encryption: CanBeEncrypted::default(),
            member: CanBeMember::default(),
        }
    }
}
