use serde::{Deserialize, Serialize};
use strum_macros::IntoStaticStr;
use sysdefs::{
    filesystems::FilesystemType,
    levels::{BtrfsRaidLevel, CacheMode, MdLevel, MdParity},
    mount_by::MountBy,
    partition_ids::PartitionId,
    partition_tables::{PartitionTableType, PartitionType},
};

use layoutplan_api::{DiskSize, Sid};

use crate::region::Region;

/// Relation between a device and a device it is built upon. The edge goes
/// from the user to the used device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Holder {
    /// Generic usage: a filesystem on a block device, a table on a disk, an
    /// encryption layer, a RAID member, a physical volume.
    User,

    /// Part of a container: a partition of a table, a logical volume of a
    /// volume group, a physical volume of a volume group, a thin volume of
    /// a pool.
    Subdevice,

    /// Backing device of a bcache.
    BcacheBacking,

    /// Caching device of a bcache.
    BcacheCaching,
}

/// Result of asking whether a device can be resized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeInfo {
    pub resize_ok: bool,
    pub min_size: DiskSize,
    pub max_size: DiskSize,
}

impl ResizeInfo {
    pub fn not_resizable() -> Self {
        Self {
            resize_ok: false,
            min_size: DiskSize::ZERO,
            max_size: DiskSize::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    pub size: DiskSize,

    /// Udev links, e.g. `/dev/disk/by-id/ata-XYZ`.
    #[serde(default)]
    pub udev_ids: Vec<String>,

    /// Some devices (e.g. DASDs without a format) cannot hold partitions.
    pub partitionable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionTable {
    pub table_type: PartitionTableType,
    pub grain: DiskSize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub number: u32,
    pub region: Region,
    pub partition_type: PartitionType,
    pub id: PartitionId,
    pub boot: bool,
    pub resize_info: ResizeInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encryption {
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LvmVg {
    pub vg_name: String,
    pub extent_size: DiskSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LvKind {
    Normal,
    ThinPool,
    Thin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LvmLv {
    pub lv_name: String,
    pub size: DiskSize,
    pub lv_kind: LvKind,
    pub stripes: u32,
    pub stripe_size: Option<DiskSize>,
    pub resize_info: ResizeInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Md {
    pub level: MdLevel,
    pub chunk_size: Option<DiskSize>,
    pub parity: Option<MdParity>,
    pub size: DiskSize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bcache {
    pub cache_mode: CacheMode,
    pub size: DiskSize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountPoint {
    pub path: String,
    pub mount_by: MountBy,
    #[serde(default)]
    pub options: Vec<String>,
}

impl MountPoint {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mount_by: MountBy::default(),
            options: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filesystem {
    pub fs_type: FilesystemType,
    pub label: Option<String>,
    pub uuid: Option<String>,
    pub mkfs_options: Option<String>,
    pub mount_point: Option<MountPoint>,
    pub data_raid_level: Option<BtrfsRaidLevel>,
    pub metadata_raid_level: Option<BtrfsRaidLevel>,
}

impl Filesystem {
    pub fn new(fs_type: FilesystemType) -> Self {
        Self {
            fs_type,
            label: None,
            uuid: None,
            mkfs_options: None,
            mount_point: None,
            data_raid_level: None,
            metadata_raid_level: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nfs {
    pub server: String,
    pub path: String,
    pub mount_point: Option<MountPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tmpfs {
    pub mount_point: MountPoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum DeviceKind {
    Disk(Disk),
    PartitionTable(PartitionTable),
    Partition(Partition),
    Encryption(Encryption),
    LvmPv,
    LvmVg(LvmVg),
    LvmLv(LvmLv),
    Md(Md),
    Bcache(Bcache),
    Filesystem(Filesystem),
    Nfs(Nfs),
    Tmpfs(Tmpfs),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub sid: Sid,

    /// Kernel name for block devices, a descriptive name for the rest.
    pub name: String,

    pub kind: DeviceKind,
}

impl Device {
    /// Whether the device is a block device, i.e. can hold a filesystem.
    pub fn is_blk(&self) -> bool {
        matches!(
            self.kind,
            DeviceKind::Disk(_)
                | DeviceKind::Partition(_)
                | DeviceKind::Encryption(_)
                | DeviceKind::LvmLv(_)
                | DeviceKind::Md(_)
                | DeviceKind::Bcache(_)
        )
    }

    /// Devices that can hold a partition table.
    pub fn is_partitionable(&self) -> bool {
        match &self.kind {
            DeviceKind::Disk(disk) => disk.partitionable,
            DeviceKind::Md(_) | DeviceKind::Bcache(_) => true,
            _ => false,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        (&self.kind).into()
    }

    pub fn as_disk(&self) -> Option<&Disk> {
        match &self.kind {
            DeviceKind::Disk(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_partition(&self) -> Option<&Partition> {
        match &self.kind {
            DeviceKind::Partition(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_partition_mut(&mut self) -> Option<&mut Partition> {
        match &mut self.kind {
            DeviceKind::Partition(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_partition_table(&self) -> Option<&PartitionTable> {
        match &self.kind {
            DeviceKind::PartitionTable(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_filesystem(&self) -> Option<&Filesystem> {
        match &self.kind {
            DeviceKind::Filesystem(fs) => Some(fs),
            _ => None,
        }
    }

    pub fn as_filesystem_mut(&mut self) -> Option<&mut Filesystem> {
        match &mut self.kind {
            DeviceKind::Filesystem(fs) => Some(fs),
            _ => None,
        }
    }

    pub fn as_vg(&self) -> Option<&LvmVg> {
        match &self.kind {
            DeviceKind::LvmVg(vg) => Some(vg),
            _ => None,
        }
    }

    pub fn as_lv(&self) -> Option<&LvmLv> {
        match &self.kind {
            DeviceKind::LvmLv(lv) => Some(lv),
            _ => None,
        }
    }

    pub fn as_md(&self) -> Option<&Md> {
        match &self.kind {
            DeviceKind::Md(md) => Some(md),
            _ => None,
        }
    }

    pub fn as_bcache(&self) -> Option<&Bcache> {
        match &self.kind {
            DeviceKind::Bcache(b) => Some(b),
            _ => None,
        }
    }

    /// Mount point of a filesystem, NFS or tmpfs device.
    pub fn mount_point(&self) -> Option<&MountPoint> {
        match &self.kind {
            DeviceKind::Filesystem(fs) => fs.mount_point.as_ref(),
            DeviceKind::Nfs(nfs) => nfs.mount_point.as_ref(),
            DeviceKind::Tmpfs(tmpfs) => Some(&tmpfs.mount_point),
            _ => None,
        }
    }

    /// Short human description, suitable for logging.
    pub fn describe(&self) -> String {
        format!("{} '{}' ({})", self.kind_name(), self.name, self.sid)
    }
}
