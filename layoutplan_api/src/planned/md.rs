use serde::{Deserialize, Serialize};
use sysdefs::{
    levels::{MdLevel, MdParity},
    partition_tables::PartitionTableType,
};

use crate::primitives::{disk_size::DiskSize, ids::PlannedId};

use super::{
    common::{CanBeEncrypted, CanBeFormatted, CanBeMember, ReuseTarget},
    partition::PlannedPartition,
};

/// Software RAID to create or reuse. Members are the planned devices whose
/// `raid_name` matches `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedMd {
    pub planned_id: PlannedId,

    /// Kernel name, e.g. `/dev/md0` or `/dev/md/data`.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md_level: Option<MdLevel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<DiskSize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parity: Option<MdParity>,

    /// Explicit order of the member devices, by name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices_order: Vec<String>,

    #[serde(default)]
    pub format: CanBeFormatted,

    #[serde(default)]
    pub encryption: CanBeEncrypted,

    #[serde(default)]
    pub member: CanBeMember,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reuse: Option<ReuseTarget>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ptable_type: Option<PartitionTableType>,

    /// Partitions to create on the RAID. Empty for a formatted RAID.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partitions: Vec<PlannedPartition>,
}

impl PlannedMd {
    pub fn new(planned_id: PlannedId, name: impl Into<String>) -> Self {
        Self {
            planned_id,
            name: name.into(),
            md_level: None,
            chunk_size: None,
            parity: None,
            devices_order: Vec::new(),
            format: CanBeFormatted::default(),
            encryption: CanBeEncrypted::default(),
            member: CanBeMember::default(),
            reuse: None,
            ptable_type: None,
            partitions: Vec::new(),
        }
    }

    pub fn level(&self) -> MdLevel {
        self.md_level.unwrap_or(MdLevel::Raid1)
    }

    pub fn is_partitioned(&self) -> bool {
        !self.partitions.is_empty()
    }

    pub fn is_reused(&self) -> bool {
        self.reuse.is_some()
    }
}
