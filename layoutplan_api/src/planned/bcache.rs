use serde::{Deserialize, Serialize};
use sysdefs::{levels::CacheMode, partition_tables::PartitionTableType};

use crate::primitives::ids::PlannedId;

use super::{
    common::{CanBeEncrypted, CanBeFormatted, CanBeMember, ReuseTarget},
    partition::PlannedPartition,
};

/// Bcache device. The backing and caching devices are the planned devices
/// whose `bcache_backing_for` / `bcache_caching_for` match `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedBcache {
    pub planned_id: PlannedId,
    pub name: String,

    #[serde(default)]
    pub cache_mode: CacheMode,

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

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partitions: Vec<PlannedPartition>,
}

impl PlannedBcache {
    pub fn new(planned_id: PlannedId, name: impl Into<String>) -> Self {
        Self {
            planned_id,
            name: name.into(),
            cache_mode: CacheMode::default(),
            format: CanBeFormatted::default(),
            encryption: CanBeEncrypted::default(),
            member: CanBeMember::default(),
            reuse: None,
            ptable_type: None,
            partitions: Vec::new(),
        }
    }

    pub fn is_partitioned(&self) -> bool {
        !self.partitions.is_empty()
    }
}
