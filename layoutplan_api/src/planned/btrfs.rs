use serde::{Deserialize, Serialize};
use sysdefs::levels::BtrfsRaidLevel;

use crate::primitives::ids::PlannedId;

use super::common::CanBeFormatted;

/// Btrfs filesystem spanning every planned device whose `btrfs_name`
/// matches `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedBtrfs {
    pub planned_id: PlannedId,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_raid_level: Option<BtrfsRaidLevel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_raid_level: Option<BtrfsRaidLevel>,

    #[serde(default)]
    pub format: CanBeFormatted,
}

impl PlannedBtrfs {
    pub fn new(planned_id: PlannedId, name: impl Into<String>) -> Self {
        Self {
            planned_id,
            name: name.into(),
            data_raid_level: None,
            metadata_raid_level: None,
            format: CanBeFormatted::default(),
        }
    }
}
