use layoutplan_api::{DiskSize, Sid};
use sysdefs::partition_tables::PartitionTableType;

use crate::region::Region;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceGraphError {
    #[error("Device {0} does not exist")]
    NotFound(Sid),

    #[error("Device {sid} is not a {expected}")]
    WrongKind { sid: Sid, expected: &'static str },

    #[error("Device '{0}' already has a partition table")]
    PartitionTableExists(String),

    #[error("Device '{0}' has no partition table")]
    NoPartitionTable(String),

    #[error("Device '{0}' cannot hold a partition table")]
    NotPartitionable(String),

    #[error("Partition table of '{disk}' is {table_type} and cannot hold {what}")]
    TableLimit {
        disk: String,
        table_type: PartitionTableType,
        what: &'static str,
    },

    #[error("Region {start}..{end} is not available on '{disk}'", start = .region.start, end = .region.end())]
    RegionUnavailable { disk: String, region: Region },

    #[error("Device '{name}' cannot be resized to {size}")]
    InvalidResize { name: String, size: DiskSize },

    #[error("Device '{0}' is already in use")]
    InUse(String),

    #[error("Not enough space in volume group '{vg}' for {size}")]
    VgFull { vg: String, size: DiskSize },

    #[error("Fixture is invalid: {0}")]
    InvalidFixture(String),
}
