use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Size of a logical block as assumed by every partition table type.
pub const BLOCK_SIZE: u64 = 512;

/// Default alignment grain used by partitioning tools (1 MiB).
pub const DEFAULT_GRAIN: u64 = 1 << 20;

/// Types of partition tables (disk labels).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PartitionTableType {
    /// Classic Master Boot Record table.
    #[serde(alias = "mbr")]
    #[strum(serialize = "msdos", serialize = "mbr")]
    Msdos,

    /// GUID Partition Table.
    Gpt,

    /// S/390 DASD volume table.
    Dasd,

    /// Table implied by the device itself, holding exactly one partition.
    Implicit,
}

impl PartitionTableType {
    /// Maximum number of primary partitions (extended partitions included).
    pub fn max_primary(self) -> usize {
        match self {
            PartitionTableType::Msdos => 4,
            PartitionTableType::Gpt => 128,
            PartitionTableType::Dasd => 3,
            PartitionTableType::Implicit => 1,
        }
    }

    /// Whether an extended partition hosting logical partitions can exist.
    pub fn extended_possible(self) -> bool {
        self == PartitionTableType::Msdos
    }

    /// Whether the table honors the legacy boot flag.
    pub fn boot_flag_supported(self) -> bool {
        self == PartitionTableType::Msdos
    }

    /// Whether new partitions can be added by the user at all.
    pub fn is_user_partitionable(self) -> bool {
        self != PartitionTableType::Implicit
    }

    /// Bytes reserved by the table at the start of the device.
    pub fn head_overhead(self) -> u64 {
        match self {
            // Protective MBR, GPT header and 128 entries.
            PartitionTableType::Gpt => 34 * BLOCK_SIZE,
            PartitionTableType::Msdos => BLOCK_SIZE,
            PartitionTableType::Dasd => 3 * 4096,
            PartitionTableType::Implicit => 0,
        }
    }

    /// Bytes reserved by the table at the end of the device.
    pub fn tail_overhead(self) -> u64 {
        match self {
            // Backup GPT header and entries.
            PartitionTableType::Gpt => 33 * BLOCK_SIZE,
            _ => 0,
        }
    }
}

/// Kinds of partitions regarding their position in the partition table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PartitionType {
    Primary,
    Extended,
    Logical,
}
