use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Partition type identifiers, i.e. the on-disk code describing the intended
/// usage of a partition.
///
/// The numeric representation follows the MS-DOS system ids, which is also
/// the representation used by installation profiles. GPT tables map them to
/// the equivalent GUIDs.
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
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum PartitionId {
    /// Generic Linux data.
    Linux,

    /// Linux swap.
    Swap,

    /// LVM physical volume.
    Lvm,

    /// Linux software RAID member.
    Raid,

    /// EFI system partition.
    Esp,

    /// BIOS boot partition (GRUB core image on GPT).
    BiosBoot,

    /// PowerPC PReP boot partition.
    Prep,

    /// Windows FAT32.
    Windows,

    /// Windows NTFS / exFAT.
    Ntfs,

    /// Container for logical partitions.
    Extended,

    /// Anything else.
    Unknown,
}

impl PartitionId {
    /// Returns the MS-DOS system id.
    pub fn to_code(self) -> u32 {
        match self {
            PartitionId::Linux => 0x83,
            PartitionId::Swap => 0x82,
            PartitionId::Lvm => 0x8e,
            PartitionId::Raid => 0xfd,
            PartitionId::Esp => 0xef,
            PartitionId::BiosBoot => 0x102,
            PartitionId::Prep => 0x41,
            PartitionId::Windows => 0x0c,
            PartitionId::Ntfs => 0x07,
            PartitionId::Extended => 0x0f,
            PartitionId::Unknown => 0xda,
        }
    }

    /// Returns the partition id matching an MS-DOS system id. Unrecognized
    /// codes map to [`PartitionId::Unknown`].
    pub fn from_code(code: u32) -> Self {
        match code {
            0x83 => PartitionId::Linux,
            0x82 => PartitionId::Swap,
            0x8e => PartitionId::Lvm,
            0xfd => PartitionId::Raid,
            0xef => PartitionId::Esp,
            0x102 => PartitionId::BiosBoot,
            0x41 => PartitionId::Prep,
            0x0b | 0x0c | 0x0e => PartitionId::Windows,
            0x07 => PartitionId::Ntfs,
            0x05 | 0x0f | 0x85 => PartitionId::Extended,
            _ => PartitionId::Unknown,
        }
    }

    /// Whether the partition is typically used by a Linux system.
    pub fn is_linux_system(self) -> bool {
        matches!(
            self,
            PartitionId::Linux | PartitionId::Swap | PartitionId::Lvm | PartitionId::Raid
        )
    }

    /// Whether the partition is typically used by Windows.
    pub fn is_windows_system(self) -> bool {
        matches!(self, PartitionId::Windows | PartitionId::Ntfs)
    }
}
