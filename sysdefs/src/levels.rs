use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Software RAID levels.
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
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MdLevel {
    Raid0,
    Raid1,
    Raid4,
    Raid5,
    Raid6,
    Raid10,
}

impl MdLevel {
    /// Minimal number of members for an array of this level.
    pub fn min_devices(self) -> usize {
        match self {
            MdLevel::Raid0 | MdLevel::Raid1 | MdLevel::Raid10 => 2,
            MdLevel::Raid4 | MdLevel::Raid5 => 3,
            MdLevel::Raid6 => 4,
        }
    }

    /// Usable size of an array of `count` members of `member_size` bytes.
    ///
    /// Members are assumed to be of equal size; callers should pass the size
    /// of the smallest one.
    pub fn array_size(self, member_size: u64, count: usize) -> u64 {
        let count = count as u64;
        match self {
            // Block-level striping, so the size is the sum of all members.
            MdLevel::Raid0 => member_size * count,
            // Full mirroring, the size of one member.
            MdLevel::Raid1 => member_size,
            // One member worth of parity.
            MdLevel::Raid4 | MdLevel::Raid5 => member_size * count.saturating_sub(1),
            // Two members worth of parity.
            MdLevel::Raid6 => member_size * count.saturating_sub(2),
            // Striped mirrors, half of the total.
            MdLevel::Raid10 => member_size * count / 2,
        }
    }
}

/// Parity layouts for RAID5/6/10.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum MdParity {
    Default,
    LeftAsymmetric,
    LeftSymmetric,
    RightAsymmetric,
    RightSymmetric,
    First,
    Last,
    Near2,
    Offset2,
    Far2,
}

/// Btrfs RAID levels for data and metadata.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BtrfsRaidLevel {
    Default,
    Single,
    Dup,
    Raid0,
    Raid1,
    Raid5,
    Raid6,
    Raid10,
}

/// Bcache cache modes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CacheMode {
    #[default]
    Writethrough,
    Writeback,
    Writearound,
    None,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    const GIB: u64 = 1 << 30;

    #[test]
    fn test_array_size() {
        assert_eq!(MdLevel::Raid0.array_size(10 * GIB, 3), 30 * GIB);
        assert_eq!(MdLevel::Raid1.array_size(10 * GIB, 3), 10 * GIB);
        assert_eq!(MdLevel::Raid5.array_size(10 * GIB, 3), 20 * GIB);
        assert_eq!(MdLevel::Raid6.array_size(10 * GIB, 4), 20 * GIB);
        assert_eq!(MdLevel::Raid10.array_size(10 * GIB, 4), 20 * GIB);
    }

    #[test]
    fn test_min_devices() {
        for level in MdLevel::iter() {
            assert!(level.array_size(GIB, level.min_devices()) > 0, "{level}");
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!(MdLevel::from_str("RAID1").unwrap(), MdLevel::Raid1);
        assert_eq!(
            MdParity::from_str("left_symmetric").unwrap(),
            MdParity::LeftSymmetric
        );
        assert_eq!(CacheMode::from_str("writeback").unwrap(), CacheMode::Writeback);
        assert_eq!(BtrfsRaidLevel::from_str("dup").unwrap(), BtrfsRaidLevel::Dup);
    }
}
