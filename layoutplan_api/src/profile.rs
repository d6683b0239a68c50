//! Decoded installation profile sections.
//!
//! Values that planners must validate (filesystems, sizes, enumerations) are
//! kept as strings so a single bad value becomes an issue instead of making
//! the whole profile unreadable.

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use strum_macros::{Display, EnumString};

use crate::is_default;

/// Root of the partitioning part of a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartitioningProfile {
    #[serde(default)]
    pub partitioning: Vec<DriveSection>,
}

/// Kind of device a drive section describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum DriveType {
    #[strum(serialize = "CT_DISK", serialize = "disk")]
    Disk,
    #[strum(serialize = "CT_LVM", serialize = "lvm")]
    Lvm,
    #[strum(serialize = "CT_MD", serialize = "CT_RAID", serialize = "md", serialize = "raid")]
    Md,
    #[strum(serialize = "CT_BCACHE", serialize = "bcache")]
    Bcache,
    #[strum(serialize = "CT_BTRFS", serialize = "btrfs")]
    Btrfs,
    #[strum(serialize = "CT_NFS", serialize = "nfs")]
    Nfs,
    #[strum(serialize = "CT_TMPFS", serialize = "tmpfs")]
    Tmpfs,
}

/// Which existing partitions of a disk may be removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskUse {
    All,
    Linux,
    Free,
    Numbers(Vec<u32>),
}

impl FromStr for DiskUse {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(DiskUse::All),
            "linux" => Ok(DiskUse::Linux),
            "free" => Ok(DiskUse::Free),
            other => other
                .split(',')
                .map(|n| n.trim().parse::<u32>().map_err(|_| s.to_owned()))
                .collect::<Result<Vec<_>, _>>()
                .map(DiskUse::Numbers),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriveSection {
    /// Kernel name, udev link, volume group path (`/dev/system`) or RAID
    /// name, depending on the drive type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub drive_type: Option<String>,

    /// Remove everything on the disk, including the partition table.
    #[serde(default, skip_serializing_if = "is_default")]
    pub initialize: bool,

    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub disk_use: Option<String>,

    /// `gpt`, `msdos` or `none` (use the whole disk without partitions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disklabel: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partitions: Vec<PartitionSection>,

    /// Physical extent size of a volume group.
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub pesize: Option<String>,

    #[serde(default, skip_serializing_if = "is_default")]
    pub keep_unknown_lv: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raid_options: Option<RaidOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcache_options: Option<BcacheOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub btrfs_options: Option<BtrfsOptions>,

    /// Disks not to consider when the section has no `device`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_list: Vec<SkipRule>,
}

impl DriveSection {
    /// Drive type, defaulting to a disk. The unknown value is returned as
    /// error.
    pub fn drive_type(&self) -> Result<DriveType, String> {
        match &self.drive_type {
            None => Ok(DriveType::Disk),
            Some(t) => DriveType::from_str(t).map_err(|_| t.clone()),
        }
    }

    pub fn disk_use(&self) -> Option<Result<DiskUse, String>> {
        self.disk_use.as_deref().map(DiskUse::from_str)
    }

    pub fn wants_no_partition_table(&self) -> bool {
        self.disklabel.as_deref() == Some("none")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartitionSection {
    /// Create a new device (default) or reuse an existing one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountby: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub size: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_nr: Option<u32>,

    /// Numeric MS-DOS system id, e.g. 130 for swap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_id: Option<u32>,

    /// `primary` or `logical`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lv_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lvm_group: Option<String>,

    /// The logical volume is a thin pool.
    #[serde(default, skip_serializing_if = "is_default")]
    pub pool: bool,

    /// Thin pool a thin logical volume is allocated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_pool: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripes: Option<u32>,

    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub stripesize: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raid_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcache_backing_for: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcache_caching_for: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub btrfs_name: Option<String>,

    /// Encryption password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypt_key: Option<String>,

    /// Comma separated fstab options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fstopt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mkfs_options: Option<String>,

    /// Resize the reused device to `size`.
    #[serde(default, skip_serializing_if = "is_default")]
    pub resize: bool,

    /// NFS share (`server:/path`) for NFS drives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl PartitionSection {
    pub fn creates(&self) -> bool {
        self.create.unwrap_or(true)
    }

    pub fn fstab_options(&self) -> Vec<String> {
        self.fstopt
            .as_deref()
            .map(|o| {
                o.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RaidOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raid_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raid_type: Option<String>,

    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub chunk_size: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parity_algorithm: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_order: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BcacheOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_mode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BtrfsOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_raid_level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_raid_level: Option<String>,
}

/// Excludes disks matching a key/value pair from automatic selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkipRule {
    /// `name`, `device`, `udev_id` or `size_k`.
    pub skip_key: String,

    #[serde(deserialize_with = "string_or_number_required")]
    pub skip_value: String,

    /// Numeric comparison instead of equality.
    #[serde(default, skip_serializing_if = "is_default")]
    pub skip_if_less_than: bool,

    #[serde(default, skip_serializing_if = "is_default")]
    pub skip_if_more_than: bool,
}

/// Profiles often give sizes as bare numbers. Keep them as text.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(serde::de::Error::custom("expected a string or a number")),
    }
}

fn string_or_number_required<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    string_or_number(deserializer)?
        .ok_or_else(|| serde::de::Error::custom("expected a string or a number"))
}
