use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};

/// How a filesystem is referenced in the fstab.
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
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MountBy {
    /// Kernel device name, e.g. `/dev/sda1`.
    Device,

    /// Filesystem UUID.
    #[default]
    Uuid,

    /// Filesystem label.
    Label,

    /// Udev by-id link.
    Id,

    /// Udev by-path link.
    Path,
}
