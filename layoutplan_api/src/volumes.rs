use serde::{Deserialize, Serialize};
use sysdefs::filesystems::FilesystemType;

use crate::primitives::disk_size::DiskSize;

/// Default sizes for a mount point, used by "auto" sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeSpecification {
    pub mount_point: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_type: Option<FilesystemType>,

    pub min_size: DiskSize,

    #[serde(default = "unlimited")]
    pub max_size: DiskSize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

fn unlimited() -> DiskSize {
    DiskSize::UNLIMITED
}

/// Table of volume specifications provided by the product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeSpecs {
    #[serde(default)]
    pub volumes: Vec<VolumeSpecification>,
}

impl VolumeSpecs {
    pub fn for_mount_point(&self, mount_point: &str) -> Option<&VolumeSpecification> {
        self.volumes.iter().find(|v| v.mount_point == mount_point)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn test_lookup() {
        let specs: VolumeSpecs = serde_yaml::from_str(indoc! {r#"
            volumes:
              - mount_point: /
                fs_type: btrfs
                min_size: 5 GiB
                max_size: 30 GiB
                weight: 60
              - mount_point: /home
                min_size: 10 GiB
        "#})
        .unwrap();

        let root = specs.for_mount_point("/").unwrap();
        assert_eq!(root.fs_type, Some(FilesystemType::Btrfs));
        assert_eq!(root.max_size, DiskSize::gib(30));
        assert_eq!(root.weight, Some(60));

        let home = specs.for_mount_point("/home").unwrap();
        assert_eq!(home.max_size, DiskSize::UNLIMITED);
        assert!(specs.for_mount_point("swap").is_none());
    }
}
