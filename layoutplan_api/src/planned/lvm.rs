use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::{
    constants::DEFAULT_EXTENT_SIZE,
    is_default,
    primitives::{disk_size::DiskSize, ids::PlannedId},
};

use super::{
    common::{absolute_min_size, CanBeEncrypted, CanBeFormatted, ReuseTarget},
    size::PlannedSize,
};

/// How the physical volumes of a new volume group are sized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SizeStrategy {
    /// Just enough for the logical volumes.
    #[default]
    UseNeeded,

    /// All the space available in the candidate devices.
    UseAvailable,
}

/// What happens to logical volumes of a reused volume group that are not
/// part of the plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MakeSpacePolicy {
    Keep,
    #[default]
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LvType {
    Normal,
    ThinPool,
    /// Thin volume allocated from the named pool of the same volume group.
    Thin {
        pool: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedLv {
    pub planned_id: PlannedId,
    pub logical_volume_name: String,
    pub lv_type: LvType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripes: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_size: Option<DiskSize>,

    #[serde(default)]
    pub size: PlannedSize,

    #[serde(default)]
    pub format: CanBeFormatted,

    #[serde(default)]
    pub encryption: CanBeEncrypted,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reuse: Option<ReuseTarget>,

    #[serde(default, skip_serializing_if = "is_default")]
    pub resize: bool,
}

impl PlannedLv {
    pub fn new(planned_id: PlannedId, name: impl Into<String>) -> Self {
        Self {
            planned_id,
            logical_volume_name: name.into(),
            lv_type: LvType::Normal,
            stripes: None,
            stripe_size: None,
            size: PlannedSize::default(),
            format: CanBeFormatted::default(),
            encryption: CanBeEncrypted::default(),
            reuse: None,
            resize: false,
        }
    }

    pub fn is_thin(&self) -> bool {
        matches!(self.lv_type, LvType::Thin { .. })
    }

    pub fn is_thin_pool(&self) -> bool {
        self.lv_type == LvType::ThinPool
    }

    pub fn is_reused(&self) -> bool {
        self.reuse.is_some()
    }

    pub fn absolute_min_size(&self) -> DiskSize {
        absolute_min_size(&self.format, &self.encryption)
    }
}

/// Volume group to create or reuse, owning its logical volumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedVg {
    pub planned_id: PlannedId,
    pub volume_group_name: String,
    pub extent_size: DiskSize,

    /// Names of the devices that may become physical volumes. Empty means
    /// any candidate disk.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pvs_candidate_devices: Vec<String>,

    #[serde(default)]
    pub lvs: Vec<PlannedLv>,

    #[serde(default)]
    pub size_strategy: SizeStrategy,

    #[serde(default)]
    pub make_space_policy: MakeSpacePolicy,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reuse: Option<ReuseTarget>,
}

impl PlannedVg {
    pub fn new(planned_id: PlannedId, name: impl Into<String>) -> Self {
        Self {
            planned_id,
            volume_group_name: name.into(),
            extent_size: DEFAULT_EXTENT_SIZE,
            pvs_candidate_devices: Vec::new(),
            lvs: Vec::new(),
            size_strategy: SizeStrategy::default(),
            make_space_policy: MakeSpacePolicy::default(),
            reuse: None,
        }
    }

    pub fn is_reused(&self) -> bool {
        self.reuse.is_some()
    }

    /// Logical volumes that take space from the volume group. Thin volumes
    /// live inside their pool.
    pub fn space_lvs(&self) -> impl Iterator<Item = &PlannedLv> {
        self.lvs.iter().filter(|lv| !lv.is_thin())
    }

    /// Space the new logical volumes need at least, rounded to extents.
    /// Percentages are counted as one extent.
    pub fn lvs_min_size(&self) -> DiskSize {
        self.space_lvs()
            .filter(|lv| !lv.is_reused())
            .map(|lv| lv.size.unresolved_min().ceil(self.extent_size))
            .sum()
    }

    /// Space the new logical volumes can use at most. Any percentage makes it
    /// unlimited.
    pub fn lvs_max_size(&self) -> DiskSize {
        self.space_lvs()
            .filter(|lv| !lv.is_reused())
            .map(|lv| {
                if lv.size.percent().is_some() {
                    DiskSize::UNLIMITED
                } else {
                    lv.size.max_size().ceil(self.extent_size)
                }
            })
            .sum()
    }

    /// Sum of the weights of the new logical volumes.
    pub fn lvs_weight(&self) -> u32 {
        self.space_lvs()
            .filter(|lv| !lv.is_reused())
            .map(|lv| lv.size.effective_weight())
            .sum()
    }

    pub fn find_lv(&self, name: &str) -> Option<&PlannedLv> {
        self.lvs.iter().find(|lv| lv.logical_volume_name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vg_with_lvs() -> PlannedVg {
        let mut vg = PlannedVg::new(PlannedId(1), "system");
        let mut root = PlannedLv::new(PlannedId(2), "root");
        root.size = PlannedSize::new(DiskSize::gib(10), DiskSize::gib(20))
            .unwrap()
            .with_weight(2);
        let mut pool = PlannedLv::new(PlannedId(3), "pool");
        pool.lv_type = LvType::ThinPool;
        pool.size = PlannedSize::fixed(DiskSize::mib(1023));
        let mut thin = PlannedLv::new(PlannedId(4), "thin");
        thin.lv_type = LvType::Thin {
            pool: "pool".into(),
        };
        thin.size = PlannedSize::fixed(DiskSize::gib(100));
        vg.lvs = vec![root, pool, thin];
        vg
    }

    #[test]
    fn test_lvs_sizes() {
        let vg = vg_with_lvs();
        assert_eq!(vg.space_lvs().count(), 2);
        // The pool is rounded up to a full extent, the thin volume is ignored.
        assert_eq!(vg.lvs_min_size(), DiskSize::gib(11));
        assert_eq!(vg.lvs_max_size(), DiskSize::gib(21));
        assert_eq!(vg.lvs_weight(), 2);
    }

    #[test]
    fn test_find_lv() {
        let vg = vg_with_lvs();
        assert!(vg.find_lv("pool").unwrap().is_thin_pool());
        assert!(vg.find_lv("thin").unwrap().is_thin());
        assert!(vg.find_lv("home").is_none());
    }
}
