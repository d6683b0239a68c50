//! Intent model: devices the planner wants to create or reuse.
//!
//! Planned devices only hold intent. Containers refer to their members by
//! name (see [`CanBeMember`]) so the plan is a flat list without ownership
//! cycles; only logical volumes and the partitions of partitioned RAIDs and
//! bcaches are owned by their container.

use serde::Serialize;

use crate::primitives::ids::PlannedId;

pub mod bcache;
pub mod btrfs;
pub mod common;
pub mod lvm;
pub mod md;
pub mod nfs;
pub mod partition;
pub mod size;

pub use bcache::PlannedBcache;
pub use btrfs::PlannedBtrfs;
pub use common::{CanBeEncrypted, CanBeFormatted, CanBeMember, ReuseTarget};
pub use lvm::{LvType, MakeSpacePolicy, PlannedLv, PlannedVg, SizeStrategy};
pub use md::PlannedMd;
pub use nfs::{PlannedNfs, PlannedTmpfs};
pub use partition::{PlannedDisk, PlannedPartition};
pub use size::{PlannedSize, SizeRangeError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, strum_macros::IntoStaticStr)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PlannedDevice {
    Disk(PlannedDisk),
    Partition(PlannedPartition),
    LvmVg(PlannedVg),
    LvmLv(PlannedLv),
    Md(PlannedMd),
    Bcache(PlannedBcache),
    Btrfs(PlannedBtrfs),
    Nfs(PlannedNfs),
    Tmpfs(PlannedTmpfs),
}

impl PlannedDevice {
    pub fn planned_id(&self) -> PlannedId {
        match self {
            PlannedDevice::Disk(d) => d.planned_id,
            PlannedDevice::Partition(d) => d.planned_id,
            PlannedDevice::LvmVg(d) => d.planned_id,
            PlannedDevice::LvmLv(d) => d.planned_id,
            PlannedDevice::Md(d) => d.planned_id,
            PlannedDevice::Bcache(d) => d.planned_id,
            PlannedDevice::Btrfs(d) => d.planned_id,
            PlannedDevice::Nfs(d) => d.planned_id,
            PlannedDevice::Tmpfs(d) => d.planned_id,
        }
    }

    pub fn mount_point(&self) -> Option<&str> {
        match self {
            PlannedDevice::Disk(d) => d.format.mount_point.as_deref(),
            PlannedDevice::Partition(d) => d.format.mount_point.as_deref(),
            PlannedDevice::LvmLv(d) => d.format.mount_point.as_deref(),
            PlannedDevice::Md(d) => d.format.mount_point.as_deref(),
            PlannedDevice::Bcache(d) => d.format.mount_point.as_deref(),
            PlannedDevice::Btrfs(d) => d.format.mount_point.as_deref(),
            PlannedDevice::Nfs(d) => Some(&d.mount_point),
            PlannedDevice::Tmpfs(d) => Some(&d.mount_point),
            PlannedDevice::LvmVg(_) => None,
        }
    }

    pub fn reuse(&self) -> Option<&ReuseTarget> {
        match self {
            PlannedDevice::Partition(d) => d.reuse.as_ref(),
            PlannedDevice::LvmVg(d) => d.reuse.as_ref(),
            PlannedDevice::LvmLv(d) => d.reuse.as_ref(),
            PlannedDevice::Md(d) => d.reuse.as_ref(),
            PlannedDevice::Bcache(d) => d.reuse.as_ref(),
            PlannedDevice::Disk(_)
            | PlannedDevice::Btrfs(_)
            | PlannedDevice::Nfs(_)
            | PlannedDevice::Tmpfs(_) => None,
        }
    }
}

/// Flat arena of planned devices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DevicesPlan {
    devices: Vec<PlannedDevice>,
}

macro_rules! typed_iter {
    ($name:ident, $name_mut:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&self) -> impl Iterator<Item = &$ty> {
            self.devices.iter().filter_map(|d| match d {
                PlannedDevice::$variant(inner) => Some(inner),
                _ => None,
            })
        }

        pub fn $name_mut(&mut self) -> impl Iterator<Item = &mut $ty> {
            self.devices.iter_mut().filter_map(|d| match d {
                PlannedDevice::$variant(inner) => Some(inner),
                _ => None,
            })
        }
    };
}

impl DevicesPlan {
    pub fn new(devices: Vec<PlannedDevice>) -> Self {
        Self { devices }
    }

    pub fn push(&mut self, device: PlannedDevice) {
        self.devices.push(device);
    }

    pub fn extend(&mut self, devices: impl IntoIterator<Item = PlannedDevice>) {
        self.devices.extend(devices);
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlannedDevice> {
        self.devices.iter()
    }

    typed_iter!(disks, disks_mut, Disk, PlannedDisk);
    typed_iter!(partitions, partitions_mut, Partition, PlannedPartition);
    typed_iter!(vgs, vgs_mut, LvmVg, PlannedVg);
    typed_iter!(mds, mds_mut, Md, PlannedMd);
    typed_iter!(bcaches, bcaches_mut, Bcache, PlannedBcache);
    typed_iter!(btrfses, btrfses_mut, Btrfs, PlannedBtrfs);
    typed_iter!(nfses, nfses_mut, Nfs, PlannedNfs);
    typed_iter!(tmpfses, tmpfses_mut, Tmpfs, PlannedTmpfs);

    /// Every planned device, including the ones owned by a container
    /// (logical volumes, partitions of RAIDs and bcaches).
    pub fn all_devices(&self) -> Vec<PlannedDevice> {
        let mut all = Vec::new();
        for device in &self.devices {
            all.push(device.clone());
            match device {
                PlannedDevice::LvmVg(vg) => {
                    all.extend(vg.lvs.iter().cloned().map(PlannedDevice::LvmLv))
                }
                PlannedDevice::Md(md) => all.extend(
                    md.partitions
                        .iter()
                        .cloned()
                        .map(PlannedDevice::Partition),
                ),
                PlannedDevice::Bcache(bcache) => all.extend(
                    bcache
                        .partitions
                        .iter()
                        .cloned()
                        .map(PlannedDevice::Partition),
                ),
                _ => {}
            }
        }
        all
    }

    /// Names of all the existing devices the plan reuses. Logical volumes
    /// are named `/dev/<vg>/<lv>`.
    pub fn all_reuse_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for device in &self.devices {
            if let Some(name) = device.reuse().and_then(ReuseTarget::name) {
                names.push(name.to_owned());
            }
            match device {
                PlannedDevice::LvmVg(vg) => {
                    for lv in &vg.lvs {
                        match &lv.reuse {
                            Some(ReuseTarget::Name(name)) if name.starts_with("/dev/") => {
                                names.push(name.clone())
                            }
                            Some(ReuseTarget::Name(name)) => {
                                names.push(format!("/dev/{}/{}", vg.volume_group_name, name))
                            }
                            _ => {}
                        }
                    }
                }
                PlannedDevice::Md(md) => names.extend(
                    md.partitions
                        .iter()
                        .filter_map(|p| p.reuse.as_ref().and_then(ReuseTarget::name))
                        .map(str::to_owned),
                ),
                PlannedDevice::Bcache(bcache) => names.extend(
                    bcache
                        .partitions
                        .iter()
                        .filter_map(|p| p.reuse.as_ref().and_then(ReuseTarget::name))
                        .map(str::to_owned),
                ),
                _ => {}
            }
        }
        names
    }

    /// Reused storage ids, for devices reused by sid.
    pub fn all_reuse_sids(&self) -> Vec<crate::primitives::ids::Sid> {
        self.all_devices()
            .iter()
            .filter_map(|d| match d.reuse() {
                Some(ReuseTarget::Sid(sid)) => Some(*sid),
                _ => None,
            })
            .collect()
    }

    pub fn find_vg(&self, name: &str) -> Option<&PlannedVg> {
        self.vgs().find(|vg| vg.volume_group_name == name)
    }
}

impl IntoIterator for DevicesPlan {
    type Item = PlannedDevice;
    type IntoIter = std::vec::IntoIter<PlannedDevice>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.into_iter()
    }
}
