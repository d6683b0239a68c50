//! Turn planned devices into real devices of a device graph.

use std::collections::BTreeMap;

use devicegraph::DeviceGraph;
use layoutplan_api::{
    error::{PlannerError, ProvisioningError},
    issues::DeviceShrinkage,
    DiskSize, PlannedId, Sid,
};

mod bcache;
mod btrfs;
mod disk;
mod format;
mod lvm;
mod md;
mod nfs;
mod partition;
mod partition_table;
mod tmpfs;

pub use bcache::BcacheCreator;
pub use btrfs::BtrfsCreator;
pub use disk::DiskCreator;
pub use format::format_device;
pub use lvm::LvmCreator;
pub use md::MdCreator;
pub use nfs::NfsCreator;
pub use partition::PartitionCreator;
pub use partition_table::PartitionTableCreator;
pub use tmpfs::TmpfsCreator;

/// Graph after creating some devices, and where every planned device ended
/// up.
#[derive(Debug, Clone)]
pub struct CreatorResult {
    pub devicegraph: DeviceGraph,
    pub devices_map: BTreeMap<PlannedId, Sid>,
    pub shrinkages: Vec<DeviceShrinkage>,
}

impl CreatorResult {
    pub fn new(devicegraph: DeviceGraph) -> Self {
        Self {
            devicegraph,
            devices_map: BTreeMap::new(),
            shrinkages: Vec::new(),
        }
    }

    /// Adds the outcome of a later step. Its graph already contains the
    /// changes of this one and replaces it.
    pub fn merge(mut self, other: CreatorResult) -> Self {
        self.devicegraph = other.devicegraph;
        self.devices_map.extend(other.devices_map);
        self.shrinkages.extend(other.shrinkages);
        self
    }

    pub fn real(&self, planned_id: PlannedId) -> Option<Sid> {
        self.devices_map.get(&planned_id).copied()
    }
}

/// Creates or reuses the devices of one family.
pub trait Creator {
    type Planned;

    /// Creates `planned` on top of the given member devices.
    fn create(&self, graph: DeviceGraph, planned: &Self::Planned, members: &[Sid]) -> Result<CreatorResult, PlannerError>;

    /// Binds `planned` to the existing device it reuses, keeping its sid.
    fn reuse(&self, graph: DeviceGraph, planned: &Self::Planned) -> Result<CreatorResult, PlannerError>;
}

/// Compares a realized size with the planned minimum. Smaller devices are
/// accepted down to `absolute_min` and reported as a shrinkage.
pub(crate) fn check_size(
    planned: PlannedId,
    real: Sid,
    planned_min: DiskSize,
    size: DiskSize,
    absolute_min: DiskSize,
) -> Result<Option<DeviceShrinkage>, PlannerError> {
    if size >= planned_min {
        return Ok(None);
    }
    if size < absolute_min {
        return Err(PlannerError::new(ProvisioningError::NoDiskSpace {
            missing: absolute_min - size,
        }));
    }
    Ok(Some(DeviceShrinkage {
        planned,
        real,
        diff: planned_min - size,
    }))
}

#[cfg(test)]
mod tests {
    use maplit::btreemap;

    use super::*;

    #[test]
    fn test_check_size() {
        let check = |size| check_size(PlannedId(1), Sid(7), DiskSize::gib(10), size, DiskSize::gib(1));
        assert_eq!(check(DiskSize::gib(10)).unwrap(), None);
        assert_eq!(
            check(DiskSize::gib(8)).unwrap(),
            Some(DeviceShrinkage {
                planned: PlannedId(1),
                real: Sid(7),
                diff: DiskSize::gib(2),
            })
        );
        assert!(check(DiskSize::mib(512)).unwrap_err().is_no_disk_space());
    }

    #[test]
    fn test_merge() {
        let mut first = CreatorResult::new(DeviceGraph::new());
        first.devices_map.insert(PlannedId(1), Sid(1));
        let mut second = CreatorResult::new(DeviceGraph::new());
        second.devices_map.insert(PlannedId(2), Sid(2));
        second.shrinkages.push(DeviceShrinkage {
            planned: PlannedId(2),
            real: Sid(2),
            diff: DiskSize::mib(1),
        });

        let merged = first.merge(second);
        assert_eq!(
            merged.devices_map,
            btreemap! {
                PlannedId(1) => Sid(1),
                PlannedId(2) => Sid(2),
            }
        );
        assert_eq!(merged.real(PlannedId(3)), None);
        assert_eq!(merged.shrinkages.len(), 1);
    }
}
