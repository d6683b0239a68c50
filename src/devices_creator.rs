//! Runs the creators of every device family in dependency order.

use std::collections::BTreeMap;

use log::{debug, info};

use devicegraph::DeviceGraph;
use layoutplan_api::{
    error::{InternalError, PlannerError, ProvisioningError},
    planned::{CanBeMember, DevicesPlan, PlannedDevice, PlannedPartition},
    DiskSize, PlannedId, Sid,
};

use crate::{
    creators::{
        BcacheCreator, BtrfsCreator, Creator, CreatorResult, DiskCreator, LvmCreator, MdCreator,
        NfsCreator, PartitionCreator, TmpfsCreator,
    },
    distribution::{best_distribution, free_spaces, PartitionsDistribution},
};

/// Container a member device is planned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberOf<'a> {
    Vg(&'a str),
    Md(&'a str),
    BcacheBacking(&'a str),
    BcacheCaching(&'a str),
    Btrfs(&'a str),
}

impl MemberOf<'_> {
    fn matches(&self, member: &CanBeMember) -> bool {
        let (wanted, name) = match *self {
            MemberOf::Vg(name) => (&member.lvm_volume_group_name, name),
            MemberOf::Md(name) => (&member.raid_name, name),
            MemberOf::BcacheBacking(name) => (&member.bcache_backing_for, name),
            MemberOf::BcacheCaching(name) => (&member.bcache_caching_for, name),
            MemberOf::Btrfs(name) => (&member.btrfs_name, name),
        };
        wanted.as_deref() == Some(name)
    }
}

pub struct DevicesCreator<'a> {
    plan: &'a DevicesPlan,

    /// Planned id and membership of every device that can be a member of
    /// another, physical volumes synthesized for the distribution included.
    members: Vec<(PlannedId, CanBeMember)>,
}

impl<'a> DevicesCreator<'a> {
    pub fn new(plan: &'a DevicesPlan, distribution: &PartitionsDistribution) -> Self {
        let mut members: Vec<(PlannedId, CanBeMember)> = plan
            .all_devices()
            .into_iter()
            .filter_map(|device| match device {
                PlannedDevice::Disk(d) => Some((d.planned_id, d.member)),
                PlannedDevice::Partition(p) => Some((p.planned_id, p.member)),
                PlannedDevice::Md(md) => Some((md.planned_id, md.member)),
                PlannedDevice::Bcache(b) => Some((b.planned_id, b.member)),
                _ => None,
            })
            .collect();
        for partition in distribution.partitions() {
            if !members.iter().any(|(id, _)| *id == partition.planned_id) {
                members.push((partition.planned_id, partition.member.clone()));
            }
        }
        Self { plan, members }
    }

    /// Creates every planned device on `graph`. The new partitions of the
    /// disks follow `distribution`.
    #[tracing::instrument(skip_all)]
    pub fn populate(&self, graph: DeviceGraph, distribution: &PartitionsDistribution) -> Result<CreatorResult, PlannerError> {
        let mut result = PartitionCreator.create_partitions(graph, distribution)?;
        let reused: Vec<PlannedPartition> = self.plan.partitions().filter(|p| p.is_reused()).cloned().collect();
        result = merge(result, |graph| PartitionCreator.reuse_partitions(graph, &reused))?;
        for disk in self.plan.disks() {
            result = merge(result, |graph| DiskCreator.create(graph, disk, &[]))?;
        }

        for md in self.plan.mds() {
            let members = self.members_of(&result.devices_map, MemberOf::Md(&md.name))?;
            result = merge(result, |graph| {
                if md.is_reused() {
                    MdCreator.reuse(graph, md)
                } else {
                    MdCreator.create(graph, md, &members)
                }
            })?;
            result = merge(result, |graph| create_nested_partitions(graph, &md.name, &md.partitions))?;
        }

        for bcache in self.plan.bcaches() {
            let mut members = self.members_of(&result.devices_map, MemberOf::BcacheBacking(&bcache.name))?;
            members.truncate(1);
            members.extend(
                self.members_of(&result.devices_map, MemberOf::BcacheCaching(&bcache.name))?
                    .into_iter()
                    .take(1),
            );
            result = merge(result, |graph| {
                if bcache.reuse.is_some() {
                    BcacheCreator.reuse(graph, bcache)
                } else {
                    BcacheCreator.create(graph, bcache, &members)
                }
            })?;
            result = merge(result, |graph| {
                create_nested_partitions(graph, &bcache.name, &bcache.partitions)
            })?;
        }

        for vg in self.plan.vgs() {
            let members = self.members_of(&result.devices_map, MemberOf::Vg(&vg.volume_group_name))?;
            result = merge(result, |graph| {
                if vg.is_reused() {
                    LvmCreator.reuse(graph, vg)
                } else {
                    LvmCreator.create(graph, vg, &members)
                }
            })?;
        }

        for btrfs in self.plan.btrfses() {
            let members = self.members_of(&result.devices_map, MemberOf::Btrfs(&btrfs.name))?;
            result = merge(result, |graph| BtrfsCreator.create(graph, btrfs, &members))?;
        }
        for nfs in self.plan.nfses() {
            result = merge(result, |graph| NfsCreator.create(graph, nfs, &[]))?;
        }
        for tmpfs in self.plan.tmpfses() {
            result = merge(result, |graph| TmpfsCreator.create(graph, tmpfs, &[]))?;
        }

        info!(
            "Created {} planned devices, {} of them shrunk",
            result.devices_map.len(),
            result.shrinkages.len()
        );
        Ok(result)
    }

    /// Real devices of the members of a container, in planning order.
    fn members_of(&self, devices_map: &BTreeMap<PlannedId, Sid>, container: MemberOf) -> Result<Vec<Sid>, PlannerError> {
        let members: Vec<Sid> = self
            .members
            .iter()
            .filter(|(_, member)| container.matches(member))
            .map(|(planned_id, _)| {
                devices_map.get(planned_id).copied().ok_or_else(|| {
                    PlannerError::new(InternalError::MissingPlannedDevice {
                        planned_id: *planned_id,
                    })
                })
            })
            .collect::<Result<_, _>>()?;
        debug!("{container:?} has {} member(s)", members.len());
        Ok(members)
    }
}

/// Runs one creator step on the graph of `result` and merges its outcome.
fn merge(
    result: CreatorResult,
    step: impl FnOnce(DeviceGraph) -> Result<CreatorResult, PlannerError>,
) -> Result<CreatorResult, PlannerError> {
    let next = step(result.devicegraph.clone())?;
    Ok(result.merge(next))
}

/// Creates and reuses the partitions of a RAID or bcache device.
fn create_nested_partitions(
    graph: DeviceGraph,
    container: &str,
    partitions: &[PlannedPartition],
) -> Result<CreatorResult, PlannerError> {
    let (reused, new): (Vec<PlannedPartition>, Vec<PlannedPartition>) =
        partitions.iter().cloned().partition(PlannedPartition::is_reused);
    let mut result = CreatorResult::new(graph);
    if !new.is_empty() {
        let spaces = free_spaces(
            &result.devicegraph,
            &[container.to_owned()],
            &new,
            &Default::default(),
        );
        let distribution = best_distribution(&new, &spaces, &[]).ok_or_else(|| {
            let needed: DiskSize = new.iter().map(|p| p.size.min()).sum();
            let available: DiskSize = spaces.iter().map(|s| s.usable_size()).sum();
            PlannerError::new(ProvisioningError::NoDiskSpace {
                missing: needed - available,
            })
        })?;
        result = merge(result, |graph| PartitionCreator.create_partitions(graph, &distribution))?;
    }
    merge(result, |graph| PartitionCreator.reuse_partitions(graph, &reused))
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use devicegraph::fixtures;
    use layoutplan_api::planned::{PlannedBtrfs, PlannedLv, PlannedMd, PlannedSize, PlannedVg};
    use sysdefs::filesystems::FilesystemType;

    use super::*;

    fn partition(id: u32, size: DiskSize) -> PlannedPartition {
        let mut partition = PlannedPartition::new(PlannedId(id));
        partition.size = PlannedSize::fixed(size);
        partition
    }

    fn sized_by_distribution(graph: &DeviceGraph, plan: &DevicesPlan) -> PartitionsDistribution {
        let disks: Vec<String> = graph.disks().iter().map(|d| d.name.clone()).collect();
        let partitions: Vec<PlannedPartition> = plan.partitions().cloned().collect();
        let vgs: Vec<PlannedVg> = plan.vgs().filter(|vg| !vg.is_reused()).cloned().collect();
        let spaces = free_spaces(graph, &disks, &partitions, &Default::default());
        best_distribution(&partitions, &spaces, &vgs).unwrap()
    }

    #[test]
    fn test_raid_with_partitions_and_lvm() {
        let graph = fixtures::from_yaml(indoc! {r#"
            disks:
              - { name: /dev/sda, size: 20 GiB }
              - { name: /dev/sdb, size: 20 GiB }
        "#})
        .unwrap();

        let mut plan = DevicesPlan::default();
        for (id, disk) in [(1, "/dev/sda"), (2, "/dev/sdb")] {
            let mut member = partition(id, DiskSize::gib(10));
            member.disk = Some(disk.into());
            member.member.raid_name = Some("/dev/md0".into());
            plan.push(PlannedDevice::Partition(member));
        }
        let mut md = PlannedMd::new(PlannedId(3), "/dev/md0");
        let mut md_partition = partition(4, DiskSize::gib(2));
        md_partition.disk = Some("/dev/md0".into());
        md_partition.format.filesystem_type = Some(FilesystemType::Ext4);
        md_partition.format.mount_point = Some("/boot".into());
        md.partitions = vec![md_partition];
        plan.push(PlannedDevice::Md(md));

        let mut vg = PlannedVg::new(PlannedId(5), "system");
        let mut root = PlannedLv::new(PlannedId(6), "root");
        root.size = PlannedSize::fixed(DiskSize::gib(5));
        root.format.filesystem_type = Some(FilesystemType::Xfs);
        root.format.mount_point = Some("/".into());
        vg.lvs = vec![root];
        plan.push(PlannedDevice::LvmVg(vg));

        let distribution = sized_by_distribution(&graph, &plan);
        let creator = DevicesCreator::new(&plan, &distribution);
        let result = creator.populate(graph, &distribution).unwrap();
        let graph = &result.devicegraph;

        let md = result.real(PlannedId(3)).unwrap();
        assert_eq!(graph.md_members(md), vec![result.real(PlannedId(1)).unwrap(), result.real(PlannedId(2)).unwrap()]);
        let boot = result.real(PlannedId(4)).unwrap();
        assert_eq!(graph.partitionable_of(boot).unwrap().sid, md);
        assert_eq!(graph.device(boot).unwrap().name, "/dev/md0p1");

        let vg = result.real(PlannedId(5)).unwrap();
        assert_eq!(graph.vg_pv_devices(vg).len(), 1);
        let root = result.real(PlannedId(6)).unwrap();
        assert_eq!(graph.size(root), Some(DiskSize::gib(5)));
        assert!(result.shrinkages.is_empty());
    }

    #[test]
    fn test_btrfs_and_missing_member() {
        let graph = fixtures::from_yaml(indoc! {r#"
            disks:
              - { name: /dev/sda, size: 20 GiB }
              - { name: /dev/sdb, size: 20 GiB }
        "#})
        .unwrap();
        let mut plan = DevicesPlan::default();
        for (id, disk) in [(1, "/dev/sda"), (2, "/dev/sdb")] {
            let mut member = partition(id, DiskSize::gib(10));
            member.disk = Some(disk.into());
            member.member.btrfs_name = Some("data".into());
            plan.push(PlannedDevice::Partition(member));
        }
        let mut btrfs = PlannedBtrfs::new(PlannedId(3), "data");
        btrfs.format.mount_point = Some("/data".into());
        plan.push(PlannedDevice::Btrfs(btrfs));

        let distribution = sized_by_distribution(&graph, &plan);
        let result = DevicesCreator::new(&plan, &distribution)
            .populate(graph.clone(), &distribution)
            .unwrap();
        let fs = result.real(PlannedId(3)).unwrap();
        assert_eq!(result.devicegraph.filesystem_devices(fs).len(), 2);

        let empty = PartitionsDistribution { spaces: Vec::new() };
        let err = DevicesCreator::new(&plan, &empty).populate(graph, &empty).unwrap_err();
        assert_eq!(
            *err.kind(),
            InternalError::MissingPlannedDevice {
                planned_id: PlannedId(1)
            }
            .into()
        );
    }
}
