//! Frees space on the target disks by deleting and shrinking partitions.

use std::collections::BTreeSet;

use log::{debug, info};

use devicegraph::DeviceGraph;
use layoutplan_api::{
    constants::PV_METADATA_SIZE,
    error::{PlannerError, ProvisioningError, ReportError},
    planned::{DevicesPlan, PlannedPartition, PlannedVg},
    settings::SpaceSettings,
    DiskSize, Sid,
};
use sysdefs::partition_tables::PartitionType;

use crate::distribution::{best_distribution, free_spaces, resizing_size, FreeSpace, PartitionsDistribution};

mod actions;

use actions::Action;

/// Outcome of making space.
#[derive(Debug, Clone)]
pub struct SpaceMakerResult {
    pub graph: DeviceGraph,
    pub distribution: PartitionsDistribution,
    pub deleted: BTreeSet<Sid>,
    pub resized: BTreeSet<Sid>,
}

pub struct SpaceMaker<'a> {
    settings: &'a SpaceSettings,

    /// Reused devices and everything they are built upon.
    protected: BTreeSet<Sid>,
}

impl<'a> SpaceMaker<'a> {
    pub fn new(settings: &'a SpaceSettings, protected: BTreeSet<Sid>) -> Self {
        Self { settings, protected }
    }

    /// Executes the mandatory deletions.
    #[tracing::instrument(skip_all)]
    pub fn prepare(&self, graph: &DeviceGraph, disks: &[String]) -> Result<(DeviceGraph, BTreeSet<Sid>), PlannerError> {
        let mut graph = graph.clone();
        let mut deleted = BTreeSet::new();
        for action in actions::resolve(&graph, disks, self.settings)? {
            if let Action::Delete { sid, mandatory: true } = action {
                deleted.extend(self.delete(&mut graph, sid, true)?);
            }
        }
        info!("Deleted {} devices before making space", deleted.len());
        Ok((graph, deleted))
    }

    /// Runs the optional actions one by one until the planned partitions fit
    /// in the free spaces of `disks`.
    #[tracing::instrument(skip_all)]
    pub fn provide_space(
        &self,
        graph: &DeviceGraph,
        disks: &[String],
        partitions: &[PlannedPartition],
        vgs: &[PlannedVg],
    ) -> Result<SpaceMakerResult, PlannerError> {
        let mut graph = graph.clone();
        let mut deleted = BTreeSet::new();
        let mut resized = BTreeSet::new();
        let resolved = actions::resolve(&graph, disks, self.settings)?;
        let mut pending = actions::optional_in_order(&graph, &resolved).into_iter();

        loop {
            let spaces = free_spaces(&graph, disks, partitions, &resized);
            if let Some(distribution) = best_distribution(partitions, &spaces, vgs) {
                return Ok(SpaceMakerResult {
                    graph,
                    distribution,
                    deleted,
                    resized,
                });
            }

            let Some(action) = pending.find(|a| graph.contains(a.sid()) && !self.protected.contains(&a.sid()))
            else {
                let missing = missing_size(partitions, vgs, &spaces);
                debug!("No more actions, {missing} missing");
                return Err(PlannerError::new(ProvisioningError::NoDiskSpace { missing }));
            };
            match action {
                Action::Resize { sid, min_size } => {
                    if self.shrink(&mut graph, sid, min_size, partitions, vgs, &spaces)? {
                        resized.insert(sid);
                    }
                }
                Action::Delete { sid, .. } => deleted.extend(self.delete(&mut graph, sid, false)?),
            }
        }
    }

    fn shrink(
        &self,
        graph: &mut DeviceGraph,
        sid: Sid,
        min_size: Option<DiskSize>,
        partitions: &[PlannedPartition],
        vgs: &[PlannedVg],
        spaces: &[FreeSpace],
    ) -> Result<bool, PlannerError> {
        let info = graph.resize_info(sid);
        let (Some(size), Some(name)) = (graph.size(sid), graph.device(sid).map(|d| d.name.clone())) else {
            return Ok(false);
        };
        if !info.resize_ok {
            debug!("Skipping resize of '{name}', not resizable");
            return Ok(false);
        }
        let reclaim = resizing_size(graph, sid, partitions, vgs, spaces);
        let target = (size - reclaim)
            .max(info.min_size)
            .max(min_size.unwrap_or(DiskSize::ZERO));
        if target >= size {
            return Ok(false);
        }
        info!("Shrinking '{name}' from {size} to {target}");
        graph
            .resize_partition(sid, target)
            .structured(ProvisioningError::ResizeDevice { name })?;
        Ok(true)
    }

    /// Deletes a device. Disks are wiped: every partition that is not
    /// protected goes, and the table too when `wipe_table` is set and no
    /// partition is left.
    fn delete(&self, graph: &mut DeviceGraph, sid: Sid, wipe_table: bool) -> Result<Vec<Sid>, PlannerError> {
        let Some(device) = graph.device(sid) else {
            return Ok(Vec::new());
        };
        let name = device.name.clone();
        let is_disk = device.as_disk().is_some();
        let is_partition = device.as_partition().is_some();
        if self.protected.contains(&sid) && !is_disk {
            debug!("Not deleting protected device '{name}'");
            return Ok(Vec::new());
        }

        if is_partition {
            return self.delete_partition(graph, sid);
        }
        if !is_disk {
            return graph
                .remove_device(sid)
                .structured(ProvisioningError::DeleteDevice { name });
        }

        let mut removed = Vec::new();
        let partitions: Vec<Sid> = graph.partitions(sid).iter().map(|p| p.sid).collect();
        if partitions.is_empty() && graph.partition_table(sid).is_none() {
            if !self.protected.contains(&sid) && self.delete_structure(graph, sid, &mut removed)? {
                removed.extend(self.delete_content(graph, sid, &name)?);
            }
            return Ok(removed);
        }
        for partition in partitions.into_iter().rev() {
            removed.extend(self.delete_partition(graph, partition)?);
        }
        if wipe_table && graph.partitions(sid).is_empty() {
            removed.extend(
                graph
                    .remove_partition_table(sid)
                    .structured(ProvisioningError::DeleteDevice { name })?,
            );
        }
        Ok(removed)
    }

    /// Deletes a partition along with any structure it is a member of.
    /// Empty extended partitions are removed too.
    fn delete_partition(&self, graph: &mut DeviceGraph, sid: Sid) -> Result<Vec<Sid>, PlannerError> {
        let Some(device) = graph.device(sid) else {
            return Ok(Vec::new());
        };
        let name = device.name.clone();
        if self.protected.contains(&sid) {
            debug!("Not deleting protected partition '{name}'");
            return Ok(Vec::new());
        }
        let is_extended = device
            .as_partition()
            .is_some_and(|p| p.partition_type == PartitionType::Extended);
        let disk = graph.partitionable_of(sid).map(|d| d.sid);

        let mut removed = Vec::new();
        if is_extended {
            let Some(disk) = disk else {
                return Ok(removed);
            };
            let logical: Vec<Sid> = graph
                .partitions(disk)
                .iter()
                .filter(|p| p.as_partition().is_some_and(|p| p.partition_type == PartitionType::Logical))
                .map(|p| p.sid)
                .collect();
            if logical.iter().any(|l| self.protected.contains(l)) {
                debug!("Not deleting '{name}', it holds protected partitions");
                return Ok(removed);
            }
            for partition in logical.into_iter().rev() {
                removed.extend(self.delete_partition(graph, partition)?);
            }
        } else if !self.delete_structure(graph, sid, &mut removed)? {
            return Ok(removed);
        }

        if graph.contains(sid) {
            debug!("Deleting partition '{name}'");
            removed.extend(
                graph
                    .delete_partition(sid)
                    .structured(ProvisioningError::DeleteDevice { name })?,
            );
        }
        if let Some(disk) = disk {
            removed.extend(self.delete_empty_extended(graph, disk)?);
        }
        Ok(removed)
    }

    /// Removes the volume group, RAID, bcache or multi-device filesystem
    /// using the block device, and the other members. Returns false when
    /// some of it is protected.
    fn delete_structure(&self, graph: &mut DeviceGraph, blk: Sid, removed: &mut Vec<Sid>) -> Result<bool, PlannerError> {
        let Some(structure) = graph.using_structure(blk) else {
            return Ok(true);
        };
        let structure_sid = structure.sid;
        let structure_name = structure.name.clone();
        let members = graph.structure_members(structure_sid);
        if self.protected.contains(&structure_sid) || members.iter().any(|m| self.protected.contains(m)) {
            debug!("Not deleting '{structure_name}', it is in use by the plan");
            return Ok(false);
        }

        debug!("Deleting '{structure_name}' and its {} members", members.len());
        removed.extend(
            graph
                .remove_device(structure_sid)
                .structured(ProvisioningError::DeleteDevice { name: structure_name.clone() })?,
        );
        for member in members.into_iter().filter(|m| *m != blk) {
            let Some(kind) = graph.device(member).map(|d| d.kind_name()) else {
                continue;
            };
            if kind == "partition" {
                removed.extend(self.delete_partition(graph, member)?);
            } else {
                let name = graph.device(member).map(|d| d.name.clone()).unwrap_or_default();
                removed.extend(self.delete_content(graph, member, &name)?);
            }
        }
        removed.extend(self.delete_content(graph, blk, &structure_name)?);
        Ok(true)
    }

    fn delete_content(&self, graph: &mut DeviceGraph, blk: Sid, name: &str) -> Result<Vec<Sid>, PlannerError> {
        graph
            .remove_descendants(blk)
            .structured(ProvisioningError::DeleteDevice { name: name.to_owned() })
    }

    fn delete_empty_extended(&self, graph: &mut DeviceGraph, disk: Sid) -> Result<Vec<Sid>, PlannerError> {
        let Some(extended) = graph.extended_partition(disk).map(|e| (e.sid, e.name.clone())) else {
            return Ok(Vec::new());
        };
        let has_logical = graph
            .partitions(disk)
            .iter()
            .any(|p| p.as_partition().is_some_and(|p| p.partition_type == PartitionType::Logical));
        if has_logical || self.protected.contains(&extended.0) {
            return Ok(Vec::new());
        }
        debug!("Deleting empty extended partition '{}'", extended.1);
        graph
            .delete_partition(extended.0)
            .structured(ProvisioningError::DeleteDevice { name: extended.1 })
    }
}

/// Devices the space maker must leave alone: the ones the plan reuses and
/// everything they are built upon.
pub fn protected_devices(graph: &DeviceGraph, plan: &DevicesPlan) -> BTreeSet<Sid> {
    let mut protected = BTreeSet::new();
    let mut sids = plan.all_reuse_sids();
    for name in plan.all_reuse_names() {
        let short = name.trim_start_matches("/dev/");
        let found = graph
            .find_by_name(&name)
            .or_else(|| graph.find_vg(short))
            .or_else(|| graph.find_md(&name))
            .or_else(|| graph.find_bcache(&name));
        match found {
            Some(device) => sids.push(device.sid),
            None => debug!("Reused device '{name}' not found"),
        }
    }
    for sid in sids {
        protected.insert(sid);
        protected.extend(graph.ancestors(sid));
    }
    protected
}

/// Rough amount of space missing for the planned partitions.
fn missing_size(partitions: &[PlannedPartition], vgs: &[PlannedVg], spaces: &[FreeSpace]) -> DiskSize {
    let needed: DiskSize = partitions
        .iter()
        .filter(|p| !p.is_reused())
        .map(|p| p.size.unresolved_min())
        .chain(vgs.iter().map(|vg| vg.lvs_min_size() + PV_METADATA_SIZE))
        .sum();
    let available: DiskSize = spaces
        .iter()
        .filter(|s| !s.reserved_for_growth)
        .map(FreeSpace::usable_size)
        .sum();
    needed - available
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use devicegraph::fixtures;
    use layoutplan_api::{
        planned::{PlannedDevice, PlannedSize, ReuseTarget},
        PlannedId,
    };

    use super::*;

    fn names(graph: &DeviceGraph) -> Vec<String> {
        graph
            .devices()
            .filter(|d| d.as_partition().is_some())
            .map(|d| d.name.clone())
            .collect()
    }

    fn new_partition(id: u32, size: DiskSize) -> PlannedPartition {
        let mut partition = PlannedPartition::new(PlannedId(id));
        partition.size = PlannedSize::fixed(size);
        partition
    }

    fn windows_graph() -> DeviceGraph {
        fixtures::from_yaml(indoc! {r#"
            disks:
              - name: /dev/sda
                size: 100 GiB
                partition_table: msdos
                partitions:
                  - size: 60 GiB
                    id: ntfs
                    filesystem: ntfs
                    resize: { min_size: 20 GiB }
                  - { size: 30 GiB, id: linux, filesystem: ext4, label: data }
        "#})
        .unwrap()
    }

    #[test]
    fn test_resize_before_delete() {
        let graph = windows_graph();
        let settings: SpaceSettings = serde_yaml::from_str(indoc! {r#"
            actions:
              - resize: { device: /dev/sda1 }
              - delete: { device: /dev/sda2 }
        "#})
        .unwrap();
        let maker = SpaceMaker::new(&settings, BTreeSet::new());
        let disks = vec!["/dev/sda".to_owned()];

        let result = maker
            .provide_space(&graph, &disks, &[new_partition(1, DiskSize::gib(20))], &[])
            .unwrap();
        let sda1 = graph.find_by_name("/dev/sda1").unwrap().sid;
        assert_eq!(result.resized, [sda1].into_iter().collect());
        assert!(result.deleted.is_empty());
        let size = result.graph.size(sda1).unwrap();
        assert!(size < DiskSize::gib(60) && size >= DiskSize::gib(20));
        assert_eq!(names(&result.graph), vec!["/dev/sda1", "/dev/sda2"]);

        // Shrinking is not enough, so the Linux partition goes too.
        let result = maker
            .provide_space(&graph, &disks, &[new_partition(1, DiskSize::gib(60))], &[])
            .unwrap();
        assert_eq!(names(&result.graph), vec!["/dev/sda1"]);
        assert_eq!(result.graph.size(sda1), Some(DiskSize::gib(20)));

        let err = maker
            .provide_space(&graph, &disks, &[new_partition(1, DiskSize::gib(90))], &[])
            .unwrap_err();
        assert!(err.is_no_disk_space());
    }

    #[test]
    fn test_reused_devices_are_protected() {
        let graph = windows_graph();
        let mut reused = PlannedPartition::new(PlannedId(1));
        reused.reuse = Some(ReuseTarget::Name("/dev/sda2".into()));
        let plan = DevicesPlan::new(vec![PlannedDevice::Partition(reused)]);
        let protected = protected_devices(&graph, &plan);
        let sda2 = graph.find_by_name("/dev/sda2").unwrap().sid;
        let sda = graph.find_by_name("/dev/sda").unwrap().sid;
        assert!(protected.contains(&sda2));
        assert!(protected.contains(&sda));

        let settings: SpaceSettings = serde_yaml::from_str(indoc! {r#"
            actions:
              - delete: { device: /dev/sda, mandatory: true }
        "#})
        .unwrap();
        let maker = SpaceMaker::new(&settings, protected);
        let (prepared, deleted) = maker.prepare(&graph, &["/dev/sda".into()]).unwrap();
        assert_eq!(names(&prepared), vec!["/dev/sda2"]);
        assert!(!deleted.contains(&sda2));
        assert!(prepared.partition_table(sda).is_some());
    }

    #[test]
    fn test_delete_whole_structure() {
        let graph = fixtures::from_yaml(indoc! {r#"
            disks:
              - name: /dev/sda
                size: 50 GiB
                partition_table: gpt
                partitions:
                  - { size: 20 GiB, id: lvm }
              - name: /dev/sdb
                size: 50 GiB
                partition_table: gpt
                partitions:
                  - { size: 20 GiB, id: lvm }
            volume_groups:
              - name: system
                pvs: [/dev/sda1, /dev/sdb1]
                lvs:
                  - { name: root, size: 30 GiB, filesystem: btrfs }
        "#})
        .unwrap();
        let settings: SpaceSettings = serde_yaml::from_str(indoc! {r#"
            actions:
              - delete: { device: /dev/sda1, mandatory: true }
        "#})
        .unwrap();
        let maker = SpaceMaker::new(&settings, BTreeSet::new());
        let (prepared, _) = maker.prepare(&graph, &["/dev/sda".into()]).unwrap();
        assert!(names(&prepared).is_empty());
        assert!(prepared.find_vg("system").is_none());
        assert!(prepared.find_by_name("/dev/system/root").is_none());
    }

    #[test]
    fn test_wipe_disk() {
        let graph = fixtures::from_yaml(indoc! {r#"
            disks:
              - name: /dev/sda
                size: 100 GiB
                partition_table: msdos
                partitions:
                  - { size: 10 GiB }
                  - { size: 50 GiB, type: extended }
                  - { size: 10 GiB, type: logical }
                  - { size: 10 GiB, type: logical }
        "#})
        .unwrap();
        let sda = graph.find_by_name("/dev/sda").unwrap().sid;
        let settings: SpaceSettings = serde_yaml::from_str(indoc! {r#"
            actions:
              - delete: { device: /dev/sda6 }
              - delete: { device: /dev/sda5 }
        "#})
        .unwrap();
        let maker = SpaceMaker::new(&settings, BTreeSet::new());

        // Deleting every logical partition drops the extended one too.
        let result = maker
            .provide_space(&graph, &["/dev/sda".into()], &[new_partition(1, DiskSize::gib(80))], &[])
            .unwrap();
        assert_eq!(names(&result.graph), vec!["/dev/sda1"]);

        let settings: SpaceSettings = serde_yaml::from_str(indoc! {r#"
            actions:
              - delete: { device: /dev/sda, mandatory: true }
        "#})
        .unwrap();
        let maker = SpaceMaker::new(&settings, BTreeSet::new());
        let (prepared, deleted) = maker.prepare(&graph, &["/dev/sda".into()]).unwrap();
        assert!(names(&prepared).is_empty());
        assert!(prepared.partition_table(sda).is_none());
        assert_eq!(deleted.len(), 5);
    }
}
