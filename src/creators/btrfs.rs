use log::info;

use devicegraph::{
    device::{Filesystem, MountPoint},
    DeviceGraph,
};
use layoutplan_api::{
    error::{InternalError, PlannerError, ProvisioningError, ReportError},
    planned::PlannedBtrfs,
    Sid,
};
use sysdefs::filesystems::FilesystemType;

use super::{Creator, CreatorResult};

/// Creates Btrfs filesystems spanning several devices.
pub struct BtrfsCreator;

impl Creator for BtrfsCreator {
    type Planned = PlannedBtrfs;

    fn create(&self, graph: DeviceGraph, planned: &PlannedBtrfs, members: &[Sid]) -> Result<CreatorResult, PlannerError> {
        let mut result = CreatorResult::new(graph);
        let graph = &mut result.devicegraph;
        let members: Vec<Sid> = members.iter().map(|sid| graph.plain_device(*sid)).collect();

        let mut filesystem = Filesystem::new(FilesystemType::Btrfs);
        filesystem.label = planned.format.label.clone();
        filesystem.uuid = planned.format.uuid.clone();
        filesystem.mkfs_options = planned.format.mkfs_options.clone();
        filesystem.data_raid_level = planned.data_raid_level;
        filesystem.metadata_raid_level = planned.metadata_raid_level;
        filesystem.mount_point = planned.format.mount_point.as_ref().map(|path| MountPoint {
            path: path.clone(),
            mount_by: planned.format.mount_by.unwrap_or_default(),
            options: planned.format.fstab_options.clone(),
        });

        let fs = graph
            .create_multidevice_filesystem(&members, filesystem)
            .structured(ProvisioningError::CreateBtrfs {
                name: planned.name.clone(),
            })?;
        info!("Created Btrfs '{}' over {} devices", planned.name, members.len());
        result.devices_map.insert(planned.planned_id, fs);
        Ok(result)
    }

    fn reuse(&self, _graph: DeviceGraph, _planned: &PlannedBtrfs) -> Result<CreatorResult, PlannerError> {
        Err(PlannerError::new(InternalError::Internal(
            "multi-device Btrfs filesystems are always created",
        )))
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use devicegraph::fixtures;
    use layoutplan_api::PlannedId;
    use sysdefs::levels::BtrfsRaidLevel;

    use super::*;

    #[test]
    fn test_create_btrfs() {
        let graph = fixtures::from_yaml(indoc! {r#"
            disks:
              - { name: /dev/sda, size: 20 GiB }
              - { name: /dev/sdb, size: 20 GiB }
        "#})
        .unwrap();
        let members: Vec<Sid> = ["/dev/sda", "/dev/sdb"]
            .iter()
            .map(|n| graph.find_by_name(n).unwrap().sid)
            .collect();

        let mut planned = PlannedBtrfs::new(PlannedId(1), "root_fs");
        planned.data_raid_level = Some(BtrfsRaidLevel::Raid1);
        planned.format.mount_point = Some("/".into());
        planned.format.label = Some("root".into());

        let result = BtrfsCreator.create(graph.clone(), &planned, &members).unwrap();
        let fs = result.real(PlannedId(1)).unwrap();
        let graph_after = &result.devicegraph;
        assert_eq!(graph_after.filesystem_devices(fs), members);
        let filesystem = graph_after.device(fs).unwrap().as_filesystem().unwrap();
        assert_eq!(filesystem.data_raid_level, Some(BtrfsRaidLevel::Raid1));
        assert_eq!(filesystem.label.as_deref(), Some("root"));
        assert_eq!(filesystem.mount_point.as_ref().unwrap().path, "/");

        assert!(BtrfsCreator.reuse(graph, &planned).is_err());
    }
}
