use log::debug;

use devicegraph::DeviceGraph;
use layoutplan_api::{
    error::{PlannerError, ProvisioningError, ReportError},
    planned::PlannedDisk,
    Sid,
};

use super::{format_device, Creator, CreatorResult};

/// Uses disks directly, without partition table.
pub struct DiskCreator;

impl Creator for DiskCreator {
    type Planned = PlannedDisk;

    fn create(&self, graph: DeviceGraph, planned: &PlannedDisk, _members: &[Sid]) -> Result<CreatorResult, PlannerError> {
        self.reuse(graph, planned)
    }

    fn reuse(&self, graph: DeviceGraph, planned: &PlannedDisk) -> Result<CreatorResult, PlannerError> {
        let mut result = CreatorResult::new(graph);
        let error = || ProvisioningError::ReuseDevice {
            name: planned.name.clone(),
        };
        let graph = &mut result.devicegraph;
        let disk = graph.find_by_name(&planned.name).map(|d| d.sid).structured(error())?;

        let keep = !planned.format.reformat
            && graph.partition_table(disk).is_none()
            && graph.filesystem_of(disk).is_some();
        if !keep && graph.is_used(disk) {
            debug!("Wiping '{}' to use it as a whole", planned.name);
            graph.remove_descendants(disk).structured(error())?;
        }
        format_device(graph, disk, &planned.format, &planned.encryption).structured(error())?;
        result.devices_map.insert(planned.planned_id, disk);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use devicegraph::fixtures;
    use layoutplan_api::{planned::CanBeFormatted, PlannedId};
    use sysdefs::filesystems::FilesystemType;

    use super::*;

    #[test]
    fn test_whole_disk() {
        let graph = fixtures::from_yaml(indoc! {r#"
            disks:
              - name: /dev/sda
                size: 20 GiB
                partition_table: gpt
                partitions:
                  - { size: 10 GiB, filesystem: ext4 }
              - { name: /dev/sdb, size: 20 GiB, filesystem: xfs, label: data }
        "#})
        .unwrap();

        let mut sda = PlannedDisk::new(PlannedId(1), "/dev/sda");
        sda.format = CanBeFormatted {
            filesystem_type: Some(FilesystemType::Xfs),
            mount_point: Some("/srv".into()),
            ..Default::default()
        };
        let result = DiskCreator.create(graph, &sda, &[]).unwrap();
        let disk = result.real(PlannedId(1)).unwrap();
        assert!(result.devicegraph.partition_table(disk).is_none());
        assert_eq!(
            result.devicegraph.filesystem_of(disk).unwrap().mount_point().unwrap().path,
            "/srv"
        );

        let mut sdb = PlannedDisk::new(PlannedId(2), "/dev/sdb");
        sdb.format.mount_point = Some("/data".into());
        let result = DiskCreator.reuse(result.devicegraph, &sdb).unwrap();
        let disk = result.real(PlannedId(2)).unwrap();
        let fs = result.devicegraph.filesystem_of(disk).unwrap();
        assert_eq!(fs.as_filesystem().unwrap().label.as_deref(), Some("data"));
        assert_eq!(fs.mount_point().unwrap().path, "/data");

        let missing = PlannedDisk::new(PlannedId(3), "/dev/sdz");
        assert!(DiskCreator.reuse(result.devicegraph, &missing).is_err());
    }
}
