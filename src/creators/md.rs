use log::info;

use devicegraph::DeviceGraph;
use layoutplan_api::{
    error::{PlannerError, ProvisioningError, ReportError},
    planned::{PlannedMd, ReuseTarget},
    Sid,
};

use super::{format_device, partition::reuse_name, Creator, CreatorResult};

/// Creates software RAIDs. Partitions of a partitioned RAID are created
/// afterwards, like the partitions of a disk.
pub struct MdCreator;

impl Creator for MdCreator {
    type Planned = PlannedMd;

    fn create(&self, graph: DeviceGraph, planned: &PlannedMd, members: &[Sid]) -> Result<CreatorResult, PlannerError> {
        let mut result = CreatorResult::new(graph);
        let error = || ProvisioningError::CreateMd {
            name: planned.name.clone(),
        };
        let graph = &mut result.devicegraph;
        let ordered: Vec<Sid> = ordered_members(graph, planned, members)
            .into_iter()
            .map(|sid| graph.plain_device(sid))
            .collect();
        let md = graph
            .create_md(&planned.name, planned.level(), &ordered, planned.chunk_size, planned.parity)
            .structured(error())?;
        info!("Created {} '{}' over {} devices", planned.level(), planned.name, ordered.len());
        if !planned.is_partitioned() {
            format_device(graph, md, &planned.format, &planned.encryption).structured(error())?;
        }
        result.devices_map.insert(planned.planned_id, md);
        Ok(result)
    }

    fn reuse(&self, graph: DeviceGraph, planned: &PlannedMd) -> Result<CreatorResult, PlannerError> {
        let mut result = CreatorResult::new(graph);
        let name = planned.reuse.as_ref().map(reuse_name).unwrap_or_else(|| planned.name.clone());
        let error = || ProvisioningError::ReuseDevice { name: name.clone() };
        let graph = &mut result.devicegraph;
        let md = match &planned.reuse {
            Some(ReuseTarget::Sid(sid)) => graph.device(*sid).filter(|d| d.as_md().is_some()),
            _ => graph.find_md(&name),
        }
        .map(|d| d.sid)
        .structured(error())?;
        if !planned.is_partitioned() {
            format_device(graph, md, &planned.format, &planned.encryption).structured(error())?;
        }
        result.devices_map.insert(planned.planned_id, md);
        Ok(result)
    }
}

/// Members listed in `devices_order` come first, in that order, the rest
/// follow by name.
fn ordered_members(graph: &DeviceGraph, planned: &PlannedMd, members: &[Sid]) -> Vec<Sid> {
    let name_of = |sid: &Sid| graph.device(*sid).map(|d| d.name.clone()).unwrap_or_default();
    let mut ordered: Vec<Sid> = planned
        .devices_order
        .iter()
        .filter_map(|wanted| members.iter().find(|sid| name_of(sid) == *wanted).copied())
        .collect();
    let mut rest: Vec<Sid> = members.iter().filter(|sid| !ordered.contains(sid)).copied().collect();
    rest.sort_by_key(name_of);
    ordered.extend(rest);
    ordered
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use devicegraph::fixtures;
    use layoutplan_api::{planned::CanBeFormatted, DiskSize, PlannedId};
    use sysdefs::{filesystems::FilesystemType, levels::MdLevel};

    use super::*;

    fn graph() -> DeviceGraph {
        fixtures::from_yaml(indoc! {r#"
            disks:
              - name: /dev/sda
                size: 20 GiB
                partition_table: gpt
                partitions: [{ size: 10 GiB, id: raid }]
              - name: /dev/sdb
                size: 20 GiB
                partition_table: gpt
                partitions: [{ size: 12 GiB, id: raid }]
            mds:
              - { name: /dev/md/data, level: raid0, members: [/dev/sda1, /dev/sdb1], filesystem: xfs }
        "#})
        .unwrap()
    }

    #[test]
    fn test_create_md() {
        let mut graph = graph();
        let old = graph.find_md("data").unwrap().sid;
        graph.remove_device(old).unwrap();
        let sda1 = graph.find_by_name("/dev/sda1").unwrap().sid;
        let sdb1 = graph.find_by_name("/dev/sdb1").unwrap().sid;

        let mut md = PlannedMd::new(PlannedId(1), "/dev/md0");
        md.devices_order = vec!["/dev/sdb1".into()];
        md.format = CanBeFormatted {
            filesystem_type: Some(FilesystemType::Ext4),
            mount_point: Some("/srv".into()),
            ..Default::default()
        };
        let result = MdCreator.create(graph, &md, &[sda1, sdb1]).unwrap();
        let graph = &result.devicegraph;
        let md_sid = result.real(PlannedId(1)).unwrap();
        let device = graph.device(md_sid).unwrap();
        assert_eq!(device.as_md().unwrap().level, MdLevel::Raid1);
        assert_eq!(graph.size(md_sid), Some(DiskSize::gib(10)));
        assert_eq!(graph.md_members(md_sid), vec![sda1, sdb1]);
        assert_eq!(ordered_members(graph, &md, &[sda1, sdb1]), vec![sdb1, sda1]);
        assert!(graph.filesystem_of(md_sid).is_some());
    }

    #[test]
    fn test_reuse_md() {
        let graph = graph();
        let mut md = PlannedMd::new(PlannedId(1), "/dev/md/data");
        md.reuse = Some(ReuseTarget::Name("/dev/md/data".into()));
        md.format.mount_point = Some("/data".into());

        let result = MdCreator.reuse(graph.clone(), &md).unwrap();
        let md_sid = result.real(PlannedId(1)).unwrap();
        assert_eq!(
            result.devicegraph.filesystem_of(md_sid).unwrap().mount_point().unwrap().path,
            "/data"
        );

        md.reuse = Some(ReuseTarget::Name("/dev/md/other".into()));
        assert!(MdCreator.reuse(graph, &md).is_err());
    }
}
