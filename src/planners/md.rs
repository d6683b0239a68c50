use log::debug;

use devicegraph::Device;
use layoutplan_api::{
    constants::PREFERRED_PTABLE_TYPE,
    issues::{Issue, IssuesList, NewValue},
    planned::{PlannedDevice, PlannedMd, PlannedPartition, ReuseTarget},
    DiskSize,
};
use sysdefs::levels::{MdLevel, MdParity};

use crate::drives_map::{partition_section_name, DriveEntry};

use super::{common, disk, DevicesPlanner};

pub(super) fn plan(
    planner: &mut DevicesPlanner,
    entry: &DriveEntry,
    issues: &mut IssuesList,
) -> Vec<PlannedDevice> {
    let options = entry.section.raid_options.clone().unwrap_or_default();
    let Some(name) = options
        .raid_name
        .clone()
        .or_else(|| entry.section.device.clone())
        .filter(|n| !n.is_empty())
    else {
        issues.push(Issue::MissingValue {
            section: entry.name(),
            attr: "device".into(),
        });
        return Vec::new();
    };
    let name = md_device_name(&name);
    let section_name = entry.name();

    let mut md = PlannedMd::new(planner.ids.next_id(), name.clone());
    md.md_level = options.raid_type.as_deref().map(|level| {
        common::parse_or_default(Some(level), MdLevel::Raid1, &section_name, "raid_type", issues)
    });
    md.parity = options.parity_algorithm.as_deref().map(|parity| {
        common::parse_or_default(
            Some(parity),
            MdParity::Default,
            &section_name,
            "parity_algorithm",
            issues,
        )
    });
    md.chunk_size = options.chunk_size.as_deref().and_then(|chunk| match DiskSize::parse(chunk) {
        Ok(size) if !size.is_zero() => Some(size),
        _ => {
            issues.push(Issue::InvalidValue {
                section: section_name.clone(),
                attr: "chunk_size".into(),
                value: chunk.to_owned(),
                new_value: NewValue::Skip,
            });
            None
        }
    });
    md.devices_order = options.device_order.clone();

    let graph = planner.graph;
    let existing = graph.find_md(&name);
    let sections = &entry.section.partitions;
    let formatted = match sections.as_slice() {
        [single] => single.partition_nr.is_none(),
        _ => false,
    };

    if formatted {
        let section = &sections[0];
        let part_name = partition_section_name(entry.index, 0);
        md.encryption = common::encryption(section);
        md.member = common::membership(section);
        if section.creates() {
            md.format = common::formatting(section, &part_name, None, issues);
        } else {
            let Some(reused) = reused_md(existing, &part_name, issues) else {
                return Vec::new();
            };
            let filesystem = common::existing_filesystem(graph, reused);
            md.format = common::formatting(section, &part_name, filesystem, issues);
            md.reuse = Some(ReuseTarget::Name(reused.name.clone()));
        }
    } else {
        md.ptable_type = Some(ptable_type(entry, issues));
        md.partitions = plan_partitions(planner, entry, &name, existing, md.ptable_type, issues);
        if md.partitions.iter().any(PlannedPartition::is_reused) {
            if let Some(existing) = existing {
                md.reuse = Some(ReuseTarget::Name(existing.name.clone()));
            }
        }
    }

    debug!(
        "Planned RAID '{}' ({}, {} partition(s))",
        md.name,
        md.level(),
        md.partitions.len()
    );
    vec![PlannedDevice::Md(md)]
}

/// RAID names are given either as device (`/dev/md0`) or as array name
/// (`data`, living at `/dev/md/data`).
pub(super) fn md_device_name(name: &str) -> String {
    if name.starts_with("/dev/") {
        name.to_owned()
    } else {
        format!("/dev/md/{name}")
    }
}

fn reused_md<'g>(existing: Option<&'g Device>, section: &str, issues: &mut IssuesList) -> Option<&'g Device> {
    if existing.is_none() {
        issues.push(Issue::MissingReusableDevice {
            section: section.to_owned(),
        });
    }
    existing
}

/// Partition table requested by a drive section, for the devices that may
/// hold partitions but are not disks.
pub(super) fn ptable_type(
    entry: &DriveEntry,
    issues: &mut IssuesList,
) -> sysdefs::partition_tables::PartitionTableType {
    common::parse_or_default(
        entry.section.disklabel.as_deref(),
        PREFERRED_PTABLE_TYPE,
        &entry.name(),
        "disklabel",
        issues,
    )
}

/// Plans the partition sections of a RAID or bcache drive.
pub(super) fn plan_partitions(
    planner: &mut DevicesPlanner,
    entry: &DriveEntry,
    container: &str,
    existing: Option<&Device>,
    ptable_type: Option<sysdefs::partition_tables::PartitionTableType>,
    issues: &mut IssuesList,
) -> Vec<PlannedPartition> {
    entry
        .section
        .partitions
        .iter()
        .enumerate()
        .filter_map(|(i, section)| {
            let name = partition_section_name(entry.index, i);
            disk::plan_partition(planner, container, existing, section, &name, ptable_type, issues)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use devicegraph::{fixtures, DeviceGraph};
    use sysdefs::{filesystems::FilesystemType, partition_tables::PartitionTableType};

    use super::super::tests::{kinds, plan_profile};
    use super::*;

    fn graph() -> DeviceGraph {
        fixtures::from_yaml(indoc! {r#"
            disks:
              - name: /dev/sda
                size: 100 GiB
              - name: /dev/sdb
                size: 100 GiB
              - name: /dev/sdc
                size: 100 GiB
              - name: /dev/sdd
                size: 100 GiB
            mds:
              - name: /dev/md/old
                level: raid1
                members: [/dev/sdc, /dev/sdd]
                filesystem: ext4
        "#})
        .unwrap()
    }

    #[test]
    fn test_formatted_md() {
        let graph = graph();
        let (plan, issues) = plan_profile(
            &graph,
            indoc! {r#"
                partitioning:
                  - device: /dev/sda
                    partitions: [{ raid_name: /dev/md0, size: 50G }]
                  - device: /dev/sdb
                    partitions: [{ raid_name: /dev/md0, size: 50G }]
                  - device: /dev/md0
                    type: CT_MD
                    raid_options:
                      raid_type: raid0
                      chunk_size: 512K
                      parity_algorithm: wrong
                      device_order: [/dev/sdb1, /dev/sda1]
                    partitions:
                      - { mount: /srv, filesystem: xfs }
            "#},
        );
        assert_eq!(kinds(&issues), vec!["invalid-value"]);
        let md = plan.mds().next().unwrap();
        assert_eq!(md.name, "/dev/md0");
        assert_eq!(md.level(), MdLevel::Raid0);
        assert_eq!(md.chunk_size, Some(DiskSize::kib(512)));
        assert_eq!(md.parity, Some(MdParity::Default));
        assert_eq!(md.devices_order, vec!["/dev/sdb1", "/dev/sda1"]);
        assert_eq!(md.format.filesystem_type, Some(FilesystemType::Xfs));
        assert!(!md.is_partitioned());
    }

    #[test]
    fn test_partitioned_md() {
        let graph = graph();
        let (plan, issues) = plan_profile(
            &graph,
            indoc! {r#"
                partitioning:
                  - device: data
                    type: CT_RAID
                    disklabel: msdos
                    partitions:
                      - { mount: /data, size: 10G }
                      - { mount: /logs, size: max }
            "#},
        );
        // No member was planned for the new RAID.
        assert_eq!(kinds(&issues), vec!["missing-raid-members"]);
        let md = plan.mds().next().unwrap();
        assert_eq!(md.name, "/dev/md/data");
        assert_eq!(md.ptable_type, Some(PartitionTableType::Msdos));
        assert_eq!(md.partitions.len(), 2);
        assert_eq!(md.partitions[0].disk.as_deref(), Some("/dev/md/data"));
    }

    #[test]
    fn test_reused_md() {
        let graph = graph();
        let (plan, issues) = plan_profile(
            &graph,
            indoc! {r#"
                partitioning:
                  - device: /dev/md/old
                    type: CT_MD
                    partitions: [{ create: false, mount: /old }]
                  - device: /dev/md/nope
                    type: CT_MD
                    partitions: [{ create: false, mount: /nope }]
            "#},
        );
        assert_eq!(kinds(&issues), vec!["missing-reusable-device"]);
        let mds: Vec<_> = plan.mds().collect();
        assert_eq!(mds.len(), 1);
        assert_eq!(mds[0].reuse, Some(ReuseTarget::Name("/dev/md/old".into())));
        assert_eq!(mds[0].format.filesystem_type, Some(FilesystemType::Ext4));
    }
}
