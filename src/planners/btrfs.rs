use layoutplan_api::{
    issues::{Issue, IssuesList, NewValue},
    planned::{PlannedBtrfs, PlannedDevice},
};
use sysdefs::{filesystems::FilesystemType, levels::BtrfsRaidLevel};

use crate::drives_map::{partition_section_name, DriveEntry};

use super::{common, DevicesPlanner};

pub(super) fn plan(
    planner: &mut DevicesPlanner,
    entry: &DriveEntry,
    issues: &mut IssuesList,
) -> Vec<PlannedDevice> {
    let Some(name) = entry.section.device.clone().filter(|n| !n.is_empty()) else {
        issues.push(Issue::MissingValue {
            section: entry.name(),
            attr: "device".into(),
        });
        return Vec::new();
    };

    let mut btrfs = PlannedBtrfs::new(planner.ids.next_id(), name);
    let options = entry.section.btrfs_options.clone().unwrap_or_default();
    let level = |value: Option<&str>, attr: &str, issues: &mut IssuesList| {
        value.map(|v| common::parse_or_default(Some(v), BtrfsRaidLevel::Default, &entry.name(), attr, issues))
    };
    btrfs.data_raid_level = level(options.data_raid_level.as_deref(), "data_raid_level", issues);
    btrfs.metadata_raid_level =
        level(options.metadata_raid_level.as_deref(), "metadata_raid_level", issues);

    let sections = &entry.section.partitions;
    if sections.len() > 1 {
        issues.push(Issue::SurplusPartitions {
            section: entry.name(),
        });
    }
    if let Some(section) = sections.first() {
        let section_name = partition_section_name(entry.index, 0);
        btrfs.format = common::formatting(section, &section_name, None, issues);
        if let Some(requested) = section.filesystem.as_deref() {
            if btrfs.format.filesystem_type != Some(FilesystemType::Btrfs) {
                issues.push(Issue::InvalidValue {
                    section: section_name,
                    attr: "filesystem".into(),
                    value: requested.to_owned(),
                    new_value: NewValue::Replaced(FilesystemType::Btrfs.to_string()),
                });
            }
        }
    }
    btrfs.format.filesystem_type = Some(FilesystemType::Btrfs);

    vec![PlannedDevice::Btrfs(btrfs)]
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use devicegraph::fixtures;

    use super::super::tests::{kinds, plan_profile};
    use super::*;

    #[test]
    fn test_plan_btrfs() {
        let graph = fixtures::from_yaml(indoc! {r#"
            disks:
              - { name: /dev/sda, size: 50 GiB }
              - { name: /dev/sdb, size: 50 GiB }
        "#})
        .unwrap();
        let (plan, issues) = plan_profile(
            &graph,
            indoc! {r#"
                partitioning:
                  - device: /dev/sda
                    disklabel: none
                    partitions: [{ btrfs_name: root_fs }]
                  - device: /dev/sdb
                    partitions: [{ btrfs_name: root_fs, size: 20G }]
                  - device: root_fs
                    type: CT_BTRFS
                    btrfs_options: { data_raid_level: raid1, metadata_raid_level: mirror }
                    partitions:
                      - { mount: /, filesystem: xfs }
                      - { mount: /home }
            "#},
        );
        assert_eq!(
            kinds(&issues),
            vec!["invalid-value", "surplus-partitions", "invalid-value"]
        );
        let btrfs = plan.btrfses().next().unwrap();
        assert_eq!(btrfs.name, "root_fs");
        assert_eq!(btrfs.data_raid_level, Some(BtrfsRaidLevel::Raid1));
        assert_eq!(btrfs.metadata_raid_level, Some(BtrfsRaidLevel::Default));
        assert_eq!(btrfs.format.mount_point.as_deref(), Some("/"));
        assert_eq!(btrfs.format.filesystem_type, Some(FilesystemType::Btrfs));

        let disk = plan.disks().next().unwrap();
        assert_eq!(disk.member.btrfs_name.as_deref(), Some("root_fs"));
        assert_eq!(disk.format.filesystem_type, None);
    }
}
