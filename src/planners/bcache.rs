use log::debug;

use layoutplan_api::{
    issues::{Issue, IssuesList},
    planned::{PlannedBcache, PlannedDevice, PlannedPartition, ReuseTarget},
};
use sysdefs::levels::CacheMode;

use crate::drives_map::{partition_section_name, DriveEntry};

use super::{common, md, DevicesPlanner};

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

    let mut bcache = PlannedBcache::new(planner.ids.next_id(), name.clone());
    bcache.cache_mode = common::parse_or_default(
        entry
            .section
            .bcache_options
            .as_ref()
            .and_then(|o| o.cache_mode.as_deref()),
        CacheMode::default(),
        &entry.name(),
        "cache_mode",
        issues,
    );

    let graph = planner.graph;
    let existing = graph.find_bcache(&name);
    let sections = &entry.section.partitions;
    let formatted = matches!(sections.as_slice(), [single] if single.partition_nr.is_none());

    if formatted {
        let section = &sections[0];
        let section_name = partition_section_name(entry.index, 0);
        bcache.encryption = common::encryption(section);
        bcache.member = common::membership(section);
        if section.creates() {
            bcache.format = common::formatting(section, &section_name, None, issues);
        } else {
            let Some(reused) = existing else {
                issues.push(Issue::MissingReusableDevice {
                    section: section_name,
                });
                return Vec::new();
            };
            let filesystem = common::existing_filesystem(graph, reused);
            bcache.format = common::formatting(section, &section_name, filesystem, issues);
            bcache.reuse = Some(ReuseTarget::Name(reused.name.clone()));
        }
    } else {
        bcache.ptable_type = Some(md::ptable_type(entry, issues));
        bcache.partitions =
            md::plan_partitions(planner, entry, &name, existing, bcache.ptable_type, issues);
        if bcache.partitions.iter().any(PlannedPartition::is_reused) {
            if let Some(existing) = existing {
                bcache.reuse = Some(ReuseTarget::Name(existing.name.clone()));
            }
        }
    }

    debug!("Planned bcache '{}' ({})", bcache.name, bcache.cache_mode);
    vec![PlannedDevice::Bcache(bcache)]
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use devicegraph::{fixtures, DeviceGraph};
    use sysdefs::filesystems::FilesystemType;

    use super::super::tests::{kinds, plan_profile};
    use super::*;

    fn graph() -> DeviceGraph {
        fixtures::from_yaml(indoc! {r#"
            disks:
              - name: /dev/sda
                size: 500 GiB
              - name: /dev/nvme0n1
                size: 50 GiB
        "#})
        .unwrap()
    }

    #[test]
    fn test_plan_bcache() {
        let graph = graph();
        let (plan, issues) = plan_profile(
            &graph,
            indoc! {r#"
                partitioning:
                  - device: /dev/sda
                    partitions: [{ bcache_backing_for: /dev/bcache0 }]
                  - device: /dev/nvme0n1
                    partitions: [{ bcache_caching_for: /dev/bcache0 }]
                  - device: /dev/bcache0
                    type: CT_BCACHE
                    bcache_options: { cache_mode: writeback }
                    partitions: [{ mount: /data }]
                  - type: CT_BCACHE
                    bcache_options: { cache_mode: sometimes }
            "#},
        );
        assert_eq!(kinds(&issues), vec!["missing-value"]);
        let bcache = plan.bcaches().next().unwrap();
        assert_eq!(bcache.cache_mode, CacheMode::Writeback);
        assert_eq!(bcache.format.filesystem_type, Some(FilesystemType::Xfs));
        assert!(!bcache.is_partitioned());

        let backing = plan
            .partitions()
            .find(|p| p.member.bcache_backing_for.is_some())
            .unwrap();
        assert_eq!(backing.format.filesystem_type, None);
    }

    #[test]
    fn test_partitioned_bcache() {
        let graph = graph();
        let (plan, issues) = plan_profile(
            &graph,
            indoc! {r#"
                partitioning:
                  - device: /dev/bcache0
                    type: CT_BCACHE
                    bcache_options: { cache_mode: fast }
                    partitions:
                      - { mount: /, size: 40G }
                      - { mount: /home }
            "#},
        );
        assert_eq!(kinds(&issues), vec!["invalid-value"]);
        let bcache = plan.bcaches().next().unwrap();
        assert_eq!(bcache.cache_mode, CacheMode::default());
        assert_eq!(bcache.partitions.len(), 2);
    }
}
