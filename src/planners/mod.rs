//! Device planners: turn the drive sections of a profile into planned
//! devices, one planner per device family.

use log::{debug, info};

use devicegraph::DeviceGraph;
use layoutplan_api::{
    issues::{Issue, IssuesList},
    planned::{DevicesPlan, PlannedDevice},
    profile::{DiskUse, DriveType},
    settings::SpaceAction,
    volumes::VolumeSpecs,
    PlannedIdGenerator,
};
use sysdefs::partition_ids::PartitionId;

use crate::{
    drives_map::{DriveEntry, DrivesMap},
    size_parser::SizeParser,
};

mod bcache;
mod btrfs;
mod common;
mod disk;
mod lvm;
mod md;
mod nfs;
mod tmpfs;

pub use common::default_filesystem;

pub struct DevicesPlanner<'a> {
    graph: &'a DeviceGraph,
    sizes: SizeParser<'a>,
    ids: PlannedIdGenerator,
}

impl<'a> DevicesPlanner<'a> {
    pub fn new(graph: &'a DeviceGraph, volumes: &'a VolumeSpecs) -> Self {
        Self {
            graph,
            sizes: SizeParser::new(volumes),
            ids: PlannedIdGenerator::starting_at(1),
        }
    }

    /// Plans the devices of every drive of the map, in profile order.
    #[tracing::instrument(name = "plan_devices", skip_all)]
    pub fn plan(&mut self, drives: &DrivesMap, issues: &mut IssuesList) -> DevicesPlan {
        let mut plan = DevicesPlan::default();
        for entry in drives.entries() {
            debug!("Planning devices for {} ({})", entry.name(), entry.drive_type);
            let devices = match entry.drive_type {
                DriveType::Disk => disk::plan(self, entry, issues),
                DriveType::Lvm => lvm::plan(self, entry, issues),
                DriveType::Md => md::plan(self, entry, issues),
                DriveType::Bcache => bcache::plan(self, entry, issues),
                DriveType::Btrfs => btrfs::plan(self, entry, issues),
                DriveType::Nfs => nfs::plan(self, entry, issues),
                DriveType::Tmpfs => tmpfs::plan(self, entry, issues),
            };
            plan.extend(devices);
        }
        check_raid_members(&plan, issues);
        info!("Planned {} device(s)", plan.len());
        plan
    }
}

/// Every planned RAID needs at least as many members as its level requires.
fn check_raid_members(plan: &DevicesPlan, issues: &mut IssuesList) {
    let all = plan.all_devices();
    for md in plan.mds().filter(|md| !md.is_reused()) {
        let members = all
            .iter()
            .filter(|device| member_raid_name(device) == Some(md.name.as_str()))
            .count();
        if members < md.level().min_devices() {
            issues.push(Issue::MissingRaidMembers {
                name: md.name.clone(),
            });
        }
    }
}

fn member_raid_name(device: &PlannedDevice) -> Option<&str> {
    match device {
        PlannedDevice::Disk(d) => d.member.raid_name.as_deref(),
        PlannedDevice::Partition(p) => p.member.raid_name.as_deref(),
        _ => None,
    }
}

/// Mandatory deletions requested by the `use` and `initialize` attributes of
/// the disk drives.
pub fn drive_space_actions(graph: &DeviceGraph, drives: &DrivesMap) -> Vec<SpaceAction> {
    let mut actions = Vec::new();
    for entry in drives.of_type(DriveType::Disk) {
        let Some(disk) = entry.disk.as_deref().and_then(|name| graph.find_by_name(name)) else {
            continue;
        };
        if entry.section.initialize {
            actions.push(SpaceAction::Delete {
                device: disk.name.clone(),
                mandatory: true,
            });
            continue;
        }

        let disk_use = match entry.section.disk_use() {
            None | Some(Err(_)) => continue,
            Some(Ok(disk_use)) => disk_use,
        };
        for partition in graph.partitions(disk.sid) {
            let Some(info) = partition.as_partition() else {
                continue;
            };
            let delete = match &disk_use {
                DiskUse::All => true,
                DiskUse::Linux => matches!(
                    info.id,
                    PartitionId::Linux | PartitionId::Swap | PartitionId::Lvm | PartitionId::Raid
                ),
                DiskUse::Free => false,
                DiskUse::Numbers(numbers) => numbers.contains(&info.number),
            };
            if delete {
                actions.push(SpaceAction::Delete {
                    device: partition.name.clone(),
                    mandatory: true,
                });
            }
        }
    }
    actions
}

/// Reports an invalid `use` value once per drive.
pub fn check_disk_use(drives: &DrivesMap, issues: &mut IssuesList) {
    for entry in drives.of_type(DriveType::Disk) {
        if let Some(Err(value)) = entry.section.disk_use() {
            issues.push(Issue::InvalidValue {
                section: entry.name(),
                attr: "use".into(),
                value,
                new_value: layoutplan_api::issues::NewValue::Replaced("free".into()),
            });
        }
    }
}

/// Name of a drive's device without the `/dev/` prefix, e.g. the volume
/// group name of an LVM drive.
fn short_device_name(entry: &DriveEntry) -> Option<String> {
    entry
        .section
        .device
        .as_deref()
        .map(|d| d.trim_start_matches("/dev/").to_owned())
        .filter(|d| !d.is_empty())
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use devicegraph::fixtures;
    use layoutplan_api::profile::PartitioningProfile;

    use super::*;

    pub(crate) fn plan_profile(graph: &DeviceGraph, yaml: &str) -> (DevicesPlan, IssuesList) {
        let profile: PartitioningProfile = serde_yaml::from_str(yaml).unwrap();
        let mut issues = IssuesList::new();
        let drives = DrivesMap::new(graph, &profile.partitioning, &mut issues);
        let volumes = VolumeSpecs::default();
        let plan = DevicesPlanner::new(graph, &volumes).plan(&drives, &mut issues);
        (plan, issues)
    }

    pub(crate) fn kinds(issues: &IssuesList) -> Vec<&'static str> {
        issues.iter().map(<&str>::from).collect()
    }

    fn graph() -> DeviceGraph {
        fixtures::from_yaml(indoc! {r#"
            disks:
              - name: /dev/sda
                size: 100 GiB
                partition_table: msdos
                partitions:
                  - { size: 10 GiB, id: ntfs, filesystem: ntfs }
                  - { size: 20 GiB, id: linux, filesystem: ext4 }
                  - { size: 2 GiB, id: swap, filesystem: swap }
              - name: /dev/sdb
                size: 100 GiB
        "#})
        .unwrap()
    }

    #[test]
    fn test_missing_raid_members() {
        let graph = graph();
        let (plan, issues) = plan_profile(
            &graph,
            indoc! {r#"
                partitioning:
                  - device: /dev/sdb
                    partitions:
                      - { raid_name: /dev/md0, size: 10G }
                  - device: /dev/md0
                    type: CT_MD
                    raid_options: { raid_type: raid5 }
                    partitions:
                      - { mount: /srv }
            "#},
        );
        assert_eq!(plan.mds().count(), 1);
        assert_eq!(kinds(&issues), vec!["missing-raid-members"]);
        assert!(issues.has_fatal());
    }

    #[test]
    fn test_drive_space_actions() {
        let graph = graph();
        let drives_for = |yaml: &str| {
            let profile: PartitioningProfile = serde_yaml::from_str(yaml).unwrap();
            DrivesMap::new(&graph, &profile.partitioning, &mut IssuesList::new())
        };
        let devices = |actions: Vec<SpaceAction>| -> Vec<String> {
            assert!(actions.iter().all(SpaceAction::is_mandatory_delete));
            actions.iter().map(|a| a.device().to_owned()).collect()
        };

        let drives = drives_for("partitioning: [{ device: /dev/sda, use: linux }]");
        assert_eq!(devices(drive_space_actions(&graph, &drives)), vec!["/dev/sda2", "/dev/sda3"]);

        let drives = drives_for("partitioning: [{ device: /dev/sda, use: all }]");
        assert_eq!(drive_space_actions(&graph, &drives).len(), 3);

        let drives = drives_for("partitioning: [{ device: /dev/sda, use: '1,3' }]");
        assert_eq!(devices(drive_space_actions(&graph, &drives)), vec!["/dev/sda1", "/dev/sda3"]);

        let drives = drives_for("partitioning: [{ device: /dev/sda, use: free }]");
        assert!(drive_space_actions(&graph, &drives).is_empty());

        let drives = drives_for("partitioning: [{ device: /dev/sda, initialize: true }]");
        assert_eq!(devices(drive_space_actions(&graph, &drives)), vec!["/dev/sda"]);

        let drives = drives_for("partitioning: [{ device: /dev/sda, use: some }]");
        assert!(drive_space_actions(&graph, &drives).is_empty());
        let mut issues = IssuesList::new();
        check_disk_use(&drives, &mut issues);
        assert_eq!(kinds(&issues), vec!["invalid-value"]);
    }
}
