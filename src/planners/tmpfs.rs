use layoutplan_api::{
    issues::{Issue, IssuesList},
    planned::{PlannedDevice, PlannedTmpfs},
};

use crate::drives_map::{partition_section_name, DriveEntry};

use super::DevicesPlanner;

pub(super) fn plan(
    planner: &mut DevicesPlanner,
    entry: &DriveEntry,
    issues: &mut IssuesList,
) -> Vec<PlannedDevice> {
    let mut devices = Vec::new();
    for (i, section) in entry.section.partitions.iter().enumerate() {
        let Some(mount_point) = section.mount.clone().filter(|m| !m.is_empty()) else {
            issues.push(Issue::MissingValue {
                section: partition_section_name(entry.index, i),
                attr: "mount".into(),
            });
            continue;
        };
        devices.push(PlannedDevice::Tmpfs(PlannedTmpfs {
            planned_id: planner.ids.next_id(),
            mount_point,
            fstab_options: section.fstab_options(),
        }));
    }
    devices
}
