use layoutplan_api::{
    issues::{Issue, IssuesList, NewValue},
    planned::{PlannedDevice, PlannedNfs},
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
        let section_name = partition_section_name(entry.index, i);
        let Some(share) = section.device.as_deref().or(entry.section.device.as_deref()) else {
            issues.push(Issue::MissingValue {
                section: section_name,
                attr: "device".into(),
            });
            continue;
        };
        let Some((server, path)) = share.split_once(':').filter(|(s, p)| !s.is_empty() && p.starts_with('/'))
        else {
            issues.push(Issue::InvalidValue {
                section: section_name,
                attr: "device".into(),
                value: share.to_owned(),
                new_value: NewValue::Skip,
            });
            continue;
        };
        let Some(mount_point) = section.mount.clone().filter(|m| !m.is_empty()) else {
            issues.push(Issue::MissingValue {
                section: section_name,
                attr: "mount".into(),
            });
            continue;
        };

        devices.push(PlannedDevice::Nfs(PlannedNfs {
            planned_id: planner.ids.next_id(),
            server: server.to_owned(),
            path: path.to_owned(),
            mount_point,
            fstab_options: section.fstab_options(),
            reuse: planner.graph.find_nfs(server, path).is_some(),
        }));
    }
    devices
}
