use log::debug;

use devicegraph::Device;
use layoutplan_api::{
    constants::PREFERRED_PTABLE_TYPE,
    issues::{Issue, IssuesList},
    planned::{PlannedDevice, PlannedDisk, PlannedPartition, PlannedSize, ReuseTarget},
    profile::PartitionSection,
};
use sysdefs::{
    partition_ids::PartitionId,
    partition_tables::{PartitionTableType, PartitionType},
};

use crate::drives_map::{partition_section_name, DriveEntry};

use super::{common, DevicesPlanner};

pub(super) fn plan(
    planner: &mut DevicesPlanner,
    entry: &DriveEntry,
    issues: &mut IssuesList,
) -> Vec<PlannedDevice> {
    let graph = planner.graph;
    let Some(disk) = entry.disk.as_deref().and_then(|name| graph.find_by_name(name)) else {
        return Vec::new();
    };
    let sections = &entry.section.partitions;

    if entry.section.wants_no_partition_table() {
        return plan_whole_disk(planner, entry, disk, issues);
    }
    if !sections.is_empty() && !disk.is_partitionable() {
        issues.push(Issue::NoPartitionable {
            section: entry.name(),
        });
        return Vec::new();
    }

    let ptable_type = entry.section.disklabel.as_deref().map(|label| {
        common::parse_or_default(
            Some(label),
            PREFERRED_PTABLE_TYPE,
            &entry.name(),
            "disklabel",
            issues,
        )
    });

    let mut partitions: Vec<PlannedPartition> = sections
        .iter()
        .enumerate()
        .filter_map(|(i, section)| {
            let name = partition_section_name(entry.index, i);
            plan_partition(planner, &disk.name, Some(disk), section, &name, ptable_type, issues)
        })
        .collect();
    mark_bootable(&mut partitions);

    debug!("Planned {} partition(s) on '{}'", partitions.len(), disk.name);
    partitions.into_iter().map(PlannedDevice::Partition).collect()
}

/// Plans a partition section to create on, or reuse from, the device named
/// `container`. Also used for the partitions of RAIDs and bcaches, which may
/// not exist yet.
pub(super) fn plan_partition(
    planner: &mut DevicesPlanner,
    container: &str,
    existing: Option<&Device>,
    section: &PartitionSection,
    section_name: &str,
    ptable_type: Option<PartitionTableType>,
    issues: &mut IssuesList,
) -> Option<PlannedPartition> {
    let mut partition = PlannedPartition::new(planner.ids.next_id());
    partition.disk = Some(container.to_owned());
    partition.ptable_type = ptable_type;
    partition.encryption = common::encryption(section);
    partition.member = common::membership(section);
    partition.partition_id = section.partition_id.map(PartitionId::from_code);
    partition.primary = common::parse_or_default(
        section.partition_type.as_deref(),
        PartitionType::Logical,
        section_name,
        "partition_type",
        issues,
    ) == PartitionType::Primary;

    if section.creates() {
        partition.format = common::formatting(section, section_name, None, issues);
        partition.size = common::size(&planner.sizes, section, section_name, issues)?;
        return Some(partition);
    }

    let graph = planner.graph;
    let Some(device) = existing else {
        issues.push(Issue::MissingReusableDevice {
            section: section_name.to_owned(),
        });
        return None;
    };
    let candidates = graph.partitions(device.sid);
    let by_number = section
        .partition_nr
        .map(|nr| move |d: &Device| d.as_partition().is_some_and(|p| p.number == nr));
    let reused = common::find_reusable(
        graph,
        &candidates,
        section,
        section_name,
        by_number.as_ref().map(|f| f as &dyn Fn(&Device) -> bool),
        issues,
    )?;

    let filesystem = common::existing_filesystem(graph, reused);
    partition.format = common::formatting(section, section_name, filesystem, issues);
    partition.reuse = Some(ReuseTarget::Name(reused.name.clone()));
    partition.resize = section.resize;
    partition.size = if section.resize {
        common::size(&planner.sizes, section, section_name, issues)?
    } else {
        PlannedSize::fixed(graph.size(reused.sid)?)
    };
    debug!("{section_name} reuses '{}'", reused.name);
    Some(partition)
}

/// Plans a disk used without partition table, from the first section.
fn plan_whole_disk(
    planner: &mut DevicesPlanner,
    entry: &DriveEntry,
    disk: &Device,
    issues: &mut IssuesList,
) -> Vec<PlannedDevice> {
    let sections = &entry.section.partitions;
    let Some(section) = sections.first() else {
        return Vec::new();
    };
    if sections.len() > 1 {
        issues.push(Issue::SurplusPartitions {
            section: entry.name(),
        });
    }

    let section_name = partition_section_name(entry.index, 0);
    let existing = common::existing_filesystem(planner.graph, disk);
    let mut planned = PlannedDisk::new(planner.ids.next_id(), disk.name.clone());
    planned.format = common::formatting(section, &section_name, existing, issues);
    planned.encryption = common::encryption(section);
    planned.member = common::membership(section);
    vec![PlannedDevice::Disk(planned)]
}

/// Requests the boot flag on the partition holding `/boot`, or `/` when
/// there is no separate `/boot`.
fn mark_bootable(partitions: &mut [PlannedPartition]) {
    let position = partitions
        .iter()
        .position(|p| p.mount_point() == Some("/boot"))
        .or_else(|| partitions.iter().position(|p| p.mount_point() == Some("/")));
    if let Some(position) = position {
        partitions[position].bootable = true;
    }
}
