//! Assigns the drive sections of a profile to the disks of the system.

use log::{debug, warn};

use devicegraph::{Device, DeviceGraph};
use layoutplan_api::{
    issues::{Issue, IssuesList},
    profile::{DriveSection, DriveType, SkipRule},
    DiskSize,
};

/// Path of a drive section, used to report issues.
pub fn drive_section_name(index: usize) -> String {
    format!("partitioning[{index}]")
}

/// Path of a partition section inside a drive section.
pub fn partition_section_name(drive: usize, partition: usize) -> String {
    format!("partitioning[{drive}].partitions[{partition}]")
}

/// Drive section together with its position in the profile.
#[derive(Debug, Clone)]
pub struct DriveEntry {
    pub index: usize,
    pub drive_type: DriveType,
    pub section: DriveSection,

    /// Kernel name of the disk, for disk drives.
    pub disk: Option<String>,
}

impl DriveEntry {
    pub fn name(&self) -> String {
        drive_section_name(self.index)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DrivesMap {
    entries: Vec<DriveEntry>,
}

impl DrivesMap {
    /// Resolves the disk of every disk drive. Drives naming a device go
    /// first; the rest take the first free disk not excluded by their skip
    /// list, in name order.
    pub fn new(graph: &DeviceGraph, drives: &[DriveSection], issues: &mut IssuesList) -> Self {
        let mut entries = Vec::new();
        for (index, section) in drives.iter().enumerate() {
            match section.drive_type() {
                Ok(drive_type) => entries.push(DriveEntry {
                    index,
                    drive_type,
                    section: section.clone(),
                    disk: None,
                }),
                Err(drive_type) => issues.push(Issue::UnsupportedDriveType {
                    section: drive_section_name(index),
                    drive_type,
                }),
            }
        }

        let mut taken: Vec<String> = Vec::new();
        for entry in entries.iter_mut().filter(|e| e.drive_type == DriveType::Disk) {
            let Some(device) = entry.section.device.as_deref() else {
                continue;
            };
            match graph.find_by_name(device).filter(|d| d.as_disk().is_some()) {
                Some(disk) if !taken.contains(&disk.name) => {
                    debug!("Drive {} uses disk '{}'", entry.name(), disk.name);
                    taken.push(disk.name.clone());
                    entry.disk = Some(disk.name.clone());
                }
                _ => {}
            }
        }

        for entry in entries.iter_mut().filter(|e| e.drive_type == DriveType::Disk) {
            if entry.disk.is_some() || entry.section.device.is_some() {
                continue;
            }
            let candidate = graph.disks().into_iter().find(|disk| {
                !taken.contains(&disk.name)
                    && !entry
                        .section
                        .skip_list
                        .iter()
                        .any(|rule| skip_rule_matches(rule, disk))
            });
            if let Some(disk) = candidate {
                debug!("Drive {} takes disk '{}'", entry.name(), disk.name);
                taken.push(disk.name.clone());
                entry.disk = Some(disk.name.clone());
            }
        }

        entries.retain(|entry| {
            let unresolved = entry.drive_type == DriveType::Disk && entry.disk.is_none();
            if unresolved {
                issues.push(Issue::NoDisk {
                    section: entry.name(),
                });
            }
            !unresolved
        });

        Self { entries }
    }

    pub fn entries(&self) -> &[DriveEntry] {
        &self.entries
    }

    pub fn of_type(&self, drive_type: DriveType) -> impl Iterator<Item = &DriveEntry> {
        self.entries.iter().filter(move |e| e.drive_type == drive_type)
    }

    /// Kernel names of the disks drives were assigned to.
    pub fn disk_names(&self) -> Vec<String> {
        self.entries.iter().filter_map(|e| e.disk.clone()).collect()
    }
}

fn skip_rule_matches(rule: &SkipRule, disk: &Device) -> bool {
    let size = disk.as_disk().map(|d| d.size).unwrap_or(DiskSize::ZERO);
    let values: Vec<String> = match rule.skip_key.as_str() {
        "name" => vec![disk.name.trim_start_matches("/dev/").to_owned()],
        "device" => vec![disk.name.clone()],
        "udev_id" => disk
            .as_disk()
            .map(|d| {
                d.udev_ids
                    .iter()
                    .map(|id| id.rsplit('/').next().unwrap_or(id).to_owned())
                    .collect()
            })
            .unwrap_or_default(),
        "size_k" => vec![(size.bytes() / 1024).to_string()],
        other => {
            warn!("Ignoring skip rule with unknown key '{other}'");
            return false;
        }
    };

    values.iter().any(|value| {
        if rule.skip_if_less_than || rule.skip_if_more_than {
            let (Ok(value), Ok(limit)) = (value.parse::<u64>(), rule.skip_value.parse::<u64>()) else {
                return false;
            };
            (rule.skip_if_less_than && value < limit) || (rule.skip_if_more_than && value > limit)
        } else {
            *value == rule.skip_value
        }
    })
}
