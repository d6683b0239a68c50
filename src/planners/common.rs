//! Helpers shared by the device planners: formatting, encryption,
//! membership, sizes and lookup of devices to reuse.

use std::str::FromStr;

use sysdefs::{filesystems::FilesystemType, mount_by::MountBy};

use devicegraph::{Device, DeviceGraph};
use layoutplan_api::{
    constants::{ESP_MOUNT_POINT, SWAP_MOUNT_POINT},
    issues::{Issue, IssuesList, NewValue},
    planned::{CanBeEncrypted, CanBeFormatted, CanBeMember, PlannedSize},
    profile::PartitionSection,
    DiskSize,
};

use crate::size_parser::SizeParser;

/// Filesystem used when a section asks for formatting without naming one.
pub fn default_filesystem(mount_point: Option<&str>) -> FilesystemType {
    match mount_point {
        Some(SWAP_MOUNT_POINT) => FilesystemType::Swap,
        Some(ESP_MOUNT_POINT) => FilesystemType::Vfat,
        Some("/") => FilesystemType::Btrfs,
        _ => FilesystemType::Xfs,
    }
}

/// Parses an enumerated value, replacing it with `default` and reporting
/// an issue when it is not valid.
pub fn parse_or_default<T: FromStr + ToString + Copy>(
    value: Option<&str>,
    default: T,
    section: &str,
    attr: &str,
    issues: &mut IssuesList,
) -> T {
    let Some(value) = value else {
        return default;
    };
    T::from_str(value).unwrap_or_else(|_| {
        issues.push(Issue::InvalidValue {
            section: section.to_owned(),
            attr: attr.to_owned(),
            value: value.to_owned(),
            new_value: NewValue::Replaced(default.to_string()),
        });
        default
    })
}

/// Filesystem intent of a section. `existing` is the filesystem of a reused
/// device, kept when the section neither formats nor names another one.
pub fn formatting(
    section: &PartitionSection,
    section_name: &str,
    existing: Option<FilesystemType>,
    issues: &mut IssuesList,
) -> CanBeFormatted {
    let mount_point = section.mount.clone().filter(|m| !m.is_empty());
    let reusing = !section.creates();
    let format = section.format.unwrap_or(!reusing);

    let requested = section.filesystem.as_deref().map(|fs| {
        parse_or_default(
            Some(fs),
            default_filesystem(mount_point.as_deref()),
            section_name,
            "filesystem",
            issues,
        )
    });
    let filesystem_type = match (format, requested) {
        _ if membership(section).is_member() => None,
        (true, Some(fs)) => Some(fs),
        (true, None) => Some(default_filesystem(mount_point.as_deref())),
        (false, _) => existing,
    };

    CanBeFormatted {
        filesystem_type,
        mount_point,
        label: section.label.clone(),
        uuid: section.uuid.clone(),
        fstab_options: section.fstab_options(),
        mkfs_options: section.mkfs_options.clone(),
        mount_by: section.mountby.as_deref().map(|m| {
            parse_or_default(Some(m), MountBy::default(), section_name, "mountby", issues)
        }),
        reformat: reusing && format,
    }
}

pub fn encryption(section: &PartitionSection) -> CanBeEncrypted {
    CanBeEncrypted {
        encryption_password: section.crypt_key.clone().filter(|k| !k.is_empty()),
    }
}

pub fn membership(section: &PartitionSection) -> CanBeMember {
    CanBeMember {
        lvm_volume_group_name: section.lvm_group.clone(),
        raid_name: section.raid_name.as_deref().map(super::md::md_device_name),
        bcache_backing_for: section.bcache_backing_for.clone(),
        bcache_caching_for: section.bcache_caching_for.clone(),
        btrfs_name: section.btrfs_name.clone(),
    }
}

/// Size of a section, or `None` (with an issue) when it cannot be parsed
/// and the section must be skipped.
pub fn size(
    parser: &SizeParser,
    section: &PartitionSection,
    section_name: &str,
    issues: &mut IssuesList,
) -> Option<PlannedSize> {
    match parser.parse(
        section.size.as_deref(),
        section.mount.as_deref(),
        DiskSize::b(1),
        DiskSize::UNLIMITED,
    ) {
        Ok(size) => Some(size),
        Err(e) => {
            log::debug!("Invalid size in {section_name}: {e}");
            issues.push(Issue::invalid_size(
                section_name,
                section.size.clone().unwrap_or_default(),
            ));
            None
        }
    }
}

/// Locates the device a section reuses among `candidates`: by the explicit
/// `key` (partition number, volume name...), then by label, then by UUID.
/// Reports an issue and returns `None` when it cannot be found.
pub fn find_reusable<'g>(
    graph: &'g DeviceGraph,
    candidates: &[&'g Device],
    section: &PartitionSection,
    section_name: &str,
    key: Option<&dyn Fn(&Device) -> bool>,
    issues: &mut IssuesList,
) -> Option<&'g Device> {
    let filesystem = |d: &Device| graph.filesystem_of(d.sid).and_then(Device::as_filesystem);
    let found = if let Some(key) = key {
        candidates.iter().find(|d| key(d))
    } else if let Some(label) = &section.label {
        candidates
            .iter()
            .find(|d| filesystem(d).is_some_and(|fs| fs.label.as_ref() == Some(label)))
    } else if let Some(uuid) = &section.uuid {
        candidates
            .iter()
            .find(|d| filesystem(d).is_some_and(|fs| fs.uuid.as_ref() == Some(uuid)))
    } else {
        issues.push(Issue::MissingReuseInfo {
            section: section_name.to_owned(),
        });
        return None;
    };

    let Some(device) = found.copied() else {
        issues.push(Issue::MissingReusableDevice {
            section: section_name.to_owned(),
        });
        return None;
    };

    let needs_filesystem = section.mount.is_some() && !section.format.unwrap_or(false);
    if needs_filesystem && graph.filesystem_of(device.sid).is_none() {
        issues.push(Issue::MissingReusableFilesystem {
            section: section_name.to_owned(),
        });
        return None;
    }
    Some(device)
}

/// Filesystem type currently on a block device.
pub fn existing_filesystem(graph: &DeviceGraph, device: &Device) -> Option<FilesystemType> {
    graph
        .filesystem_of(device.sid)
        .and_then(|fs| fs.as_filesystem())
        .map(|fs| fs.fs_type)
}
