use log::{debug, warn};

use devicegraph::{device::MountPoint, DeviceGraph, DeviceGraphError};
use layoutplan_api::{
    planned::{CanBeEncrypted, CanBeFormatted},
    Sid,
};
use sysdefs::filesystems::FilesystemType;

/// Applies the encryption, filesystem and mount point intent to `blk`.
/// Returns the filesystem, if any ends up on the device.
///
/// An existing filesystem is kept unless a reformat is requested. Keeping it
/// also keeps the encryption layer under it.
pub fn format_device(
    graph: &mut DeviceGraph,
    blk: Sid,
    format: &CanBeFormatted,
    encryption: &CanBeEncrypted,
) -> Result<Option<Sid>, DeviceGraphError> {
    let existing = graph.filesystem_of(blk).map(|fs| fs.sid);
    let filesystem = match existing {
        Some(fs) if !format.reformat => {
            if let Some(wanted) = format.filesystem_type {
                let current = graph.try_device(fs)?.as_filesystem().map(|f| f.fs_type);
                if current != Some(wanted) {
                    warn!(
                        "Keeping {} filesystem on '{}', {wanted} requested without reformat",
                        current.map(|t| t.to_string()).unwrap_or_default(),
                        graph.try_device(blk)?.name
                    );
                }
            }
            Some(fs)
        }
        _ => {
            let wanted = format
                .filesystem_type
                .or_else(|| format.is_swap().then_some(FilesystemType::Swap));
            let keep_encryption = !format.reformat
                && encryption.is_encrypted()
                && graph.encryption_of(blk).is_some();
            let content = if keep_encryption {
                graph.plain_device(blk)
            } else {
                if !graph.users(blk).is_empty() {
                    graph.remove_descendants(blk)?;
                }
                if encryption.is_encrypted() {
                    graph.create_encryption(blk, encryption.encryption_password.clone())?
                } else {
                    blk
                }
            };
            match wanted {
                Some(fs_type) => {
                    graph.remove_descendants(content)?;
                    let fs = graph.create_filesystem(content, fs_type)?;
                    let filesystem = graph.filesystem_mut(fs)?;
                    filesystem.label = format.label.clone();
                    filesystem.uuid = format.uuid.clone();
                    filesystem.mkfs_options = format.mkfs_options.clone();
                    Some(fs)
                }
                None => None,
            }
        }
    };

    match (filesystem, &format.mount_point) {
        (Some(fs), Some(path)) => {
            debug!("Mounting {} at '{path}'", graph.try_device(fs)?.name);
            graph.set_mount_point(
                fs,
                MountPoint {
                    path: path.clone(),
                    mount_by: format.mount_by.unwrap_or_default(),
                    options: format.fstab_options.clone(),
                },
            )?;
        }
        (None, Some(path)) => warn!("Nothing to mount at '{path}', no filesystem requested"),
        _ => {}
    }
    Ok(filesystem)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use devicegraph::fixtures;
    use sysdefs::mount_by::MountBy;

    use super::*;

    fn graph() -> DeviceGraph {
        fixtures::from_yaml(indoc! {r#"
            disks:
              - name: /dev/sda
                size: 20 GiB
                partition_table: gpt
                partitions:
                  - { size: 10 GiB, filesystem: ext4, label: old }
                  - { size: 5 GiB }
        "#})
        .unwrap()
    }

    #[test]
    fn test_new_filesystem() {
        let mut graph = graph();
        let sda2 = graph.find_by_name("/dev/sda2").unwrap().sid;
        let format = CanBeFormatted {
            filesystem_type: Some(FilesystemType::Xfs),
            mount_point: Some("/srv".into()),
            label: Some("srv".into()),
            fstab_options: vec!["noatime".into()],
            mount_by: Some(MountBy::Label),
            ..Default::default()
        };
        let encryption = CanBeEncrypted {
            encryption_password: Some("secret".into()),
        };

        let fs = format_device(&mut graph, sda2, &format, &encryption).unwrap().unwrap();
        assert!(graph.encryption_of(sda2).is_some());
        assert_eq!(graph.filesystem_of(sda2).unwrap().sid, fs);
        let device = graph.device(fs).unwrap();
        let filesystem = device.as_filesystem().unwrap();
        assert_eq!(filesystem.fs_type, FilesystemType::Xfs);
        assert_eq!(filesystem.label.as_deref(), Some("srv"));
        let mount_point = device.mount_point().unwrap();
        assert_eq!(mount_point.path, "/srv");
        assert_eq!(mount_point.mount_by, MountBy::Label);
        assert_eq!(mount_point.options, vec!["noatime".to_owned()]);
    }

    #[test]
    fn test_keep_or_reformat() {
        let mut graph = graph();
        let sda1 = graph.find_by_name("/dev/sda1").unwrap().sid;
        let old = graph.filesystem_of(sda1).unwrap().sid;
        let mut format = CanBeFormatted {
            filesystem_type: Some(FilesystemType::Btrfs),
            mount_point: Some("/home".into()),
            ..Default::default()
        };

        let kept = format_device(&mut graph, sda1, &format, &CanBeEncrypted::default()).unwrap();
        assert_eq!(kept, Some(old));
        assert_eq!(graph.device(old).unwrap().mount_point().unwrap().path, "/home");

        format.reformat = true;
        let new = format_device(&mut graph, sda1, &format, &CanBeEncrypted::default())
            .unwrap()
            .unwrap();
        assert_ne!(new, old);
        assert!(!graph.contains(old));
        assert_eq!(
            graph.device(new).unwrap().as_filesystem().unwrap().fs_type,
            FilesystemType::Btrfs
        );
    }

    #[test]
    fn test_swap_without_type() {
        let mut graph = graph();
        let sda2 = graph.find_by_name("/dev/sda2").unwrap().sid;
        let format = CanBeFormatted {
            mount_point: Some("swap".into()),
            ..Default::default()
        };
        let fs = format_device(&mut graph, sda2, &format, &CanBeEncrypted::default())
            .unwrap()
            .unwrap();
        assert_eq!(
            graph.device(fs).unwrap().as_filesystem().unwrap().fs_type,
            FilesystemType::Swap
        );
    }
}
