//! Loads device graphs from YAML descriptions. Used by tests and by the
//! command line harness.
//!
//! ```yaml
//! disks:
//!   - name: /dev/sda
//!     size: 50 GiB
//!     partition_table: msdos
//!     partitions:
//!       - size: 20 GiB
//!         id: ntfs
//!         filesystem: ntfs
//!         resize: { min_size: 5 GiB }
//!       - size: 2 GiB
//!         id: swap
//!         filesystem: swap
//! volume_groups:
//!   - name: system
//!     pvs: [/dev/sdb1]
//!     lvs:
//!       - { name: root, size: 10 GiB, filesystem: btrfs }
//! ```

use std::path::Path;

use anyhow::{Context, Error};
use log::debug;
use serde::Deserialize;
use sysdefs::{
    filesystems::FilesystemType,
    levels::{BtrfsRaidLevel, MdLevel},
    partition_ids::PartitionId,
    partition_tables::{PartitionTableType, PartitionType},
};

use layoutplan_api::{constants::DEFAULT_EXTENT_SIZE, DiskSize, Sid};

use crate::{
    device::{Disk, DeviceKind, Filesystem, LvKind, MountPoint, ResizeInfo},
    error::DeviceGraphError,
    graph::DeviceGraph,
    region::Region,
};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphFixture {
    #[serde(default)]
    pub disks: Vec<DiskFixture>,

    #[serde(default)]
    pub mds: Vec<MdFixture>,

    #[serde(default)]
    pub volume_groups: Vec<VgFixture>,

    #[serde(default)]
    pub btrfs: Vec<BtrfsFixture>,
}

#[derive(Debug, Deserialize)]
pub struct DiskFixture {
    pub name: String,
    pub size: DiskSize,

    #[serde(default)]
    pub udev_ids: Vec<String>,

    #[serde(default = "default_true")]
    pub partitionable: bool,

    #[serde(default)]
    pub partition_table: Option<PartitionTableType>,

    #[serde(default)]
    pub partitions: Vec<PartitionFixture>,

    /// Content of a disk without partition table.
    #[serde(default, flatten)]
    pub content: ContentFixture,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct PartitionFixture {
    /// Defaults to the first aligned byte after the previous partition.
    #[serde(default)]
    pub start: Option<DiskSize>,

    pub size: DiskSize,

    #[serde(default, rename = "type")]
    pub partition_type: Option<PartitionType>,

    #[serde(default)]
    pub id: Option<PartitionId>,

    #[serde(default)]
    pub boot: bool,

    /// Makes the partition resizable within the given limits.
    #[serde(default)]
    pub resize: Option<ResizeFixture>,

    #[serde(default, flatten)]
    pub content: ContentFixture,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResizeFixture {
    #[serde(default)]
    pub min_size: Option<DiskSize>,

    #[serde(default)]
    pub max_size: Option<DiskSize>,
}

/// What is on a block device.
#[derive(Debug, Default, Deserialize)]
pub struct ContentFixture {
    #[serde(default)]
    pub encrypted: bool,

    #[serde(default)]
    pub filesystem: Option<FilesystemType>,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub uuid: Option<String>,

    #[serde(default)]
    pub mount_point: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MdFixture {
    pub name: String,
    pub level: MdLevel,
    pub members: Vec<String>,

    #[serde(default, flatten)]
    pub content: ContentFixture,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VgFixture {
    pub name: String,

    #[serde(default = "default_extent")]
    pub extent_size: DiskSize,

    pub pvs: Vec<String>,

    #[serde(default)]
    pub lvs: Vec<LvFixture>,
}

fn default_extent() -> DiskSize {
    DEFAULT_EXTENT_SIZE
}

#[derive(Debug, Deserialize)]
pub struct LvFixture {
    pub name: String,
    pub size: DiskSize,

    #[serde(default)]
    pub thin_pool: bool,

    /// Name of the pool of a thin volume.
    #[serde(default)]
    pub pool: Option<String>,

    #[serde(default, flatten)]
    pub content: ContentFixture,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BtrfsFixture {
    pub members: Vec<String>,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub mount_point: Option<String>,

    #[serde(default)]
    pub data_raid_level: Option<BtrfsRaidLevel>,

    #[serde(default)]
    pub metadata_raid_level: Option<BtrfsRaidLevel>,
}

/// Parses a YAML fixture and builds the device graph it describes.
pub fn from_yaml(yaml: &str) -> Result<DeviceGraph, Error> {
    let fixture: GraphFixture = serde_yaml::from_str(yaml).context("Failed to parse device graph fixture")?;
    fixture.build()
}

pub fn load(path: impl AsRef<Path>) -> Result<DeviceGraph, Error> {
    let path = path.as_ref();
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read device graph from '{}'", path.display()))?;
    from_yaml(&yaml).with_context(|| format!("Failed to load device graph from '{}'", path.display()))
}

impl GraphFixture {
    pub fn build(&self) -> Result<DeviceGraph, Error> {
        let mut graph = DeviceGraph::new();
        for disk in &self.disks {
            build_disk(&mut graph, disk).with_context(|| format!("Invalid disk '{}'", disk.name))?;
        }
        for md in &self.mds {
            let members = resolve(&graph, &md.members)?;
            let sid = graph.create_md(&md.name, md.level, &members, None, None)?;
            add_content(&mut graph, sid, &md.content)?;
        }
        for vg in &self.volume_groups {
            build_vg(&mut graph, vg).with_context(|| format!("Invalid volume group '{}'", vg.name))?;
        }
        for btrfs in &self.btrfs {
            let members = resolve(&graph, &btrfs.members)?;
            let mut filesystem = Filesystem::new(FilesystemType::Btrfs);
            filesystem.label = btrfs.label.clone();
            filesystem.mount_point = btrfs.mount_point.as_deref().map(MountPoint::new);
            filesystem.data_raid_level = btrfs.data_raid_level;
            filesystem.metadata_raid_level = btrfs.metadata_raid_level;
            graph.create_multidevice_filesystem(&members, filesystem)?;
        }
        debug!("Loaded device graph with {} devices", graph.len());
        Ok(graph)
    }
}

fn resolve(graph: &DeviceGraph, names: &[String]) -> Result<Vec<Sid>, DeviceGraphError> {
    names
        .iter()
        .map(|name| {
            graph
                .find_by_name(name)
                .map(|d| d.sid)
                .ok_or_else(|| DeviceGraphError::InvalidFixture(format!("unknown device '{name}'")))
        })
        .collect()
}

fn build_disk(graph: &mut DeviceGraph, fixture: &DiskFixture) -> Result<(), Error> {
    let disk = graph.add_device(
        &fixture.name,
        DeviceKind::Disk(Disk {
            size: fixture.size,
            udev_ids: fixture.udev_ids.clone(),
            partitionable: fixture.partitionable,
        }),
    );
    let Some(table_type) = fixture.partition_table else {
        if !fixture.partitions.is_empty() {
            return Err(DeviceGraphError::InvalidFixture("partitions without a partition table".into()).into());
        }
        return add_content(graph, disk, &fixture.content).map_err(Error::from);
    };
    graph.create_partition_table(disk, table_type)?;
    let grain = graph.grain(disk);

    let mut next_start = graph.usable_region(disk)?.start.ceil(grain);
    let mut next_logical = None;
    for partition in &fixture.partitions {
        let partition_type = partition.partition_type.unwrap_or(PartitionType::Primary);
        let start = match (partition.start, partition_type) {
            (Some(start), _) => start,
            // Every logical partition is preceded by its EBR.
            (None, PartitionType::Logical) => next_logical.unwrap_or(next_start) + grain,
            (None, _) => next_start,
        };
        let region = Region::new(start, partition.size);
        let sid = graph.create_partition(disk, region, partition_type)?;
        match partition_type {
            PartitionType::Extended => next_logical = Some(start),
            PartitionType::Logical => next_logical = Some(region.end().ceil(grain)),
            PartitionType::Primary => {}
        }
        if partition_type != PartitionType::Logical {
            next_start = region.end().ceil(grain);
        }
        if let Some(id) = partition.id {
            graph.set_partition_id(sid, id)?;
        }
        graph.set_boot_flag(sid, partition.boot)?;
        let info = match &partition.resize {
            Some(resize) => ResizeInfo {
                resize_ok: true,
                min_size: resize.min_size.unwrap_or(grain),
                max_size: resize.max_size.unwrap_or(DiskSize::UNLIMITED),
            },
            None => ResizeInfo::not_resizable(),
        };
        graph.set_resize_info(sid, info)?;
        add_content(graph, sid, &partition.content)?;
    }
    Ok(())
}

fn build_vg(graph: &mut DeviceGraph, fixture: &VgFixture) -> Result<(), Error> {
    let vg = graph.create_vg(&fixture.name, fixture.extent_size);
    for pv in resolve(graph, &fixture.pvs)? {
        let target = graph.plain_device(pv);
        graph.add_pv(vg, target)?;
    }
    let mut pools = Vec::new();
    for lv in fixture.lvs.iter().filter(|lv| lv.pool.is_none()) {
        let kind = if lv.thin_pool { LvKind::ThinPool } else { LvKind::Normal };
        let sid = graph.create_lv(vg, &lv.name, lv.size, kind)?;
        if lv.thin_pool {
            pools.push((lv.name.as_str(), sid));
        } else {
            add_content(graph, sid, &lv.content)?;
        }
    }
    for lv in &fixture.lvs {
        let Some(pool_name) = &lv.pool else {
            continue;
        };
        let pool = pools
            .iter()
            .find(|(name, _)| name == pool_name)
            .map(|(_, sid)| *sid)
            .ok_or_else(|| DeviceGraphError::InvalidFixture(format!("unknown thin pool '{pool_name}'")))?;
        let sid = graph.create_thin_lv(pool, &lv.name, lv.size)?;
        add_content(graph, sid, &lv.content)?;
    }
    Ok(())
}

fn add_content(graph: &mut DeviceGraph, blk: Sid, content: &ContentFixture) -> Result<(), DeviceGraphError> {
    let target = if content.encrypted {
        graph.create_encryption(blk, None)?
    } else {
        blk
    };
    let Some(fs_type) = content.filesystem else {
        return Ok(());
    };
    let fs = graph.create_filesystem(target, fs_type)?;
    let filesystem = graph.filesystem_mut(fs)?;
    filesystem.label = content.label.clone();
    filesystem.uuid = content.uuid.clone();
    filesystem.mount_point = content.mount_point.as_deref().map(MountPoint::new);
    Ok(())
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn test_msdos_fixture() {
        let graph = from_yaml(indoc! {r#"
            disks:
              - name: /dev/sda
                size: 50 GiB
                udev_ids: [/dev/disk/by-id/ata-disk1]
                partition_table: msdos
                partitions:
                  - size: 20 GiB
                    id: ntfs
                    filesystem: ntfs
                    label: windows
                    resize: { min_size: 5 GiB }
                  - size: 20 GiB
                    type: extended
                  - size: 2 GiB
                    type: logical
                    id: swap
                    filesystem: swap
                  - size: 10 GiB
                    type: logical
                    filesystem: ext4
                    mount_point: /home
        "#})
        .unwrap();

        let sda = graph.find_by_name("/dev/disk/by-id/ata-disk1").unwrap().sid;
        let partitions = graph.partitions(sda);
        assert_eq!(
            partitions.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["/dev/sda1", "/dev/sda2", "/dev/sda5", "/dev/sda6"]
        );
        let first = partitions[0].as_partition().unwrap();
        assert_eq!(first.region.start, DiskSize::mib(1));
        assert_eq!(first.id, PartitionId::Ntfs);
        assert!(first.resize_info.resize_ok);
        assert_eq!(first.resize_info.min_size, DiskSize::gib(5));

        let logical = partitions[2].as_partition().unwrap();
        assert_eq!(logical.region.start, DiskSize::gib(20) + DiskSize::mib(2));
        assert!(!logical.resize_info.resize_ok);

        let home = graph.filesystem_of(partitions[3].sid).unwrap();
        assert_eq!(home.mount_point().unwrap().path, "/home");
        assert_eq!(
            graph.filesystem_of(partitions[0].sid).unwrap().as_filesystem().unwrap().label.as_deref(),
            Some("windows")
        );
    }

    #[test]
    fn test_lvm_fixture() {
        let graph = from_yaml(indoc! {r#"
            disks:
              - name: /dev/sda
                size: 20 GiB
                partition_table: gpt
                partitions:
                  - size: 10 GiB
                    id: lvm
                    encrypted: true
              - name: /dev/sdb
                size: 5 GiB
                filesystem: xfs
            volume_groups:
              - name: system
                pvs: [/dev/sda1]
                lvs:
                  - { name: root, size: 4 GiB, filesystem: btrfs, mount_point: "/" }
                  - { name: pool, size: 2 GiB, thin_pool: true }
                  - { name: thin, size: 8 GiB, pool: pool, filesystem: ext4 }
        "#})
        .unwrap();

        let vg = graph.find_vg("system").unwrap().sid;
        assert_eq!(graph.vg_lvs(vg).len(), 3);
        let sda1 = graph.find_by_name("/dev/sda1").unwrap().sid;
        assert_eq!(graph.using_structure(sda1).unwrap().sid, vg);
        let sdb = graph.find_by_name("/dev/sdb").unwrap().sid;
        assert!(graph.filesystem_of(sdb).is_some());
        assert!(graph.partition_table(sdb).is_none());
    }

    #[test]
    fn test_invalid_fixture() {
        let err = from_yaml(indoc! {r#"
            volume_groups:
              - name: system
                pvs: [/dev/sdz1]
        "#})
        .unwrap_err();
        assert!(format!("{err:#}").contains("unknown device '/dev/sdz1'"));

        assert!(from_yaml("disks: [{ name: /dev/sda, size: 1 GiB, partition_table: zfs }]").is_err());
        assert!(from_yaml("disks: []\nbogus: 1").is_err());
    }
}
