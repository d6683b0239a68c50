//! Serializable view of a device graph, used to print proposals.

use serde::Serialize;

use layoutplan_api::{DiskSize, Sid};

use crate::{
    device::{Device, DeviceKind, Holder},
    graph::DeviceGraph,
};

/// One device and everything built upon it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceNode {
    pub sid: Sid,
    pub name: String,
    pub kind: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<DiskSize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DeviceNode>,
}

/// Tree of the devices of a graph. Devices with several parents (RAIDs,
/// volume groups, multi-device filesystems) appear once, under the first
/// member that reaches them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layout {
    pub devices: Vec<DeviceNode>,
}

impl Layout {
    pub fn new(graph: &DeviceGraph) -> Self {
        let mut seen = Vec::new();
        let roots: Vec<Sid> = graph
            .devices()
            .filter(|d| graph.used_devices(d.sid).is_empty())
            .map(|d| d.sid)
            .collect();
        let devices = roots
            .into_iter()
            .filter_map(|sid| node(graph, sid, &mut seen))
            .collect();
        Self { devices }
    }
}

fn node(graph: &DeviceGraph, sid: Sid, seen: &mut Vec<Sid>) -> Option<DeviceNode> {
    if seen.contains(&sid) {
        return None;
    }
    seen.push(sid);
    let device = graph.device(sid)?;
    let children = graph
        .users(sid)
        .into_iter()
        .filter_map(|(child, _)| node(graph, child.sid, seen))
        .collect();
    Some(DeviceNode {
        sid,
        name: device.name.clone(),
        kind: device.kind_name(),
        size: graph.size(sid),
        details: details(graph, device),
        mount_point: device.mount_point().map(|m| m.path.clone()),
        children,
    })
}

fn details(graph: &DeviceGraph, device: &Device) -> Option<String> {
    match &device.kind {
        DeviceKind::PartitionTable(table) => Some(table.table_type.to_string()),
        DeviceKind::Partition(partition) => Some(format!(
            "{} {}, {}..{}{}",
            partition.partition_type,
            partition.id,
            partition.region.start,
            partition.region.end(),
            if partition.boot { ", boot" } else { "" }
        )),
        DeviceKind::LvmVg(vg) => Some(format!(
            "extent {}, {} free",
            vg.extent_size,
            graph.vg_free(device.sid)
        )),
        DeviceKind::LvmLv(lv) if lv.stripes > 1 => Some(format!("{:?}, {} stripes", lv.lv_kind, lv.stripes)),
        DeviceKind::LvmLv(lv) => Some(format!("{:?}", lv.lv_kind)),
        DeviceKind::Md(md) => Some(md.level.to_string()),
        DeviceKind::Bcache(bcache) => {
            let caching = graph
                .used_devices(device.sid)
                .into_iter()
                .find(|(_, h)| *h == Holder::BcacheCaching)
                .map(|(d, _)| d.name.clone());
            Some(match caching {
                Some(caching) => format!("{}, cached by {caching}", bcache.cache_mode),
                None => bcache.cache_mode.to_string(),
            })
        }
        DeviceKind::Filesystem(fs) => Some(match &fs.label {
            Some(label) => format!("{} '{label}'", fs.fs_type),
            None => fs.fs_type.to_string(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use sysdefs::{filesystems::FilesystemType, partition_tables::PartitionTableType, partition_tables::PartitionType};

    use super::*;
    use crate::{device::Disk, device::MountPoint, region::Region};

    #[test]
    fn test_layout() {
        let mut graph = DeviceGraph::new();
        let disk = graph.add_device(
            "/dev/sda",
            DeviceKind::Disk(Disk {
                size: DiskSize::gib(10),
                udev_ids: Vec::new(),
                partitionable: true,
            }),
        );
        graph.create_partition_table(disk, PartitionTableType::Gpt).unwrap();
        let part = graph
            .create_partition(disk, Region::new(DiskSize::mib(1), DiskSize::gib(1)), PartitionType::Primary)
            .unwrap();
        let fs = graph.create_filesystem(part, FilesystemType::Ext4).unwrap();
        graph.set_mount_point(fs, MountPoint::new("/")).unwrap();

        let layout = Layout::new(&graph);
        assert_eq!(layout.devices.len(), 1);
        let table = &layout.devices[0].children[0];
        assert_eq!(table.details.as_deref(), Some("gpt"));
        let partition = &table.children[0];
        assert_eq!(partition.name, "/dev/sda1");
        assert_eq!(partition.size, Some(DiskSize::gib(1)));
        assert_eq!(partition.children[0].mount_point.as_deref(), Some("/"));

        let yaml = serde_yaml::to_string(&layout).unwrap();
        assert!(yaml.contains("mount-point: /"));
    }
}
