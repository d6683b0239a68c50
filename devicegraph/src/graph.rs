use std::collections::{BTreeMap, BTreeSet};

use log::trace;
use petgraph::{
    stable_graph::{NodeIndex, StableGraph},
    visit::{Dfs, EdgeRef, Reversed, Walker},
    Direction,
};

use layoutplan_api::{constants::ENCRYPTION_OVERHEAD, DiskSize, Sid};

use crate::{
    device::{Device, DeviceKind, Holder},
    error::DeviceGraphError,
};

/// The petgraph type backing the device graph. A stable graph keeps node
/// indices valid across removals.
pub(crate) type DevicePetgraph = StableGraph<Device, Holder>;

/// A snapshot of the storage devices of a system. Cloning it is the way to
/// get an independent working copy.
#[derive(Debug, Clone, Default)]
pub struct DeviceGraph {
    pub(crate) inner: DevicePetgraph,
    pub(crate) index: BTreeMap<Sid, NodeIndex>,
    next_sid: u32,
}

impl DeviceGraph {
    pub fn new() -> Self {
        Self {
            next_sid: 1,
            ..Default::default()
        }
    }

    /// Adds a device without any relation and returns its new sid.
    pub fn add_device(&mut self, name: impl Into<String>, kind: DeviceKind) -> Sid {
        let sid = Sid(self.next_sid.max(1));
        self.next_sid = sid.0 + 1;
        let name = name.into();
        trace!("Adding {} '{}' as {}", <&str>::from(&kind), name, sid);
        let idx = self.inner.add_node(Device { sid, name, kind });
        self.index.insert(sid, idx);
        sid
    }

    /// Records that `user` is built upon `used`.
    pub fn add_holder(&mut self, user: Sid, used: Sid, holder: Holder) -> Result<(), DeviceGraphError> {
        let from = self.node(user)?;
        let to = self.node(used)?;
        self.inner.add_edge(from, to, holder);
        Ok(())
    }

    pub(crate) fn node(&self, sid: Sid) -> Result<NodeIndex, DeviceGraphError> {
        self.index
            .get(&sid)
            .copied()
            .ok_or(DeviceGraphError::NotFound(sid))
    }

    pub fn contains(&self, sid: Sid) -> bool {
        self.index.contains_key(&sid)
    }

    pub fn device(&self, sid: Sid) -> Option<&Device> {
        self.index.get(&sid).map(|idx| &self.inner[*idx])
    }

    pub fn device_mut(&mut self, sid: Sid) -> Option<&mut Device> {
        let idx = *self.index.get(&sid)?;
        self.inner.node_weight_mut(idx)
    }

    /// Like [`DeviceGraph::device`], for callers that consider a missing
    /// device an error.
    pub fn try_device(&self, sid: Sid) -> Result<&Device, DeviceGraphError> {
        self.device(sid).ok_or(DeviceGraphError::NotFound(sid))
    }

    /// All devices, ordered by sid.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.index.values().map(|idx| &self.inner[*idx])
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Finds a block device by kernel name or udev link.
    pub fn find_by_name(&self, name: &str) -> Option<&Device> {
        self.devices().find(|d| {
            d.is_blk()
                && (d.name == name
                    || d
                        .as_disk()
                        .is_some_and(|disk| disk.udev_ids.iter().any(|id| id == name)))
        })
    }

    /// Disks ordered by name.
    pub fn disks(&self) -> Vec<&Device> {
        let mut disks: Vec<_> = self.devices().filter(|d| d.as_disk().is_some()).collect();
        disks.sort_by(|a, b| a.name.cmp(&b.name));
        disks
    }

    /// Devices `sid` is directly built upon, with the relation kind.
    pub fn used_devices(&self, sid: Sid) -> Vec<(&Device, Holder)> {
        self.neighbors(sid, Direction::Outgoing)
    }

    /// Devices directly built upon `sid`, with the relation kind.
    pub fn users(&self, sid: Sid) -> Vec<(&Device, Holder)> {
        self.neighbors(sid, Direction::Incoming)
    }

    fn neighbors(&self, sid: Sid, direction: Direction) -> Vec<(&Device, Holder)> {
        let Some(idx) = self.index.get(&sid) else {
            return Vec::new();
        };
        let mut result: Vec<_> = self
            .inner
            .edges_directed(*idx, direction)
            .map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                (&self.inner[other], *edge.weight())
            })
            .collect();
        result.sort_by_key(|(d, _)| d.sid);
        result
    }

    /// Every device `sid` is built upon, directly or not.
    pub fn ancestors(&self, sid: Sid) -> Vec<Sid> {
        let Some(idx) = self.index.get(&sid) else {
            return Vec::new();
        };
        let mut result: Vec<Sid> = Dfs::new(&self.inner, *idx)
            .iter(&self.inner)
            .filter(|i| i != idx)
            .map(|i| self.inner[i].sid)
            .collect();
        result.sort();
        result
    }

    /// Every device built upon `sid`, directly or not.
    pub fn descendants(&self, sid: Sid) -> Vec<Sid> {
        let Some(idx) = self.index.get(&sid) else {
            return Vec::new();
        };
        let reversed = Reversed(&self.inner);
        let mut result: Vec<Sid> = Dfs::new(reversed, *idx)
            .iter(reversed)
            .filter(|i| i != idx)
            .map(|i| self.inner[i].sid)
            .collect();
        result.sort();
        result
    }

    /// Removes a device together with everything built upon it.
    pub fn remove_device(&mut self, sid: Sid) -> Result<Vec<Sid>, DeviceGraphError> {
        self.node(sid)?;
        let mut removed = self.descendants(sid);
        removed.push(sid);
        for gone in &removed {
            if let Some(idx) = self.index.remove(gone) {
                trace!("Removing {}", self.inner[idx].describe());
                self.inner.remove_node(idx);
            }
        }
        Ok(removed)
    }

    /// Removes the devices built upon `sid`, keeping `sid` itself.
    pub fn remove_descendants(&mut self, sid: Sid) -> Result<Vec<Sid>, DeviceGraphError> {
        let mut removed = Vec::new();
        for (user, _) in self
            .users(sid)
            .into_iter()
            .map(|(d, h)| (d.sid, h))
            .collect::<Vec<_>>()
        {
            if self.contains(user) {
                removed.extend(self.remove_device(user)?);
            }
        }
        Ok(removed)
    }

    /// Size of a block device.
    pub fn size(&self, sid: Sid) -> Option<DiskSize> {
        let device = self.device(sid)?;
        match &device.kind {
            DeviceKind::Disk(disk) => Some(disk.size),
            DeviceKind::Partition(partition) => Some(partition.region.length),
            DeviceKind::LvmLv(lv) => Some(lv.size),
            DeviceKind::Md(md) => Some(md.size),
            DeviceKind::Bcache(bcache) => Some(bcache.size),
            DeviceKind::Encryption(_) => {
                let (underlying, _) = self.used_devices(sid).into_iter().next()?;
                Some(self.size(underlying.sid)? - ENCRYPTION_OVERHEAD)
            }
            _ => None,
        }
    }

    /// The encryption layer directly on top of a block device.
    pub fn encryption_of(&self, blk: Sid) -> Option<&Device> {
        self.users(blk)
            .into_iter()
            .map(|(d, _)| d)
            .find(|d| matches!(d.kind, DeviceKind::Encryption(_)))
    }

    /// The block device that should be used for content: the encryption
    /// layer when present, the device itself otherwise.
    pub fn plain_device(&self, blk: Sid) -> Sid {
        self.encryption_of(blk).map(|d| d.sid).unwrap_or(blk)
    }

    /// Filesystem on a block device, looking through encryption.
    pub fn filesystem_of(&self, blk: Sid) -> Option<&Device> {
        let content = self.plain_device(blk);
        self.users(content)
            .into_iter()
            .map(|(d, _)| d)
            .find(|d| d.as_filesystem().is_some())
    }

    /// Whether anything is built upon the device.
    pub fn is_used(&self, sid: Sid) -> bool {
        !self.users(sid).is_empty()
    }

    /// Sids of all the devices of the given kinds, e.g. `"lvm_vg"`.
    pub fn sids_of_kind(&self, kind: &str) -> Vec<Sid> {
        self.devices()
            .filter(|d| d.kind_name() == kind)
            .map(|d| d.sid)
            .collect()
    }

    /// Renames a device, e.g. after partitions are renumbered.
    pub(crate) fn rename(&mut self, sid: Sid, name: String) -> Result<(), DeviceGraphError> {
        let device = self.device_mut(sid).ok_or(DeviceGraphError::NotFound(sid))?;
        device.name = name;
        Ok(())
    }

    /// Sids present in `self` but not in `other`.
    pub fn sids_not_in(&self, other: &DeviceGraph) -> BTreeSet<Sid> {
        self.index
            .keys()
            .filter(|sid| !other.contains(**sid))
            .copied()
            .collect()
    }
}
