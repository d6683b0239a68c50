use log::debug;
use sysdefs::{
    partition_ids::PartitionId,
    partition_tables::{PartitionTableType, PartitionType, DEFAULT_GRAIN},
};

use layoutplan_api::{DiskSize, Sid};

use crate::{
    device::{Device, DeviceKind, Holder, Partition, PartitionTable, ResizeInfo},
    error::DeviceGraphError,
    graph::DeviceGraph,
    region::Region,
};

/// First number of a logical partition in an MS-DOS table.
const FIRST_LOGICAL_NUMBER: u32 = 5;

/// Unused region of a partitionable device where partitions can be
/// created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnusedSlot {
    pub region: Region,
    pub inside_extended: bool,
    pub grain: DiskSize,
    pub table_type: PartitionTableType,
}

/// Kernel name of partition `number` of `device`, e.g. `/dev/sda1` or
/// `/dev/nvme0n1p1`.
pub fn partition_name(device: &str, number: u32) -> String {
    if device.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{device}p{number}")
    } else {
        format!("{device}{number}")
    }
}

/// Region of a device of `size` bytes that partitions of a `table_type`
/// table may use.
pub fn usable_region(size: DiskSize, table_type: PartitionTableType) -> Region {
    let head = DiskSize::b(table_type.head_overhead());
    let tail = DiskSize::b(table_type.tail_overhead());
    Region::from_bounds(head, size - tail)
}

impl DeviceGraph {
    pub fn partition_table(&self, device: Sid) -> Option<&Device> {
        self.users(device)
            .into_iter()
            .map(|(d, _)| d)
            .find(|d| d.as_partition_table().is_some())
    }

    pub fn partition_table_type(&self, device: Sid) -> Option<PartitionTableType> {
        self.partition_table(device)
            .and_then(|t| t.as_partition_table())
            .map(|t| t.table_type)
    }

    /// Alignment grain of the partitions of a device.
    pub fn grain(&self, device: Sid) -> DiskSize {
        self.partition_table(device)
            .and_then(|t| t.as_partition_table())
            .map(|t| t.grain)
            .unwrap_or(DiskSize::b(DEFAULT_GRAIN))
    }

    /// All partitions of a device, logical ones included, ordered by start.
    pub fn partitions(&self, device: Sid) -> Vec<&Device> {
        let Some(table) = self.partition_table(device) else {
            return Vec::new();
        };
        let mut result = Vec::new();
        for (partition, holder) in self.users(table.sid) {
            if holder != Holder::Subdevice || partition.as_partition().is_none() {
                continue;
            }
            result.push(partition);
            for (logical, holder) in self.users(partition.sid) {
                if holder == Holder::Subdevice && logical.as_partition().is_some() {
                    result.push(logical);
                }
            }
        }
        result.sort_by_key(|p| p.as_partition().map(|p| p.region.start));
        result
    }

    pub fn extended_partition(&self, device: Sid) -> Option<&Device> {
        self.partitions(device).into_iter().find(|p| {
            p.as_partition()
                .is_some_and(|p| p.partition_type == PartitionType::Extended)
        })
    }

    /// Device (disk, RAID, bcache) a partition belongs to.
    pub fn partitionable_of(&self, partition: Sid) -> Option<&Device> {
        let mut current = partition;
        loop {
            let (used, _) = self
                .used_devices(current)
                .into_iter()
                .find(|(d, h)| *h == Holder::Subdevice || d.as_partition_table().is_some())?;
            if used.as_partition_table().is_some() {
                return self.used_devices(used.sid).into_iter().next().map(|(d, _)| d);
            }
            current = used.sid;
        }
    }

    pub fn create_partition_table(
        &mut self,
        device: Sid,
        table_type: PartitionTableType,
    ) -> Result<Sid, DeviceGraphError> {
        let owner = self.try_device(device)?;
        if !owner.is_partitionable() {
            return Err(DeviceGraphError::NotPartitionable(owner.name.clone()));
        }
        if self.partition_table(device).is_some() {
            return Err(DeviceGraphError::PartitionTableExists(owner.name.clone()));
        }
        if self.is_used(device) {
            return Err(DeviceGraphError::InUse(owner.name.clone()));
        }
        debug!("Creating {} partition table on '{}'", table_type, owner.name);
        let name = format!("{} ({})", owner.name, table_type);
        let table = self.add_device(
            name,
            DeviceKind::PartitionTable(PartitionTable {
                table_type,
                grain: DiskSize::b(DEFAULT_GRAIN),
            }),
        );
        self.add_holder(table, device, Holder::User)?;
        Ok(table)
    }

    /// Removes the partition table and every partition in it.
    pub fn remove_partition_table(&mut self, device: Sid) -> Result<Vec<Sid>, DeviceGraphError> {
        match self.partition_table(device).map(|t| t.sid) {
            Some(table) => self.remove_device(table),
            None => Ok(Vec::new()),
        }
    }

    /// Region partitions of the device may use.
    pub fn usable_region(&self, device: Sid) -> Result<Region, DeviceGraphError> {
        let owner = self.try_device(device)?;
        let table_type = self
            .partition_table_type(device)
            .ok_or_else(|| DeviceGraphError::NoPartitionTable(owner.name.clone()))?;
        let size = self.size(device).ok_or(DeviceGraphError::WrongKind {
            sid: device,
            expected: "block device",
        })?;
        Ok(usable_region(size, table_type))
    }

    /// Free regions of a partitioned device, both outside and inside the
    /// extended partition. Regions that cannot hold a single aligned grain
    /// are left out.
    pub fn unused_slots(&self, device: Sid) -> Vec<UnusedSlot> {
        let Some(table_type) = self.partition_table_type(device) else {
            return Vec::new();
        };
        let Ok(usable) = self.usable_region(device) else {
            return Vec::new();
        };
        let grain = self.grain(device);
        let partitions: Vec<&Partition> = self
            .partitions(device)
            .into_iter()
            .filter_map(|p| p.as_partition())
            .collect();

        let mut slots = Vec::new();
        let outer: Vec<Region> = partitions
            .iter()
            .filter(|p| p.partition_type != PartitionType::Logical)
            .map(|p| p.region)
            .collect();
        for region in gaps(usable, &outer) {
            slots.push(UnusedSlot {
                region,
                inside_extended: false,
                grain,
                table_type,
            });
        }

        if let Some(extended) = partitions
            .iter()
            .find(|p| p.partition_type == PartitionType::Extended)
        {
            let inner: Vec<Region> = partitions
                .iter()
                .filter(|p| p.partition_type == PartitionType::Logical)
                .map(|p| p.region)
                .collect();
            for region in gaps(extended.region, &inner) {
                slots.push(UnusedSlot {
                    region,
                    inside_extended: true,
                    grain,
                    table_type,
                });
            }
        }

        slots.retain(|s| s.region.aligned(grain).is_some());
        slots.sort_by_key(|s| s.region.start);
        slots
    }

    /// Number of primary and extended partitions of a device.
    pub fn primary_slots_used(&self, device: Sid) -> usize {
        self.partitions(device)
            .iter()
            .filter_map(|p| p.as_partition())
            .filter(|p| p.partition_type != PartitionType::Logical)
            .count()
    }

    /// Creates a partition on exactly `region`. Logical partitions go inside
    /// the extended partition, which must exist.
    pub fn create_partition(
        &mut self,
        device: Sid,
        region: Region,
        partition_type: PartitionType,
    ) -> Result<Sid, DeviceGraphError> {
        let owner_name = self.try_device(device)?.name.clone();
        let table = self
            .partition_table(device)
            .map(|t| t.sid)
            .ok_or_else(|| DeviceGraphError::NoPartitionTable(owner_name.clone()))?;
        let table_type = self
            .partition_table_type(device)
            .ok_or_else(|| DeviceGraphError::NoPartitionTable(owner_name.clone()))?;
        let unavailable = || DeviceGraphError::RegionUnavailable {
            disk: owner_name.clone(),
            region,
        };
        let limit = |what| DeviceGraphError::TableLimit {
            disk: owner_name.clone(),
            table_type,
            what,
        };

        let partitions: Vec<Partition> = self
            .partitions(device)
            .into_iter()
            .filter_map(|p| p.as_partition().cloned())
            .collect();
        let extended = self.extended_partition(device).map(|e| e.sid);

        let (container, parent) = match partition_type {
            PartitionType::Logical => {
                if !table_type.extended_possible() {
                    return Err(limit("logical partitions"));
                }
                let extended = extended.ok_or_else(|| limit("logical partitions without an extended one"))?;
                let region = self.try_device(extended)?.as_partition().map(|p| p.region).ok_or(
                    DeviceGraphError::WrongKind {
                        sid: extended,
                        expected: "partition",
                    },
                )?;
                (region, extended)
            }
            PartitionType::Primary | PartitionType::Extended => {
                if partition_type == PartitionType::Extended
                    && (!table_type.extended_possible() || extended.is_some())
                {
                    return Err(limit("another extended partition"));
                }
                if self.primary_slots_used(device) >= table_type.max_primary() {
                    return Err(limit("more primary partitions"));
                }
                (self.usable_region(device)?, table)
            }
        };

        if region.is_empty() || !container.contains(&region) {
            return Err(unavailable());
        }
        let siblings_overlap = partitions.iter().any(|p| {
            let same_level = (p.partition_type == PartitionType::Logical)
                == (partition_type == PartitionType::Logical);
            same_level && p.region.overlaps(&region)
        });
        if siblings_overlap {
            return Err(unavailable());
        }

        let number = match partition_type {
            PartitionType::Logical => partitions
                .iter()
                .filter(|p| p.partition_type == PartitionType::Logical)
                .map(|p| p.number + 1)
                .max()
                .unwrap_or(FIRST_LOGICAL_NUMBER),
            _ => (1..=table_type.max_primary() as u32)
                .find(|n| !partitions.iter().any(|p| p.number == *n))
                .ok_or_else(|| limit("more partitions"))?,
        };

        let id = if partition_type == PartitionType::Extended {
            PartitionId::Extended
        } else {
            PartitionId::Linux
        };
        let name = partition_name(&owner_name, number);
        debug!("Creating {partition_type} partition '{name}' at {}..{}", region.start, region.end());
        let sid = self.add_device(
            name,
            DeviceKind::Partition(Partition {
                number,
                region,
                partition_type,
                id,
                boot: false,
                resize_info: ResizeInfo {
                    resize_ok: true,
                    min_size: DiskSize::b(DEFAULT_GRAIN),
                    max_size: DiskSize::UNLIMITED,
                },
            }),
        );
        self.add_holder(sid, parent, Holder::Subdevice)?;
        if partition_type == PartitionType::Logical {
            self.renumber_logical(device)?;
        }
        Ok(sid)
    }

    /// Deletes a partition and everything on it. Deleting the extended
    /// partition deletes all logical ones.
    pub fn delete_partition(&mut self, sid: Sid) -> Result<Vec<Sid>, DeviceGraphError> {
        let device = self.partitionable_of(sid).map(|d| d.sid);
        let was_logical = self
            .try_device(sid)?
            .as_partition()
            .is_some_and(|p| p.partition_type == PartitionType::Logical);
        let removed = self.remove_device(sid)?;
        if let (true, Some(device)) = (was_logical, device) {
            self.renumber_logical(device)?;
        }
        Ok(removed)
    }

    /// Logical partitions are numbered consecutively by position.
    fn renumber_logical(&mut self, device: Sid) -> Result<(), DeviceGraphError> {
        let owner_name = self.try_device(device)?.name.clone();
        let logical: Vec<Sid> = self
            .partitions(device)
            .into_iter()
            .filter(|p| {
                p.as_partition()
                    .is_some_and(|p| p.partition_type == PartitionType::Logical)
            })
            .map(|p| p.sid)
            .collect();
        for (number, sid) in (FIRST_LOGICAL_NUMBER..).zip(logical) {
            if let Some(partition) = self.device_mut(sid).and_then(|d| d.as_partition_mut()) {
                partition.number = number;
            }
            self.rename(sid, partition_name(&owner_name, number))?;
        }
        Ok(())
    }

    /// Bytes right after the partition that no other partition uses.
    pub fn space_after(&self, sid: Sid) -> DiskSize {
        let Some(partition) = self.device(sid).and_then(|d| d.as_partition()) else {
            return DiskSize::ZERO;
        };
        let Some(device) = self.partitionable_of(sid).map(|d| d.sid) else {
            return DiskSize::ZERO;
        };
        let logical = partition.partition_type == PartitionType::Logical;
        let container_end = if logical {
            self.extended_partition(device)
                .and_then(|e| e.as_partition())
                .map(|e| e.region.end())
        } else {
            self.usable_region(device).ok().map(|r| r.end())
        };
        let Some(container_end) = container_end else {
            return DiskSize::ZERO;
        };
        let next_start = self
            .partitions(device)
            .iter()
            .filter_map(|p| p.as_partition())
            .filter(|p| (p.partition_type == PartitionType::Logical) == logical)
            .map(|p| p.region.start)
            .filter(|start| *start >= partition.region.end())
            .min()
            .unwrap_or(container_end);
        next_start.min(container_end) - partition.region.end()
    }

    pub fn resize_info(&self, sid: Sid) -> ResizeInfo {
        match self.device(sid).map(|d| &d.kind) {
            Some(DeviceKind::Partition(p)) => p.resize_info,
            Some(DeviceKind::LvmLv(lv)) => lv.resize_info,
            _ => ResizeInfo::not_resizable(),
        }
    }

    pub fn set_resize_info(&mut self, sid: Sid, info: ResizeInfo) -> Result<(), DeviceGraphError> {
        match self.device_mut(sid).map(|d| &mut d.kind) {
            Some(DeviceKind::Partition(p)) => p.resize_info = info,
            Some(DeviceKind::LvmLv(lv)) => lv.resize_info = info,
            Some(_) => {
                return Err(DeviceGraphError::WrongKind {
                    sid,
                    expected: "partition or logical volume",
                })
            }
            None => return Err(DeviceGraphError::NotFound(sid)),
        }
        Ok(())
    }

    /// Changes the size of a partition, keeping its start. The new size must
    /// be allowed by the resize info and fit before the next partition.
    pub fn resize_partition(&mut self, sid: Sid, new_size: DiskSize) -> Result<(), DeviceGraphError> {
        let device = self.try_device(sid)?;
        let name = device.name.clone();
        let partition = device.as_partition().ok_or(DeviceGraphError::WrongKind {
            sid,
            expected: "partition",
        })?;
        let current = partition.region.length;
        let info = partition.resize_info;
        let invalid = || DeviceGraphError::InvalidResize {
            name: name.clone(),
            size: new_size,
        };
        if new_size == current {
            return Ok(());
        }
        if new_size.is_zero() || !info.resize_ok {
            return Err(invalid());
        }
        if new_size < current && new_size < info.min_size {
            return Err(invalid());
        }
        if new_size > current && (new_size > info.max_size || new_size - current > self.space_after(sid)) {
            return Err(invalid());
        }
        debug!("Resizing '{name}' from {current} to {new_size}");
        if let Some(partition) = self.device_mut(sid).and_then(|d| d.as_partition_mut()) {
            partition.region.length = new_size;
        }
        Ok(())
    }

    pub fn set_partition_id(&mut self, sid: Sid, id: PartitionId) -> Result<(), DeviceGraphError> {
        let partition = self
            .device_mut(sid)
            .and_then(|d| d.as_partition_mut())
            .ok_or(DeviceGraphError::WrongKind {
                sid,
                expected: "partition",
            })?;
        partition.id = id;
        Ok(())
    }

    pub fn set_boot_flag(&mut self, sid: Sid, boot: bool) -> Result<(), DeviceGraphError> {
        let partition = self
            .device_mut(sid)
            .and_then(|d| d.as_partition_mut())
            .ok_or(DeviceGraphError::WrongKind {
                sid,
                expected: "partition",
            })?;
        partition.boot = boot;
        Ok(())
    }
}

/// Parts of `container` not covered by any of `used`.
fn gaps(container: Region, used: &[Region]) -> Vec<Region> {
    let mut used: Vec<Region> = used.iter().filter(|r| r.overlaps(&container)).copied().collect();
    used.sort();
    let mut result = Vec::new();
    let mut cursor = container.start;
    for region in used {
        if region.start > cursor {
            result.push(Region::from_bounds(cursor, region.start));
        }
        cursor = cursor.max(region.end());
    }
    if container.end() > cursor {
        result.push(Region::from_bounds(cursor, container.end()));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Disk;

    const MIB: DiskSize = DiskSize::mib(1);

    fn disk_with_table(size: DiskSize, table_type: PartitionTableType) -> (DeviceGraph, Sid) {
        let mut graph = DeviceGraph::new();
        let disk = graph.add_device(
            "/dev/sda",
            DeviceKind::Disk(Disk {
                size,
                udev_ids: Vec::new(),
                partitionable: true,
            }),
        );
        graph.create_partition_table(disk, table_type).unwrap();
        (graph, disk)
    }

    #[test]
    fn test_partition_name() {
        assert_eq!(partition_name("/dev/sda", 3), "/dev/sda3");
        assert_eq!(partition_name("/dev/nvme0n1", 1), "/dev/nvme0n1p1");
        assert_eq!(partition_name("/dev/md0", 2), "/dev/md0p2");
    }

    #[test]
    fn test_gpt_unused_slots() {
        let (mut graph, disk) = disk_with_table(DiskSize::gib(50), PartitionTableType::Gpt);
        let slots = graph.unused_slots(disk);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].region.start, DiskSize::b(34 * 512));
        assert_eq!(slots[0].region.end(), DiskSize::gib(50) - DiskSize::b(33 * 512));

        let first = graph
            .create_partition(disk, Region::new(MIB, DiskSize::gib(1)), PartitionType::Primary)
            .unwrap();
        assert_eq!(graph.device(first).unwrap().name, "/dev/sda1");
        let slots = graph.unused_slots(disk);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].region.start, DiskSize::gib(1) + MIB);

        assert!(matches!(
            graph.create_partition(disk, Region::new(MIB, MIB), PartitionType::Primary),
            Err(DeviceGraphError::RegionUnavailable { .. })
        ));
        assert!(matches!(
            graph.create_partition(disk, Region::new(DiskSize::gib(2), MIB), PartitionType::Extended),
            Err(DeviceGraphError::TableLimit { .. })
        ));
    }

    #[test]
    fn test_msdos_logical() {
        let (mut graph, disk) = disk_with_table(DiskSize::gib(10), PartitionTableType::Msdos);
        graph
            .create_partition(disk, Region::new(MIB, DiskSize::gib(1)), PartitionType::Primary)
            .unwrap();
        let extended = graph
            .create_partition(
                disk,
                Region::from_bounds(DiskSize::gib(1) + MIB, DiskSize::gib(10)),
                PartitionType::Extended,
            )
            .unwrap();
        assert_eq!(graph.device(extended).unwrap().name, "/dev/sda2");

        let second = graph
            .create_partition(
                disk,
                Region::new(DiskSize::gib(4), DiskSize::gib(1)),
                PartitionType::Logical,
            )
            .unwrap();
        let first = graph
            .create_partition(
                disk,
                Region::new(DiskSize::gib(2), DiskSize::gib(1)),
                PartitionType::Logical,
            )
            .unwrap();
        // Logical partitions are numbered by position.
        assert_eq!(graph.device(first).unwrap().name, "/dev/sda5");
        assert_eq!(graph.device(second).unwrap().name, "/dev/sda6");

        let inside: Vec<_> = graph
            .unused_slots(disk)
            .into_iter()
            .filter(|s| s.inside_extended)
            .collect();
        assert_eq!(inside.len(), 3);

        graph.delete_partition(first).unwrap();
        assert_eq!(graph.device(second).unwrap().name, "/dev/sda5");

        let removed = graph.delete_partition(extended).unwrap();
        assert!(removed.contains(&second));
        assert_eq!(graph.partitions(disk).len(), 1);
    }

    #[test]
    fn test_resize_partition() {
        let (mut graph, disk) = disk_with_table(DiskSize::gib(10), PartitionTableType::Gpt);
        let first = graph
            .create_partition(disk, Region::new(MIB, DiskSize::gib(4)), PartitionType::Primary)
            .unwrap();
        graph
            .create_partition(disk, Region::new(DiskSize::gib(5), DiskSize::gib(1)), PartitionType::Primary)
            .unwrap();
        assert_eq!(graph.space_after(first), DiskSize::gib(1) - MIB);

        graph
            .set_resize_info(
                first,
                ResizeInfo {
                    resize_ok: true,
                    min_size: DiskSize::gib(2),
                    max_size: DiskSize::gib(8),
                },
            )
            .unwrap();
        assert!(graph.resize_partition(first, DiskSize::gib(1)).is_err());
        assert!(graph.resize_partition(first, DiskSize::gib(5)).is_err());
        graph.resize_partition(first, DiskSize::gib(2)).unwrap();
        assert_eq!(graph.size(first), Some(DiskSize::gib(2)));
        assert_eq!(graph.space_after(first), DiskSize::gib(3) - MIB);
    }

    #[test]
    fn test_gaps() {
        let container = Region::new(DiskSize::ZERO, DiskSize::gib(10));
        let used = [
            Region::new(DiskSize::gib(5), DiskSize::gib(1)),
            Region::new(DiskSize::gib(1), DiskSize::gib(1)),
        ];
        assert_eq!(
            gaps(container, &used),
            vec![
                Region::new(DiskSize::ZERO, DiskSize::gib(1)),
                Region::new(DiskSize::gib(2), DiskSize::gib(3)),
                Region::new(DiskSize::gib(6), DiskSize::gib(4)),
            ]
        );
    }
}
