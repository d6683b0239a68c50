//! Assignment of planned partitions to the free regions of the disks.

use std::collections::BTreeSet;

use log::trace;
use serde::Serialize;

use devicegraph::{partitions::usable_region, DeviceGraph, Region};
use layoutplan_api::{
    constants::PREFERRED_PTABLE_TYPE, planned::PlannedPartition, DiskSize, PlannedId, Sid,
};
use sysdefs::partition_tables::{PartitionTableType, PartitionType, DEFAULT_GRAIN};

mod calculator;
mod pv;

pub use calculator::{best_distribution, resizing_size};

/// Contiguous unused region of a disk where new partitions may go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FreeSpace {
    pub disk_name: String,

    /// Size of the whole disk, the reference for percentages.
    pub disk_size: DiskSize,

    pub region: Region,
    pub grain: DiskSize,

    /// Table of the disk, or the one that will be created on it.
    pub ptable_type: PartitionTableType,

    pub inside_extended: bool,

    /// The region was produced by shrinking an existing partition.
    pub growing: bool,

    /// The region directly follows a reused partition planned to grow and
    /// must stay free.
    pub reserved_for_growth: bool,

    /// Primary and extended partitions already on the disk.
    pub primaries_used: usize,

    pub extended_exists: bool,
}

impl FreeSpace {
    /// Size that aligned partitions can use.
    pub fn usable_size(&self) -> DiskSize {
        self.region
            .aligned(self.grain)
            .map(|r| r.length)
            .unwrap_or(DiskSize::ZERO)
    }
}

/// Free space together with the planned partitions placed in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignedSpace {
    pub space: FreeSpace,

    /// Ordered as they will be created; partitions without maximum go last.
    pub partitions: Vec<PlannedPartition>,

    /// Final size of each partition.
    pub sizes: Vec<DiskSize>,

    /// Type of the first partitions. `None` when the table has no
    /// primary/logical distinction.
    pub partition_type: Option<PartitionType>,

    /// The last `num_logical` partitions are logical.
    pub num_logical: usize,
}

impl AssignedSpace {
    /// Places the partitions in the space and sizes them. `None` if their
    /// minimum sizes do not fit.
    pub fn new(
        space: FreeSpace,
        mut partitions: Vec<PlannedPartition>,
        partition_type: Option<PartitionType>,
        num_logical: usize,
    ) -> Option<Self> {
        let mixed = num_logical > 0 && num_logical < partitions.len();
        partitions.sort_by_key(|p| {
            (
                mixed && !p.primary,
                p.size.resolve(space.disk_size).max_size().is_unlimited(),
            )
        });
        let requests: Vec<SizeRequest> = partitions
            .iter()
            .map(|p| {
                let size = p.size.resolve(space.disk_size);
                SizeRequest {
                    min: size.min(),
                    max: size.max_size(),
                    weight: size.effective_weight(),
                }
            })
            .collect();
        let mut assigned = Self {
            space,
            partitions,
            sizes: Vec::new(),
            partition_type,
            num_logical,
        };
        assigned.sizes = water_fill(&requests, assigned.available_size(), assigned.space.grain)?;
        Some(assigned)
    }

    /// Bytes left for the partitions once logical overhead is taken out.
    pub fn available_size(&self) -> DiskSize {
        self.space.usable_size() - self.space.grain * self.num_logical as u64
    }

    /// Unused bytes after sizing the partitions.
    pub fn unused_size(&self) -> DiskSize {
        self.available_size() - self.sizes.iter().sum::<DiskSize>()
    }

    pub fn total_weight(&self) -> u64 {
        self.partitions
            .iter()
            .map(|p| p.size.effective_weight() as u64)
            .sum()
    }

    /// A new extended partition has to be created for the logical
    /// partitions.
    pub fn needs_extended(&self) -> bool {
        self.num_logical > 0 && !self.space.inside_extended
    }

    /// Type of the partition at `index`.
    pub fn partition_type_at(&self, index: usize) -> Option<PartitionType> {
        if index + self.num_logical >= self.partitions.len() && self.num_logical > 0 {
            Some(PartitionType::Logical)
        } else {
            self.partition_type
        }
    }
}

/// Comparison key of a distribution. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DistributionScore {
    pub gaps_count: usize,
    pub gaps_total_size: DiskSize,

    /// How far the share of space of every region is from the share of
    /// weight of its partitions, in parts per million.
    pub weight_space_deviation: u64,

    pub spaces_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionsDistribution {
    pub spaces: Vec<AssignedSpace>,
}

impl PartitionsDistribution {
    pub fn score(&self) -> DistributionScore {
        let mut gaps_count = 0;
        let mut gaps_total_size = DiskSize::ZERO;
        for assigned in &self.spaces {
            let unused = assigned.unused_size();
            if unused >= assigned.space.grain {
                gaps_count += 1;
                gaps_total_size += unused;
            }
        }
        DistributionScore {
            gaps_count,
            gaps_total_size,
            weight_space_deviation: self.weight_space_deviation(),
            spaces_count: self.spaces.len(),
        }
    }

    fn weight_space_deviation(&self) -> u64 {
        let total_weight: u128 = self.spaces.iter().map(|s| s.total_weight() as u128).sum();
        let total_size: u128 = self
            .spaces
            .iter()
            .map(|s| s.available_size().bytes() as u128)
            .sum();
        if total_weight == 0 || total_size == 0 {
            return 0;
        }
        let deviation: u128 = self
            .spaces
            .iter()
            .map(|s| {
                let size = s.available_size().bytes() as u128 * total_weight;
                let weight = s.total_weight() as u128 * total_size;
                size.abs_diff(weight) * 1_000_000 / (total_size * total_weight)
            })
            .sum();
        deviation as u64
    }

    pub fn partitions(&self) -> impl Iterator<Item = &PlannedPartition> {
        self.spaces.iter().flat_map(|s| s.partitions.iter())
    }

    pub fn contains(&self, planned_id: PlannedId) -> bool {
        self.partitions().any(|p| p.planned_id == planned_id)
    }

    /// Names of the disks that get new partitions.
    pub fn disk_names(&self) -> BTreeSet<&str> {
        self.spaces.iter().map(|s| s.space.disk_name.as_str()).collect()
    }
}

/// Sizing request of a device sharing a region with others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeRequest {
    pub min: DiskSize,
    pub max: DiskSize,
    pub weight: u32,
}

/// Splits `available` bytes among the requests, in whole grains: every
/// request gets its minimum, extra space goes by weight without exceeding
/// maximums. Space no weighted request can take is shared equally among the
/// requests still below their maximum. `None` if the minimums do not fit.
pub fn water_fill(requests: &[SizeRequest], available: DiskSize, grain: DiskSize) -> Option<Vec<DiskSize>> {
    let unit = grain.bytes().max(1);
    let mins: Vec<u64> = requests.iter().map(|r| r.min.ceil(grain).bytes() / unit).collect();
    let maxs: Vec<u64> = requests
        .iter()
        .zip(&mins)
        .map(|(r, min)| {
            if r.max.is_unlimited() {
                u64::MAX
            } else {
                (r.max.floor(grain).bytes() / unit).max(*min)
            }
        })
        .collect();

    let total = available.floor(grain).bytes() / unit;
    let needed: u64 = mins.iter().sum();
    if needed > total {
        return None;
    }

    let mut sizes = mins;
    let mut extra = total - needed;
    let weights: Vec<u32> = requests.iter().map(|r| r.weight).collect();
    grow(&mut sizes, &maxs, &weights, &mut extra);
    if extra > 0 {
        grow(&mut sizes, &maxs, &vec![1; requests.len()], &mut extra);
    }
    trace!("Water fill of {available}: {sizes:?} grains, {extra} left");
    Some(sizes.into_iter().map(|s| DiskSize::b(s * unit)).collect())
}

fn grow(sizes: &mut [u64], maxs: &[u64], weights: &[u32], extra: &mut u64) {
    while *extra > 0 {
        let growable: Vec<usize> = (0..sizes.len())
            .filter(|&i| weights[i] > 0 && sizes[i] < maxs[i])
            .collect();
        if growable.is_empty() {
            return;
        }
        let total_weight: u128 = growable.iter().map(|&i| weights[i] as u128).sum();

        let mut given = 0;
        for &i in &growable {
            let share = (*extra as u128 * weights[i] as u128 / total_weight) as u64;
            let share = share.min(maxs[i] - sizes[i]);
            sizes[i] += share;
            given += share;
        }
        // Less extra than total weight: one grain each, in order.
        if given == 0 {
            for &i in &growable {
                if given == *extra {
                    break;
                }
                sizes[i] += 1;
                given += 1;
            }
        }
        *extra -= given;
    }
}

/// Free spaces of the given disks. Disks without partition table (or with
/// an empty table of another type than requested) offer their whole usable
/// region under the requested type.
///
/// `resized` are the partitions shrunk so far; the space after them is
/// flagged as growing.
pub fn free_spaces(
    graph: &DeviceGraph,
    disks: &[String],
    planned: &[PlannedPartition],
    resized: &BTreeSet<Sid>,
) -> Vec<FreeSpace> {
    let mut spaces = Vec::new();
    for name in disks {
        let Some(disk) = graph.find_by_name(name) else {
            continue;
        };
        let Some(disk_size) = graph.size(disk.sid) else {
            continue;
        };
        let wanted = planned
            .iter()
            .filter(|p| p.disk.as_deref() == Some(disk.name.as_str()))
            .find_map(|p| p.ptable_type)
            .unwrap_or(PREFERRED_PTABLE_TYPE);

        let current = graph.partition_table_type(disk.sid);
        let partitions = graph.partitions(disk.sid);
        let replaceable = current.is_some_and(|t| t != wanted) && partitions.is_empty();
        if current.is_none() || replaceable {
            if !disk.is_partitionable() || (current.is_none() && graph.is_used(disk.sid)) {
                continue;
            }
            spaces.push(FreeSpace {
                disk_name: disk.name.clone(),
                disk_size,
                region: usable_region(disk_size, wanted),
                grain: DiskSize::b(DEFAULT_GRAIN),
                ptable_type: wanted,
                inside_extended: false,
                growing: false,
                reserved_for_growth: false,
                primaries_used: 0,
                extended_exists: false,
            });
            continue;
        }

        let growing_ends: Vec<DiskSize> = partitions
            .iter()
            .filter(|p| resized.contains(&p.sid))
            .filter_map(|p| p.as_partition())
            .map(|p| p.region.end())
            .collect();
        let reserved_ends: Vec<DiskSize> = partitions
            .iter()
            .filter(|p| {
                planned.iter().any(|planned| {
                    planned.resize
                        && planned.reuse.as_ref().and_then(|r| r.name()) == Some(p.name.as_str())
                        && graph.size(p.sid).is_some_and(|size| planned.size.min() > size)
                })
            })
            .filter_map(|p| p.as_partition())
            .map(|p| p.region.end())
            .collect();

        for slot in graph.unused_slots(disk.sid) {
            spaces.push(FreeSpace {
                disk_name: disk.name.clone(),
                disk_size,
                region: slot.region,
                grain: slot.grain,
                ptable_type: slot.table_type,
                inside_extended: slot.inside_extended,
                growing: growing_ends.contains(&slot.region.start),
                reserved_for_growth: reserved_ends.contains(&slot.region.start),
                primaries_used: graph.primary_slots_used(disk.sid),
                extended_exists: graph.extended_partition(disk.sid).is_some(),
            });
        }
    }
    spaces
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use devicegraph::fixtures;
    use layoutplan_api::planned::{PlannedSize, ReuseTarget};

    use super::*;

    fn request(min: DiskSize, max: DiskSize, weight: u32) -> SizeRequest {
        SizeRequest { min, max, weight }
    }

    #[test]
    fn test_water_fill() {
        let grain = DiskSize::mib(1);
        let sizes = water_fill(
            &[
                request(DiskSize::gib(1), DiskSize::UNLIMITED, 1),
                request(DiskSize::gib(1), DiskSize::UNLIMITED, 3),
            ],
            DiskSize::gib(10),
            grain,
        )
        .unwrap();
        assert_eq!(sizes, vec![DiskSize::gib(3), DiskSize::gib(7)]);

        // Capped devices leave their share to the others.
        let sizes = water_fill(
            &[
                request(DiskSize::gib(1), DiskSize::gib(2), 1),
                request(DiskSize::gib(1), DiskSize::UNLIMITED, 1),
            ],
            DiskSize::gib(10),
            grain,
        )
        .unwrap();
        assert_eq!(sizes, vec![DiskSize::gib(2), DiskSize::gib(8)]);

        // Without weights, devices stay at their minimum until nothing
        // weighted can grow.
        let sizes = water_fill(
            &[
                request(DiskSize::mib(512), DiskSize::gib(2), 0),
                request(DiskSize::gib(1), DiskSize::UNLIMITED, 1),
            ],
            DiskSize::gib(10),
            grain,
        )
        .unwrap();
        assert_eq!(sizes, vec![DiskSize::mib(512), DiskSize::gib(10) - DiskSize::mib(512)]);

        let sizes = water_fill(
            &[request(DiskSize::gib(1), DiskSize::gib(4), 0), request(DiskSize::gib(1), DiskSize::gib(2), 0)],
            DiskSize::gib(10),
            grain,
        )
        .unwrap();
        assert_eq!(sizes, vec![DiskSize::gib(4), DiskSize::gib(2)]);

        assert!(water_fill(&[request(DiskSize::gib(11), DiskSize::UNLIMITED, 1)], DiskSize::gib(10), grain).is_none());
    }

    #[test]
    fn test_water_fill_rounds_to_grain() {
        let sizes = water_fill(
            &[request(DiskSize::b(1), DiskSize::UNLIMITED, 1), request(DiskSize::b(1), DiskSize::UNLIMITED, 1)],
            DiskSize::mib(5) + DiskSize::kib(100),
            DiskSize::mib(1),
        )
        .unwrap();
        assert_eq!(sizes, vec![DiskSize::mib(3), DiskSize::mib(2)]);
    }

    #[test]
    fn test_free_spaces() {
        let graph = fixtures::from_yaml(indoc! {r#"
            disks:
              - name: /dev/sda
                size: 100 GiB
                partition_table: msdos
                partitions:
                  - { size: 20 GiB, id: linux, filesystem: ext4 }
                  - { start: 40 GiB, size: 40 GiB, type: extended }
                  - { size: 10 GiB, type: logical }
              - name: /dev/sdb
                size: 50 GiB
              - name: /dev/sdc
                size: 50 GiB
                filesystem: xfs
        "#})
        .unwrap();
        let disks = vec!["/dev/sda".to_owned(), "/dev/sdb".to_owned(), "/dev/sdc".to_owned()];

        let mut grow = PlannedPartition::new(PlannedId(1));
        grow.reuse = Some(ReuseTarget::Name("/dev/sda1".into()));
        grow.resize = true;
        grow.size = PlannedSize::fixed(DiskSize::gib(30));

        let spaces = free_spaces(&graph, &disks, &[grow], &BTreeSet::new());
        let summary: Vec<_> = spaces
            .iter()
            .map(|s| (s.disk_name.as_str(), s.region.start, s.inside_extended, s.reserved_for_growth))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("/dev/sda", DiskSize::gib(20) + DiskSize::mib(1), false, true),
                // Room of the EBR of the first logical partition.
                ("/dev/sda", DiskSize::gib(40), true, false),
                ("/dev/sda", DiskSize::gib(50) + DiskSize::mib(1), true, false),
                ("/dev/sda", DiskSize::gib(80), false, false),
                ("/dev/sdb", DiskSize::b(34 * 512), false, false),
            ]
        );
        assert_eq!(spaces[0].primaries_used, 2);
        assert!(spaces[0].extended_exists);
        assert_eq!(spaces[4].ptable_type, PartitionTableType::Gpt);
        assert_eq!(spaces[4].usable_size(), DiskSize::gib(50) - DiskSize::mib(2));
    }
}
