use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use devicegraph::DeviceGraph;
use layoutplan_api::{
    constants::PV_METADATA_SIZE,
    planned::{PlannedPartition, PlannedVg},
    DiskSize, Sid,
};
use sysdefs::partition_tables::PartitionType;

use super::{
    pv::{pv_attempts, PvAttempt, PvCheck},
    AssignedSpace, DistributionScore, FreeSpace, PartitionsDistribution,
};

/// Bound on the number of complete assignments looked at per attempt.
const MAX_EVALUATIONS: usize = 100_000;

/// Best way of placing the new partitions in the free spaces, or `None` if
/// they do not fit.
///
/// `vgs` are the new volume groups that need physical volumes; partitions
/// for them are synthesized and placed too.
#[tracing::instrument(skip_all)]
pub fn best_distribution(
    planned: &[PlannedPartition],
    spaces: &[FreeSpace],
    vgs: &[PlannedVg],
) -> Option<PartitionsDistribution> {
    for attempt in pv_attempts(vgs, spaces) {
        let mut partitions: Vec<PlannedPartition> =
            planned.iter().filter(|p| !p.is_reused()).cloned().collect();
        partitions.extend(attempt.partitions.iter().cloned());

        let mut search = Search::new(&partitions, spaces, &attempt);
        search.run(0);
        if search.evaluations >= MAX_EVALUATIONS {
            warn!("Stopped looking for distributions after {MAX_EVALUATIONS} candidates");
        }
        if let Some((score, distribution)) = search.best {
            debug!(
                "Best distribution uses {} spaces with {} gaps",
                score.spaces_count, score.gaps_count
            );
            return Some(distribution);
        }
    }
    debug!("No distribution found for {} partitions", planned.len());
    None
}

struct Search<'a> {
    partitions: &'a [PlannedPartition],
    spaces: &'a [FreeSpace],
    checks: &'a [PvCheck],

    /// Spaces every partition may go to.
    candidates: Vec<Vec<usize>>,

    assignment: Vec<usize>,

    /// Sum of the minimum sizes assigned to each space.
    load: Vec<DiskSize>,

    evaluations: usize,
    best: Option<(DistributionScore, PartitionsDistribution)>,
}

impl<'a> Search<'a> {
    fn new(partitions: &'a [PlannedPartition], spaces: &'a [FreeSpace], attempt: &'a PvAttempt) -> Self {
        let candidates = partitions
            .iter()
            .map(|p| {
                (0..spaces.len())
                    .filter(|&index| fits(p, &spaces[index], index, attempt))
                    .collect()
            })
            .collect();
        Self {
            partitions,
            spaces,
            checks: &attempt.checks,
            candidates,
            assignment: Vec::with_capacity(partitions.len()),
            load: vec![DiskSize::ZERO; spaces.len()],
            evaluations: 0,
            best: None,
        }
    }

    fn run(&mut self, next: usize) {
        if self.evaluations >= MAX_EVALUATIONS {
            return;
        }
        if next == self.partitions.len() {
            self.evaluate();
            return;
        }
        for i in 0..self.candidates[next].len() {
            let index = self.candidates[next][i];
            let space = &self.spaces[index];
            let min = min_size_in(&self.partitions[next], space);
            if self.load[index] + min > space.usable_size() {
                continue;
            }
            self.load[index] += min;
            self.assignment.push(index);
            self.run(next + 1);
            self.assignment.pop();
            self.load[index] -= min;
        }
    }

    fn evaluate(&mut self) {
        self.evaluations += 1;
        let Some(distribution) = self.build() else {
            return;
        };
        if !self.checks.iter().all(|c| c.holds(&distribution)) {
            return;
        }
        let score = distribution.score();
        if self.best.as_ref().map_or(true, |(best, _)| score < *best) {
            self.best = Some((score, distribution));
        }
    }

    fn build(&self) -> Option<PartitionsDistribution> {
        let mut groups: BTreeMap<usize, Vec<PlannedPartition>> = BTreeMap::new();
        for (partition, index) in self.partitions.iter().zip(&self.assignment) {
            groups.entry(*index).or_default().push(partition.clone());
        }

        let mut types = BTreeMap::new();
        let disks: BTreeSet<&str> = groups.keys().map(|i| self.spaces[*i].disk_name.as_str()).collect();
        for disk in disks {
            let used: Vec<(usize, &Vec<PlannedPartition>)> = groups
                .iter()
                .filter(|(i, _)| self.spaces[**i].disk_name == disk)
                .map(|(i, p)| (*i, p))
                .collect();
            types.extend(partition_types(self.spaces, &used)?);
        }

        let spaces = groups
            .into_iter()
            .map(|(index, partitions)| {
                let (partition_type, num_logical) = types.get(&index).copied().unwrap_or((None, 0));
                AssignedSpace::new(self.spaces[index].clone(), partitions, partition_type, num_logical)
            })
            .collect::<Option<Vec<_>>>()?;
        Some(PartitionsDistribution { spaces })
    }
}

fn fits(partition: &PlannedPartition, space: &FreeSpace, index: usize, attempt: &PvAttempt) -> bool {
    if let Some(pinned) = attempt.pins.get(&partition.planned_id) {
        return *pinned == index;
    }
    if space.reserved_for_growth || !space.ptable_type.is_user_partitionable() {
        return false;
    }
    if partition.disk.as_ref().is_some_and(|disk| *disk != space.disk_name) {
        return false;
    }
    if let Some(allowed) = attempt.allowed_disks.get(&partition.planned_id) {
        if !allowed.contains(&space.disk_name) {
            return false;
        }
    }
    if partition.primary && space.inside_extended {
        return false;
    }
    min_size_in(partition, space) <= space.usable_size()
}

fn min_size_in(partition: &PlannedPartition, space: &FreeSpace) -> DiskSize {
    partition.size.resolve(space.disk_size).min().ceil(space.grain)
}

/// Primary/logical layout of a used space: the type of its first
/// partitions and how many trailing ones are logical.
type SpaceLayout = (Option<PartitionType>, usize);

/// Layout of every used space of a disk. `None` if the table cannot hold
/// that many partitions.
fn partition_types(
    spaces: &[FreeSpace],
    used: &[(usize, &Vec<PlannedPartition>)],
) -> Option<BTreeMap<usize, SpaceLayout>> {
    let first = &spaces[used.first()?.0];
    let table = first.ptable_type;
    let outside: Vec<(usize, &Vec<PlannedPartition>)> = used
        .iter()
        .filter(|(i, _)| !spaces[*i].inside_extended)
        .copied()
        .collect();
    let new_primaries: usize = outside.iter().map(|(_, p)| p.len()).sum();
    let free_slots = table.max_primary().saturating_sub(first.primaries_used);

    if !table.extended_possible() {
        if new_primaries > free_slots {
            return None;
        }
        return Some(used.iter().map(|(i, _)| (*i, (None, 0))).collect());
    }

    let mut types: BTreeMap<usize, SpaceLayout> = used
        .iter()
        .filter(|(i, _)| spaces[*i].inside_extended)
        .map(|(i, p)| (*i, (Some(PartitionType::Logical), p.len())))
        .collect();
    if new_primaries <= free_slots {
        types.extend(outside.iter().map(|(i, _)| (*i, (Some(PartitionType::Primary), 0))));
        return Some(types);
    }
    if first.extended_exists || free_slots == 0 {
        return None;
    }

    // One space gets a new extended partition after its primaries. The
    // partitions that do not fit as primaries go there as logical ones.
    let slots = free_slots - 1;
    let mut container: Option<(usize, usize, usize)> = None;
    for (index, partitions) in &outside {
        let elsewhere = new_primaries - partitions.len();
        if elsewhere > slots {
            continue;
        }
        let primaries = partitions.len().min(slots - elsewhere);
        if partitions.iter().filter(|p| p.primary).count() > primaries {
            continue;
        }
        if container.map_or(true, |(_, len, _)| partitions.len() > len) {
            container = Some((*index, partitions.len(), partitions.len() - primaries));
        }
    }
    let (container, len, num_logical) = container?;
    for (index, _) in &outside {
        let layout = if *index != container {
            (Some(PartitionType::Primary), 0)
        } else if num_logical == len {
            (Some(PartitionType::Logical), num_logical)
        } else {
            (Some(PartitionType::Primary), num_logical)
        };
        types.insert(*index, layout);
    }
    Some(types)
}

/// Bytes to take from the end of an existing partition so that the planned
/// partitions fit. Returns the whole size of the partition when shrinking
/// it cannot free that much.
pub fn resizing_size(
    graph: &DeviceGraph,
    partition: Sid,
    planned: &[PlannedPartition],
    vgs: &[PlannedVg],
    spaces: &[FreeSpace],
) -> DiskSize {
    let Some(current) = graph.device(partition).and_then(|d| d.as_partition()) else {
        return DiskSize::ZERO;
    };
    let Some(disk) = graph.partitionable_of(partition) else {
        return current.region.length;
    };
    let grain = graph.grain(disk.sid);
    let logical = current.partition_type == PartitionType::Logical;

    // The space freed by a primary partition needs a primary slot.
    if !logical {
        let no_slot = graph
            .partition_table_type(disk.sid)
            .is_some_and(|table| graph.primary_slots_used(disk.sid) >= table.max_primary());
        if no_slot {
            return current.region.length;
        }
    }

    let mut mins: Vec<DiskSize> = planned
        .iter()
        .filter(|p| !p.is_reused())
        .filter(|p| p.disk.as_ref().map_or(true, |d| *d == disk.name))
        .map(|p| p.size.unresolved_min().ceil(grain))
        .collect();
    mins.extend(vgs.iter().map(|vg| (vg.lvs_min_size() + PV_METADATA_SIZE).ceil(grain)));
    if mins.is_empty() {
        return current.region.length;
    }
    let needed: DiskSize = mins.iter().sum();
    let largest = mins.iter().copied().max().unwrap_or(DiskSize::ZERO);

    let usable = spaces.iter().filter(|s| !s.reserved_for_growth);
    let available: DiskSize = usable.clone().map(FreeSpace::usable_size).sum();
    let adjacent = usable
        .filter(|s| s.inside_extended == logical)
        .find(|s| s.region.start == current.region.end())
        .map(FreeSpace::usable_size)
        .unwrap_or(DiskSize::ZERO);

    let mut shrink = (needed - available).max(largest - adjacent);
    if logical {
        shrink += grain;
    }
    let end = current.region.end();
    let new_end = (end - shrink).floor(grain);
    let reclaimed = end - new_end;
    if reclaimed + current.resize_info.min_size > current.region.length {
        current.region.length
    } else {
        reclaimed
    }
}
