//! Physical volumes for new volume groups that have no member devices yet.

use std::collections::BTreeMap;

use layoutplan_api::{
    constants::PV_METADATA_SIZE,
    planned::{PlannedPartition, PlannedSize, PlannedVg, SizeStrategy},
    DiskSize, PlannedId, PlannedIdGenerator,
};

use super::{FreeSpace, PartitionsDistribution};

/// Synthesized physical volumes get ids from here on, far from the ids of
/// the devices planned from the profile.
pub const FIRST_PV_ID: u32 = 1_000_000;

/// One way of providing physical volumes to every volume group.
#[derive(Debug, Clone, Default)]
pub(super) struct PvAttempt {
    pub partitions: Vec<PlannedPartition>,

    /// Physical volumes bound to a given free space.
    pub pins: BTreeMap<PlannedId, usize>,

    /// Physical volumes restricted to some disks.
    pub allowed_disks: BTreeMap<PlannedId, Vec<String>>,

    pub checks: Vec<PvCheck>,
}

/// Space that a set of physical volumes must provide once sized.
#[derive(Debug, Clone)]
pub(super) struct PvCheck {
    pub vg_name: String,
    pub extent_size: DiskSize,
    pub needed: DiskSize,
    pub pvs: Vec<PlannedId>,
}

impl PvCheck {
    pub fn holds(&self, distribution: &PartitionsDistribution) -> bool {
        let available: DiskSize = distribution
            .spaces
            .iter()
            .flat_map(|s| s.partitions.iter().zip(&s.sizes))
            .filter(|(p, _)| self.pvs.contains(&p.planned_id))
            .map(|(_, size)| (*size - PV_METADATA_SIZE).floor(self.extent_size))
            .sum();
        available >= self.needed
    }
}

/// Attempts in order of preference. Volume groups that only need some space
/// first get a single physical volume; if that fails, one per free space.
pub(super) fn pv_attempts(vgs: &[PlannedVg], spaces: &[FreeSpace]) -> Vec<PvAttempt> {
    let split_needed = vgs.iter().any(|vg| vg.size_strategy == SizeStrategy::UseNeeded);
    let mut attempts = vec![build_attempt(vgs, spaces, false)];
    if split_needed {
        attempts.push(build_attempt(vgs, spaces, true));
    }
    attempts
}

fn build_attempt(vgs: &[PlannedVg], spaces: &[FreeSpace], split_needed: bool) -> PvAttempt {
    let mut ids = PlannedIdGenerator::starting_at(FIRST_PV_ID);
    let mut attempt = PvAttempt::default();
    for vg in vgs {
        let needed = vg.lvs_min_size();
        let max = vg.lvs_max_size();
        let weight = vg.lvs_weight().max(1);
        let pv_max = if max.is_unlimited() || vg.size_strategy == SizeStrategy::UseAvailable {
            DiskSize::UNLIMITED
        } else {
            max + PV_METADATA_SIZE
        };

        if vg.size_strategy == SizeStrategy::UseNeeded && !split_needed {
            let mut pv = new_pv(ids.next_id(), vg);
            pv.size = planned_size(needed + PV_METADATA_SIZE, pv_max, weight);
            if !vg.pvs_candidate_devices.is_empty() {
                attempt
                    .allowed_disks
                    .insert(pv.planned_id, vg.pvs_candidate_devices.clone());
            }
            attempt.partitions.push(pv);
            continue;
        }

        let pv_min = PV_METADATA_SIZE + vg.extent_size;
        let mut check = PvCheck {
            vg_name: vg.volume_group_name.clone(),
            extent_size: vg.extent_size,
            needed,
            pvs: Vec::new(),
        };
        for (index, space) in spaces.iter().enumerate() {
            let candidate = vg.pvs_candidate_devices.is_empty()
                || vg.pvs_candidate_devices.contains(&space.disk_name);
            if !candidate || space.reserved_for_growth || space.usable_size() < pv_min {
                continue;
            }
            let mut pv = new_pv(ids.next_id(), vg);
            pv.size = planned_size(pv_min, pv_max, weight);
            attempt.pins.insert(pv.planned_id, index);
            check.pvs.push(pv.planned_id);
            attempt.partitions.push(pv);
        }
        attempt.checks.push(check);
    }
    attempt
}

fn new_pv(planned_id: PlannedId, vg: &PlannedVg) -> PlannedPartition {
    let mut pv = PlannedPartition::new(planned_id);
    pv.member.lvm_volume_group_name = Some(vg.volume_group_name.clone());
    pv
}

fn planned_size(min: DiskSize, max: DiskSize, weight: u32) -> PlannedSize {
    PlannedSize::new(min, max.max(min))
        .unwrap_or_else(|_| PlannedSize::fixed(min))
        .with_weight(weight)
}

#[cfg(test)]
mod tests {
    use layoutplan_api::planned::PlannedLv;

    use super::*;

    fn vg(strategy: SizeStrategy) -> PlannedVg {
        let mut vg = PlannedVg::new(PlannedId(1), "system");
        let mut root = PlannedLv::new(PlannedId(2), "root");
        root.size = PlannedSize::new(DiskSize::gib(10), DiskSize::gib(20)).unwrap();
        vg.lvs.push(root);
        vg.size_strategy = strategy;
        vg
    }

    fn space(disk: &str) -> FreeSpace {
        FreeSpace {
            disk_name: disk.into(),
            disk_size: DiskSize::gib(100),
            region: devicegraph::Region::new(DiskSize::mib(1), DiskSize::gib(99)),
            grain: DiskSize::mib(1),
            ptable_type: sysdefs::partition_tables::PartitionTableType::Gpt,
            inside_extended: false,
            growing: false,
            reserved_for_growth: false,
            primaries_used: 0,
            extended_exists: false,
        }
    }

    #[test]
    fn test_use_needed() {
        let spaces = vec![space("/dev/sda"), space("/dev/sdb")];
        let attempts = pv_attempts(&[vg(SizeStrategy::UseNeeded)], &spaces);
        assert_eq!(attempts.len(), 2);

        let single = &attempts[0];
        assert_eq!(single.partitions.len(), 1);
        let pv = &single.partitions[0];
        assert_eq!(pv.planned_id, PlannedId(FIRST_PV_ID));
        assert_eq!(pv.size.min(), DiskSize::gib(10) + PV_METADATA_SIZE);
        assert_eq!(pv.size.max_size(), DiskSize::gib(20) + PV_METADATA_SIZE);
        assert_eq!(pv.member.lvm_volume_group_name.as_deref(), Some("system"));
        assert!(single.pins.is_empty());
        assert!(single.checks.is_empty());

        let split = &attempts[1];
        assert_eq!(split.partitions.len(), 2);
        assert_eq!(split.pins.values().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(split.checks[0].needed, DiskSize::gib(10));
    }

    #[test]
    fn test_use_available() {
        let mut vg = vg(SizeStrategy::UseAvailable);
        vg.pvs_candidate_devices = vec!["/dev/sdb".into()];
        let spaces = vec![space("/dev/sda"), space("/dev/sdb")];
        let attempts = pv_attempts(&[vg], &spaces);
        assert_eq!(attempts.len(), 1);
        let attempt = &attempts[0];
        assert_eq!(attempt.partitions.len(), 1);
        assert!(attempt.partitions[0].size.max_size().is_unlimited());
        assert_eq!(attempt.pins.get(&PlannedId(FIRST_PV_ID)), Some(&1));
    }
}
