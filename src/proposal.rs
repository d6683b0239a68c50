//! Unattended proposal: plans the devices of a profile and makes them real
//! on a copy of the device graph.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};
use serde::Serialize;

use devicegraph::{describe::Layout, DeviceGraph};
use layoutplan_api::{
    error::{InvalidInputError, PlannerError},
    issues::{DeviceShrinkage, Issue, IssuesList},
    planned::{DevicesPlan, PlannedDevice, PlannedPartition, PlannedVg},
    profile::PartitioningProfile,
    settings::SpaceSettings,
    volumes::VolumeSpecs,
    DiskSize, PlannedId, Sid,
};

use crate::{
    devices_creator::DevicesCreator,
    distribution::PartitionsDistribution,
    drives_map::DrivesMap,
    planners::{check_disk_use, drive_space_actions, DevicesPlanner},
    space_maker::{protected_devices, SpaceMaker, SpaceMakerResult},
    transaction::GraphTransaction,
};

/// Outcome of a successful proposal.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub devicegraph: DeviceGraph,
    pub planned: DevicesPlan,
    pub devices_map: BTreeMap<PlannedId, Sid>,
    pub shrinkages: Vec<DeviceShrinkage>,
    pub issues: IssuesList,
}

impl Proposal {
    /// Serializable summary of the proposal.
    pub fn report(&self) -> ProposalReport {
        ProposalReport {
            layout: Layout::new(&self.devicegraph),
            devices_map: self.devices_map.clone(),
            shrinkages: self.shrinkages.clone(),
            issues: self.issues.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposalReport {
    pub layout: Layout,

    /// Device created or reused for each planned device.
    pub devices_map: BTreeMap<PlannedId, Sid>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shrinkages: Vec<DeviceShrinkage>,

    pub issues: IssuesList,
}

pub struct AutoinstProposal<'a> {
    graph: &'a DeviceGraph,
    profile: &'a PartitioningProfile,
    settings: &'a SpaceSettings,
    volumes: &'a VolumeSpecs,
}

impl<'a> AutoinstProposal<'a> {
    pub fn new(
        graph: &'a DeviceGraph,
        profile: &'a PartitioningProfile,
        settings: &'a SpaceSettings,
        volumes: &'a VolumeSpecs,
    ) -> Self {
        Self {
            graph,
            profile,
            settings,
            volumes,
        }
    }

    /// Plans the devices of the profile, makes space for them and creates
    /// them. Nothing of the input graph is changed.
    #[tracing::instrument(skip_all)]
    pub fn propose(&self) -> Result<Proposal, PlannerError> {
        let mut issues = IssuesList::new();
        let drives = DrivesMap::new(self.graph, &self.profile.partitioning, &mut issues);
        check_disk_use(&drives, &mut issues);
        let plan = DevicesPlanner::new(self.graph, self.volumes).plan(&drives, &mut issues);
        if issues.has_fatal() {
            return Err(PlannerError::new(InvalidInputError::FatalIssues {
                count: issues.fatal_count(),
            }));
        }

        let mut settings = self.settings.clone();
        settings.actions.extend(drive_space_actions(self.graph, &drives));
        let disks = drives.disk_names();
        let protected = protected_devices(self.graph, &plan);
        debug!("Protecting {} device(s) from deletion", protected.len());

        let mut devicegraph = self.graph.clone();
        let mut transaction = GraphTransaction::begin(&mut devicegraph);
        let maker = SpaceMaker::new(&settings, protected);
        let (prepared, _) = maker.prepare(transaction.working(), &disks)?;
        transaction.replace(prepared);

        let partitions: Vec<PlannedPartition> = plan.partitions().cloned().collect();
        let vgs = vgs_without_members(&plan);
        let (space, flexible) = match maker.provide_space(transaction.working(), &disks, &partitions, &vgs) {
            Ok(space) => (space, false),
            Err(e) if e.is_no_disk_space() => {
                warn!("Planned devices do not fit, retrying with flexible sizes");
                let flexible = flexible_partitions(&partitions);
                (
                    maker.provide_space(transaction.working(), &disks, &flexible, &vgs)?,
                    true,
                )
            }
            Err(e) => return Err(e),
        };
        let SpaceMakerResult {
            graph,
            distribution,
            deleted,
            resized,
        } = space;
        info!("Made space: {} device(s) deleted, {} resized", deleted.len(), resized.len());

        let created = DevicesCreator::new(&plan, &distribution).populate(graph, &distribution)?;
        let mut shrinkages = created.shrinkages;
        if flexible {
            shrinkages.extend(partition_shrinkages(
                &created.devicegraph,
                &partitions,
                &distribution,
                &created.devices_map,
            ));
        }
        if !shrinkages.is_empty() {
            issues.push(Issue::ShrinkedPlannedDevices {
                shrinkages: shrinkages.clone(),
            });
        }
        transaction.replace(created.devicegraph);
        transaction.commit();

        Ok(Proposal {
            devicegraph,
            planned: plan,
            devices_map: created.devices_map,
            shrinkages,
            issues,
        })
    }
}

/// New volume groups whose physical volumes have to be synthesized.
fn vgs_without_members(plan: &DevicesPlan) -> Vec<PlannedVg> {
    let member_vgs: BTreeSet<String> = plan
        .all_devices()
        .iter()
        .filter_map(|device| match device {
            PlannedDevice::Disk(d) => d.member.lvm_volume_group_name.clone(),
            PlannedDevice::Partition(p) => p.member.lvm_volume_group_name.clone(),
            PlannedDevice::Md(md) => md.member.lvm_volume_group_name.clone(),
            PlannedDevice::Bcache(b) => b.member.lvm_volume_group_name.clone(),
            _ => None,
        })
        .collect();
    plan.vgs()
        .filter(|vg| !vg.is_reused() && !member_vgs.contains(&vg.volume_group_name))
        .cloned()
        .collect()
}

/// Copies of the partitions that accept any size down to their absolute
/// minimum, keeping their original minimum as weight (in MiB).
fn flexible_partitions(partitions: &[PlannedPartition]) -> Vec<PlannedPartition> {
    partitions
        .iter()
        .cloned()
        .map(|mut partition| {
            if partition.is_reused() || partition.size.percent().is_some() {
                return partition;
            }
            let original = partition.size.min();
            let absolute = partition.absolute_min_size().min(original);
            if partition.size.set_min(absolute).is_ok() {
                let weight = (original.bytes() / DiskSize::mib(1).bytes()).clamp(1, u32::MAX as u64);
                partition.size.set_weight(Some(weight as u32));
            }
            partition
        })
        .collect()
}

/// Partitions created smaller than their original minimum.
fn partition_shrinkages(
    graph: &DeviceGraph,
    original: &[PlannedPartition],
    distribution: &PartitionsDistribution,
    devices_map: &BTreeMap<PlannedId, Sid>,
) -> Vec<DeviceShrinkage> {
    let mut shrinkages = Vec::new();
    for assigned in &distribution.spaces {
        for partition in &assigned.partitions {
            let Some(planned) = original.iter().find(|p| p.planned_id == partition.planned_id) else {
                continue;
            };
            let Some(real) = devices_map.get(&planned.planned_id).copied() else {
                continue;
            };
            let min = planned.size.resolve(assigned.space.disk_size).min();
            let size = graph.size(real).unwrap_or(DiskSize::ZERO);
            if size < min {
                shrinkages.push(DeviceShrinkage {
                    planned: planned.planned_id,
                    real,
                    diff: min - size,
                });
            }
        }
    }
    shrinkages
}
