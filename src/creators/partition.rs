use log::{debug, info};

use devicegraph::{DeviceGraph, Region};
use layoutplan_api::{
    error::{InternalError, PlannerError, ProvisioningError, ReportError},
    planned::{PlannedPartition, ReuseTarget},
    DiskSize, Sid,
};
use sysdefs::partition_tables::PartitionType;

use super::{format_device, CreatorResult, PartitionTableCreator};
use crate::distribution::{AssignedSpace, PartitionsDistribution};

pub struct PartitionCreator;

impl PartitionCreator {
    /// Creates the partitions of a distribution, one free space after the
    /// other, creating partition tables and extended partitions as needed.
    #[tracing::instrument(skip_all)]
    pub fn create_partitions(
        &self,
        graph: DeviceGraph,
        distribution: &PartitionsDistribution,
    ) -> Result<CreatorResult, PlannerError> {
        let mut result = CreatorResult::new(graph);
        for assigned in &distribution.spaces {
            self.create_in_space(&mut result, assigned)?;
        }
        Ok(result)
    }

    fn create_in_space(&self, result: &mut CreatorResult, assigned: &AssignedSpace) -> Result<(), PlannerError> {
        let space = &assigned.space;
        let graph = &mut result.devicegraph;
        let device = graph
            .find_by_name(&space.disk_name)
            .map(|d| d.sid)
            .structured(InternalError::Internal("free space on a device missing from the graph"))?;
        let table_type = PartitionTableCreator.ensure(graph, device, space.ptable_type)?;

        let grain = space.grain;
        let end = space.region.end();
        let mut cursor = space.region.start.ceil(grain);
        let first_logical = assigned.partitions.len() - assigned.num_logical;

        let last = assigned.partitions.len().saturating_sub(1);
        for (index, (planned, size)) in assigned.partitions.iter().zip(&assigned.sizes).enumerate() {
            if index == first_logical && assigned.needs_extended() {
                graph
                    .create_partition(device, Region::from_bounds(cursor, end), PartitionType::Extended)
                    .structured(ProvisioningError::CreatePartitions)?;
            }
            let partition_type = assigned.partition_type_at(index).unwrap_or(PartitionType::Primary);
            if partition_type == PartitionType::Logical {
                cursor = (cursor + grain).ceil(grain);
            }
            let length = if index == last {
                let max = planned.size.resolve(space.disk_size).max_size();
                (end - cursor).min(max.max(*size))
            } else {
                *size
            };
            let sid = graph
                .create_partition(device, Region::new(cursor, length), partition_type)
                .structured(ProvisioningError::CreatePartitions)?;
            cursor = cursor + length;

            graph
                .set_partition_id(sid, planned.effective_partition_id())
                .structured(ProvisioningError::CreatePartitions)?;
            if planned.bootable && table_type.boot_flag_supported() {
                graph
                    .set_boot_flag(sid, true)
                    .structured(ProvisioningError::CreatePartitions)?;
            }
            format_device(graph, sid, &planned.format, &planned.encryption)
                .structured(ProvisioningError::CreatePartitions)?;
            debug!(
                "Planned partition {} is '{}'",
                planned.planned_id,
                graph.try_device(sid).map(|d| d.name.as_str()).unwrap_or_default()
            );
            result.devices_map.insert(planned.planned_id, sid);
        }
        info!("Created {} partitions on '{}'", assigned.partitions.len(), space.disk_name);
        Ok(())
    }

    /// Binds planned partitions to the existing partitions they reuse,
    /// resizing and formatting them as requested.
    #[tracing::instrument(skip_all)]
    pub fn reuse_partitions(
        &self,
        graph: DeviceGraph,
        partitions: &[PlannedPartition],
    ) -> Result<CreatorResult, PlannerError> {
        let mut result = CreatorResult::new(graph);
        for planned in partitions {
            let Some(reuse) = &planned.reuse else {
                continue;
            };
            let graph = &mut result.devicegraph;
            let sid = find_reused(graph, reuse).structured(ProvisioningError::ReuseDevice {
                name: reuse_name(reuse),
            })?;
            let name = graph.try_device(sid).map(|d| d.name.clone()).unwrap_or_default();

            if planned.resize {
                let target = reuse_target_size(graph, sid, planned);
                graph
                    .resize_partition(sid, target)
                    .structured(ProvisioningError::ResizeDevice { name: name.clone() })?;
            }
            if let Some(id) = planned.partition_id {
                graph
                    .set_partition_id(sid, id)
                    .structured(ProvisioningError::ReuseDevice { name: name.clone() })?;
            }
            format_device(graph, sid, &planned.format, &planned.encryption)
                .structured(ProvisioningError::ReuseDevice { name: name.clone() })?;
            debug!("Planned partition {} reuses '{name}'", planned.planned_id);
            result.devices_map.insert(planned.planned_id, sid);
        }
        Ok(result)
    }
}

/// Size for a reused partition planned with resize: grown into the space
/// after it when it has weight and room to grow, clamped to the planned
/// range otherwise.
fn reuse_target_size(graph: &DeviceGraph, sid: Sid, planned: &PlannedPartition) -> DiskSize {
    let current = graph.size(sid).unwrap_or(DiskSize::ZERO);
    let container = graph
        .partitionable_of(sid)
        .and_then(|d| graph.size(d.sid))
        .unwrap_or(current);
    let size = planned.size.resolve(container);
    let (min, max) = (size.min(), size.max_size());
    if size.effective_weight() > 0 && max > current {
        max.min(current + graph.space_after(sid)).max(min)
    } else {
        current.max(min).min(max)
    }
}

pub(crate) fn find_reused(graph: &DeviceGraph, reuse: &ReuseTarget) -> Option<Sid> {
    match reuse {
        ReuseTarget::Name(name) => graph.find_by_name(name).map(|d| d.sid),
        ReuseTarget::Sid(sid) => graph.contains(*sid).then_some(*sid),
    }
}

pub(crate) fn reuse_name(reuse: &ReuseTarget) -> String {
    match reuse {
        ReuseTarget::Name(name) => name.clone(),
        ReuseTarget::Sid(sid) => sid.to_string(),
    }
}
