use std::collections::BTreeSet;

use log::{debug, info, warn};

use devicegraph::{device::LvKind, DeviceGraph};
use layoutplan_api::{
    error::{PlannerError, ProvisioningError, ReportError},
    planned::{LvType, MakeSpacePolicy, PlannedLv, PlannedVg, ReuseTarget},
    DiskSize, Sid,
};

use super::{check_size, format_device, partition::reuse_name, Creator, CreatorResult};
use crate::distribution::{water_fill, SizeRequest};

/// Creates volume groups and their logical volumes.
pub struct LvmCreator;

impl Creator for LvmCreator {
    type Planned = PlannedVg;

    fn create(&self, graph: DeviceGraph, planned: &PlannedVg, members: &[Sid]) -> Result<CreatorResult, PlannerError> {
        let mut result = CreatorResult::new(graph);
        let error = || ProvisioningError::CreateLvm {
            name: planned.volume_group_name.clone(),
        };
        let graph = &mut result.devicegraph;
        let vg = graph.create_vg(&planned.volume_group_name, planned.extent_size);
        for member in members {
            let pv = graph.plain_device(*member);
            graph.add_pv(vg, pv).structured(error())?;
        }
        info!(
            "Created volume group '{}' of {} over {} devices",
            planned.volume_group_name,
            graph.vg_size(vg),
            members.len()
        );
        result.devices_map.insert(planned.planned_id, vg);
        create_lvs(result, planned, vg)
    }

    fn reuse(&self, graph: DeviceGraph, planned: &PlannedVg) -> Result<CreatorResult, PlannerError> {
        let mut result = CreatorResult::new(graph);
        let name = planned
            .reuse
            .as_ref()
            .map(reuse_name)
            .unwrap_or_else(|| planned.volume_group_name.clone());
        let graph = &mut result.devicegraph;
        let vg = match &planned.reuse {
            Some(ReuseTarget::Sid(sid)) => graph.device(*sid).filter(|d| d.as_vg().is_some()),
            Some(ReuseTarget::Name(name)) => graph.find_vg(name.trim_start_matches("/dev/")),
            None => graph.find_vg(&planned.volume_group_name),
        }
        .map(|d| d.sid)
        .structured(ProvisioningError::ReuseDevice { name: name.clone() })?;

        if planned.make_space_policy == MakeSpacePolicy::Remove {
            let mut keep = BTreeSet::new();
            for lv in planned.lvs.iter().filter(|lv| lv.is_reused()) {
                if let Some(sid) = lv.reuse.as_ref().and_then(|r| find_lv(graph, vg, r)) {
                    keep.insert(sid);
                    keep.extend(graph.ancestors(sid));
                }
            }
            let unknown: Vec<Sid> = graph
                .vg_lvs(vg)
                .iter()
                .map(|d| d.sid)
                .filter(|sid| !keep.contains(sid))
                .collect();
            for lv in unknown {
                if graph.contains(lv) {
                    debug!("Removing logical volume {lv} from reused volume group '{name}'");
                    graph
                        .remove_device(lv)
                        .structured(ProvisioningError::DeleteDevice { name: lv.to_string() })?;
                }
            }
        }
        result.devices_map.insert(planned.planned_id, vg);
        create_lvs(result, planned, vg)
    }
}

fn find_lv(graph: &DeviceGraph, vg: Sid, reuse: &ReuseTarget) -> Option<Sid> {
    graph
        .vg_lvs(vg)
        .into_iter()
        .find(|d| match reuse {
            ReuseTarget::Sid(sid) => d.sid == *sid,
            ReuseTarget::Name(name) => {
                d.name == *name || d.as_lv().is_some_and(|lv| lv.lv_name == *name)
            }
        })
        .map(|d| d.sid)
}

fn create_lvs(mut result: CreatorResult, vg: &PlannedVg, vg_sid: Sid) -> Result<CreatorResult, PlannerError> {
    let extent = vg.extent_size;
    let vg_size = result.devicegraph.vg_size(vg_sid);

    for lv in vg.lvs.iter().filter(|lv| lv.is_reused()) {
        reuse_lv(&mut result, lv, vg_sid, vg_size, extent)?;
    }

    let new_lvs: Vec<&PlannedLv> = vg.space_lvs().filter(|lv| !lv.is_reused()).collect();
    let available = result.devicegraph.vg_free(vg_sid);
    let sizes = lv_sizes(&new_lvs, vg_size, available, extent)?;
    for (lv, size) in new_lvs.iter().zip(sizes) {
        let kind = if lv.is_thin_pool() { LvKind::ThinPool } else { LvKind::Normal };
        let graph = &mut result.devicegraph;
        let sid = graph
            .create_lv(vg_sid, &lv.logical_volume_name, size, kind)
            .structured(create_error(vg))?;
        if let Some(stripes) = lv.stripes.filter(|s| *s > 1) {
            graph
                .set_lv_stripes(sid, stripes, lv.stripe_size)
                .structured(create_error(vg))?;
        }
        if !lv.is_thin_pool() {
            format_device(graph, sid, &lv.format, &lv.encryption).structured(create_error(vg))?;
        }
        let planned_min = lv.size.resolve(vg_size).min().ceil(extent);
        if let Some(shrinkage) = check_size(lv.planned_id, sid, planned_min, size, lv.absolute_min_size())? {
            warn!("Logical volume '{}' is {} smaller than planned", lv.logical_volume_name, shrinkage.diff);
            result.shrinkages.push(shrinkage);
        }
        result.devices_map.insert(lv.planned_id, sid);
    }

    for lv in vg.lvs.iter().filter(|lv| lv.is_thin() && !lv.is_reused()) {
        let LvType::Thin { pool } = &lv.lv_type else {
            continue;
        };
        let graph = &mut result.devicegraph;
        let pool_sid = graph
            .vg_lvs(vg_sid)
            .into_iter()
            .find(|d| d.as_lv().is_some_and(|l| l.lv_name == *pool && l.lv_kind == LvKind::ThinPool))
            .map(|d| d.sid)
            .structured(create_error(vg))?;
        let size = lv.size.resolve(vg_size);
        let size = if size.max_size().is_unlimited() { size.min() } else { size.max_size() };
        let sid = graph
            .create_thin_lv(pool_sid, &lv.logical_volume_name, size)
            .structured(create_error(vg))?;
        format_device(graph, sid, &lv.format, &lv.encryption).structured(create_error(vg))?;
        result.devices_map.insert(lv.planned_id, sid);
    }
    Ok(result)
}

fn create_error(vg: &PlannedVg) -> ProvisioningError {
    ProvisioningError::CreateLvm {
        name: vg.volume_group_name.clone(),
    }
}

fn reuse_lv(
    result: &mut CreatorResult,
    lv: &PlannedLv,
    vg: Sid,
    vg_size: DiskSize,
    extent: DiskSize,
) -> Result<(), PlannerError> {
    let Some(reuse) = &lv.reuse else {
        return Ok(());
    };
    let error = || ProvisioningError::ReuseDevice { name: reuse_name(reuse) };
    let graph = &mut result.devicegraph;
    let sid = find_lv(graph, vg, reuse).structured(error())?;
    if lv.resize {
        let current = graph.size(sid).unwrap_or(DiskSize::ZERO);
        let size = lv.size.resolve(vg_size);
        let (min, max) = (size.min(), size.max_size());
        let target = if size.effective_weight() > 0 && max > current {
            max.min(current + graph.vg_free(vg)).max(min)
        } else {
            current.max(min).min(max)
        };
        let target = target.floor(extent);
        if target != current {
            graph
                .resize_lv(sid, target)
                .structured(ProvisioningError::ResizeDevice { name: reuse_name(reuse) })?;
        }
    }
    if !lv.is_thin_pool() {
        format_device(graph, sid, &lv.format, &lv.encryption).structured(error())?;
    }
    result.devices_map.insert(lv.planned_id, sid);
    Ok(())
}

/// Sizes of the new logical volumes. When their minimums do not fit, all of
/// them are shrunk proportionally, never below their absolute minimum.
fn lv_sizes(
    lvs: &[&PlannedLv],
    vg_size: DiskSize,
    available: DiskSize,
    extent: DiskSize,
) -> Result<Vec<DiskSize>, PlannerError> {
    let requests: Vec<SizeRequest> = lvs
        .iter()
        .map(|lv| {
            let size = lv.size.resolve(vg_size);
            SizeRequest {
                min: size.min().ceil(extent),
                max: size.max_size(),
                weight: size.effective_weight(),
            }
        })
        .collect();
    if let Some(sizes) = water_fill(&requests, available, extent) {
        return Ok(sizes);
    }

    let total_min: u128 = requests.iter().map(|r| r.min.bytes() as u128).sum();
    let sizes: Vec<DiskSize> = requests
        .iter()
        .zip(lvs)
        .map(|(request, lv)| {
            let scaled = request.min.bytes() as u128 * available.bytes() as u128 / total_min.max(1);
            DiskSize::b(scaled as u64)
                .floor(extent)
                .max(lv.absolute_min_size().ceil(extent))
        })
        .collect();
    let needed: DiskSize = sizes.iter().sum();
    if needed > available {
        return Err(PlannerError::new(ProvisioningError::NoDiskSpace {
            missing: needed - available,
        }));
    }
    debug!("Logical volumes shrunk to fit in {available}");
    Ok(sizes)
}
