use devicegraph::{device::MountPoint, DeviceGraph, DeviceKind};
use layoutplan_api::{
    error::{PlannerError, ProvisioningError, ReportError},
    planned::PlannedTmpfs,
    Sid,
};

use super::{Creator, CreatorResult};

pub struct TmpfsCreator;

impl Creator for TmpfsCreator {
    type Planned = PlannedTmpfs;

    fn create(&self, graph: DeviceGraph, planned: &PlannedTmpfs, _members: &[Sid]) -> Result<CreatorResult, PlannerError> {
        let mut result = CreatorResult::new(graph);
        let tmpfs = result.devicegraph.create_tmpfs(MountPoint {
            options: planned.fstab_options.clone(),
            ..MountPoint::new(planned.mount_point.clone())
        });
        result.devices_map.insert(planned.planned_id, tmpfs);
        Ok(result)
    }

    /// Takes over a tmpfs already mounted at the planned mount point.
    fn reuse(&self, graph: DeviceGraph, planned: &PlannedTmpfs) -> Result<CreatorResult, PlannerError> {
        let tmpfs = graph
            .devices()
            .find(|d| matches!(&d.kind, DeviceKind::Tmpfs(t) if t.mount_point.path == planned.mount_point))
            .map(|d| d.sid)
            .structured(ProvisioningError::CreateTmpfs {
                name: planned.mount_point.clone(),
            })?;
        let mut result = CreatorResult::new(graph);
        result
            .devicegraph
            .set_mount_point(
                tmpfs,
                MountPoint {
                    options: planned.fstab_options.clone(),
                    ..MountPoint::new(planned.mount_point.clone())
                },
            )
            .structured(ProvisioningError::CreateTmpfs {
                name: planned.mount_point.clone(),
            })?;
        result.devices_map.insert(planned.planned_id, tmpfs);
        Ok(result)
    }
}
