use log::debug;

use devicegraph::{device::MountPoint, DeviceGraph};
use layoutplan_api::{
    error::{PlannerError, ProvisioningError, ReportError},
    planned::PlannedNfs,
    Sid,
};

use super::{Creator, CreatorResult};

pub struct NfsCreator;

impl NfsCreator {
    fn mount(&self, mut result: CreatorResult, planned: &PlannedNfs, nfs: Sid) -> Result<CreatorResult, PlannerError> {
        let mount_point = MountPoint {
            options: planned.fstab_options.clone(),
            ..MountPoint::new(planned.mount_point.clone())
        };
        result
            .devicegraph
            .set_mount_point(nfs, mount_point)
            .structured(ProvisioningError::CreateNfs { name: planned.share() })?;
        debug!("Mounting '{}' at '{}'", planned.share(), planned.mount_point);
        result.devices_map.insert(planned.planned_id, nfs);
        Ok(result)
    }
}

impl Creator for NfsCreator {
    type Planned = PlannedNfs;

    /// Creates the share, or takes the known one when `reuse` is set.
    fn create(&self, graph: DeviceGraph, planned: &PlannedNfs, _members: &[Sid]) -> Result<CreatorResult, PlannerError> {
        let mut result = CreatorResult::new(graph);
        let graph = &mut result.devicegraph;
        let existing = planned
            .reuse
            .then(|| graph.find_nfs(&planned.server, &planned.path).map(|d| d.sid))
            .flatten();
        let nfs = match existing {
            Some(nfs) => nfs,
            None => graph.create_nfs(&planned.server, &planned.path),
        };
        self.mount(result, planned, nfs)
    }

    fn reuse(&self, graph: DeviceGraph, planned: &PlannedNfs) -> Result<CreatorResult, PlannerError> {
        let nfs = graph
            .find_nfs(&planned.server, &planned.path)
            .map(|d| d.sid)
            .structured(ProvisioningError::ReuseDevice { name: planned.share() })?;
        self.mount(CreatorResult::new(graph), planned, nfs)
    }
}

#[cfg(test)]
mod tests {
    use layoutplan_api::PlannedId;

    use super::*;

    fn planned(reuse: bool) -> PlannedNfs {
        PlannedNfs {
            planned_id: PlannedId(1),
            server: "192.168.1.1".into(),
            path: "/home/a".into(),
            mount_point: "/home".into(),
            fstab_options: vec!["nolock".into()],
            reuse,
        }
    }

    #[test]
    fn test_create_and_reuse_nfs() {
        let graph = DeviceGraph::new();
        assert!(NfsCreator.reuse(graph.clone(), &planned(true)).is_err());

        let result = NfsCreator.create(graph, &planned(false), &[]).unwrap();
        let nfs = result.real(PlannedId(1)).unwrap();
        let device = result.devicegraph.device(nfs).unwrap();
        assert_eq!(device.name, "192.168.1.1:/home/a");
        let mount_point = device.mount_point().unwrap();
        assert_eq!(mount_point.path, "/home");
        assert_eq!(mount_point.options, vec!["nolock".to_owned()]);

        let again = NfsCreator.create(result.devicegraph.clone(), &planned(true), &[]).unwrap();
        assert_eq!(again.real(PlannedId(1)), Some(nfs));
        assert_eq!(again.devicegraph.len(), 1);

        let duplicated = NfsCreator.create(result.devicegraph, &planned(false), &[]).unwrap();
        assert_eq!(duplicated.devicegraph.len(), 2);
    }
}
