use log::info;

use devicegraph::DeviceGraph;
use layoutplan_api::{
    error::{PlannerError, ProvisioningError, ReportError},
    planned::{PlannedBcache, ReuseTarget},
    Sid,
};

use super::{format_device, partition::reuse_name, Creator, CreatorResult};

/// Creates bcache devices. `members` holds the backing device followed by
/// the optional caching device.
pub struct BcacheCreator;

impl Creator for BcacheCreator {
    type Planned = PlannedBcache;

    fn create(&self, graph: DeviceGraph, planned: &PlannedBcache, members: &[Sid]) -> Result<CreatorResult, PlannerError> {
        let mut result = CreatorResult::new(graph);
        let error = || ProvisioningError::CreateBcache {
            name: planned.name.clone(),
        };
        let graph = &mut result.devicegraph;
        let backing = members.first().map(|sid| graph.plain_device(*sid)).structured(error())?;
        let caching = members.get(1).map(|sid| graph.plain_device(*sid));
        let bcache = graph
            .create_bcache(&planned.name, backing, caching, planned.cache_mode)
            .structured(error())?;
        info!(
            "Created bcache '{}' in {} mode{}",
            planned.name,
            planned.cache_mode,
            if caching.is_some() { "" } else { " without caching device" }
        );
        if !planned.is_partitioned() {
            format_device(graph, bcache, &planned.format, &planned.encryption).structured(error())?;
        }
        result.devices_map.insert(planned.planned_id, bcache);
        Ok(result)
    }

    fn reuse(&self, graph: DeviceGraph, planned: &PlannedBcache) -> Result<CreatorResult, PlannerError> {
        let mut result = CreatorResult::new(graph);
        let name = planned.reuse.as_ref().map(reuse_name).unwrap_or_else(|| planned.name.clone());
        let error = || ProvisioningError::ReuseDevice { name: name.clone() };
        let graph = &mut result.devicegraph;
        let bcache = match &planned.reuse {
            Some(ReuseTarget::Sid(sid)) => graph.device(*sid).filter(|d| d.as_bcache().is_some()),
            _ => graph.find_bcache(&name),
        }
        .map(|d| d.sid)
        .structured(error())?;
        if !planned.is_partitioned() {
            format_device(graph, bcache, &planned.format, &planned.encryption).structured(error())?;
        }
        result.devices_map.insert(planned.planned_id, bcache);
        Ok(result)
    }
}
