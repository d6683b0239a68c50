use log::{debug, warn};

use devicegraph::DeviceGraph;
use layoutplan_api::{
    error::{PlannerError, ProvisioningError, ReportError},
    Sid,
};
use sysdefs::partition_tables::PartitionTableType;

pub struct PartitionTableCreator;

impl PartitionTableCreator {
    /// Makes sure `device` has a partition table that can take new
    /// partitions, preferably of type `wanted`. Returns the type in use.
    pub fn ensure(
        &self,
        graph: &mut DeviceGraph,
        device: Sid,
        wanted: PartitionTableType,
    ) -> Result<PartitionTableType, PlannerError> {
        let name = graph
            .device(device)
            .map(|d| d.name.clone())
            .structured(ProvisioningError::CreatePartitionTable {
                disk: device.to_string(),
            })?;
        let error = || ProvisioningError::CreatePartitionTable { disk: name.clone() };

        match graph.partition_table_type(device) {
            Some(current) if current == wanted => return Ok(current),
            Some(current) if !graph.partitions(device).is_empty() => {
                warn!("Keeping {current} partition table of '{name}', {wanted} requested");
                return Ok(current);
            }
            Some(current) => {
                debug!("Replacing empty {current} partition table of '{name}'");
                graph.remove_partition_table(device).structured(error())?;
            }
            None => {
                if graph.is_used(device) {
                    graph.remove_descendants(device).structured(error())?;
                }
            }
        }
        debug!("Creating {wanted} partition table on '{name}'");
        graph.create_partition_table(device, wanted).structured(error())?;
        Ok(wanted)
    }
}
