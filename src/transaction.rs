use log::{debug, info};

use devicegraph::DeviceGraph;

/// Working copy of a device graph. Changes reach the original graph only on
/// [`GraphTransaction::commit`]; dropping the transaction discards them.
pub struct GraphTransaction<'a> {
    current: &'a mut DeviceGraph,
    working: DeviceGraph,
}

impl<'a> GraphTransaction<'a> {
    pub fn begin(current: &'a mut DeviceGraph) -> Self {
        let working = current.clone();
        Self { current, working }
    }

    pub fn working(&self) -> &DeviceGraph {
        &self.working
    }

    pub fn working_mut(&mut self) -> &mut DeviceGraph {
        &mut self.working
    }

    /// Adopts the graph produced by a step working on a copy.
    pub fn replace(&mut self, graph: DeviceGraph) {
        self.working = graph;
    }

    pub fn commit(self) {
        let added = self.working.sids_not_in(self.current).len();
        let removed = self.current.sids_not_in(&self.working).len();
        info!("Committing device graph: {added} device(s) added, {removed} removed");
        *self.current = self.working;
    }

    pub fn rollback(self) {
        debug!("Discarding device graph changes");
    }
}
