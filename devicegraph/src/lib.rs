//! In-memory model of the storage devices of a system.
//!
//! Devices are nodes of a [`petgraph::stable_graph::StableGraph`]. An edge
//! goes from a device to the device it is built upon, e.g. from a partition
//! to its partition table and from the table to the disk. Every device has a
//! [`Sid`](layoutplan_api::Sid) that survives copies and mutations of the
//! graph.

pub mod describe;
pub mod device;
pub mod error;
pub mod fixtures;
pub mod graph;
pub mod partitions;
pub mod region;
pub mod topology;

pub use device::{Device, DeviceKind, Holder};
pub use error::DeviceGraphError;
pub use graph::DeviceGraph;
pub use region::Region;
