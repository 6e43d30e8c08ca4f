pub mod connection;
pub mod ids;
pub mod service;

pub use connection::{Connection, PartitionConnectionId};
pub use ids::{PartitionId, ServiceId, ServiceIdSet, DEFAULT_PARTITION_ID};
pub use service::{ContainerHandle, PortSpec, ServiceRecord, ServiceState, TransportProtocol};
