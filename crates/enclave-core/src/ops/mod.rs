pub mod ip_tracker;
pub mod network;
pub mod topology;

pub use ip_tracker::{FreeIpAddrTracker, Subnet};
pub use network::{NetworkSettings, NetworkState, ServiceNetwork};
pub use topology::PartitionTopology;
