use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use enclave_core::model::{Connection, PartitionId, ServiceIdSet};
use enclave_core::{apply, Instruction, NetworkSettings, NetworkState, ServiceConfig};

/// Settings for a /24 test subnet with the gateway reserved
#[allow(dead_code)]
pub fn test_settings() -> NetworkSettings {
    NetworkSettings {
        subnet: "10.10.0.0/24".parse().unwrap(),
        reserved_ips: vec![Ipv4Addr::new(10, 10, 0, 1)],
        partitioning_enabled: true,
        default_connection: Connection::unblocked(),
    }
}

#[allow(dead_code)]
pub fn new_state() -> NetworkState {
    NetworkState::new(test_settings())
}

/// Register and start each service through `apply()`
#[allow(dead_code)]
pub fn state_with_services(ids: &[&str]) -> NetworkState {
    let mut state = new_state();
    for id in ids {
        apply(
            &mut state,
            &Instruction::AddService {
                service_id: (*id).into(),
                partition_id: None,
                config: ServiceConfig::new("test/image:1"),
            },
        )
        .unwrap();
    }
    state
}

/// Build a partition map from `(partition, members)` pairs
#[allow(dead_code)]
pub fn partitions(spec: &[(&str, &[&str])]) -> BTreeMap<PartitionId, ServiceIdSet> {
    spec.iter()
        .map(|(pid, members)| ((*pid).into(), members.iter().copied().collect()))
        .collect()
}
