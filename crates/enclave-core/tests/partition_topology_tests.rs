//! Partition topology scenarios
//!
//! 1. Failed repartition leaves the topology unchanged
//! 2. Same-partition connection is always unblocked
//! 3. Unlisted services fall into the default partition
//! 4. Connections naming undefined partitions are rejected

mod common;

use std::collections::BTreeMap;

use common::{partitions, state_with_services};
use enclave_core::model::{Connection, PartitionConnectionId, PartitionId, ServiceId};
use enclave_core::rules::validation::validate_topology;
use enclave_core::NetworkError;

#[test]
fn test_failed_repartition_with_unknown_service_changes_nothing() {
    // GIVEN three started services in the default partition
    let mut state = state_with_services(&["s1", "s2", "s3"]);
    let before = state.clone();

    // WHEN a repartition names an unknown service
    let result = state.repartition(
        partitions(&[("a", &["s1", "ghost"]), ("b", &["s2"])]),
        BTreeMap::new(),
        Connection::blocked(),
    );

    // THEN it fails with UnknownServiceInPartition and nothing moved
    assert!(matches!(
        result,
        Err(NetworkError::UnknownServiceInPartition { ref service_id, .. }) if service_id == "ghost"
    ));
    assert_eq!(state, before);
}

#[test]
fn test_failed_repartition_with_unknown_connection_partition_changes_nothing() {
    // GIVEN two services
    let mut state = state_with_services(&["s1", "s2"]);
    let before = state.clone();
    let mut connections = BTreeMap::new();
    connections.insert(
        PartitionConnectionId::new("a".into(), "nowhere".into()),
        Connection::unblocked(),
    );

    // WHEN a connection names an undefined partition
    let result = state.repartition(
        partitions(&[("a", &["s1"])]),
        connections,
        Connection::blocked(),
    );

    // THEN UnknownPartition is reported and the state is unchanged
    assert!(matches!(result, Err(NetworkError::UnknownPartition { .. })));
    assert_eq!(state, before);
}

#[test]
fn test_same_partition_always_unblocked() {
    // GIVEN services split across two partitions with everything blocked
    let mut state = state_with_services(&["s1", "s2", "s3", "s4"]);
    state
        .repartition(
            partitions(&[("a", &["s1", "s2"]), ("b", &["s3", "s4"])]),
            BTreeMap::new(),
            Connection::blocked(),
        )
        .unwrap();

    // THEN members of one partition reach each other
    for (x, y) in [("s1", "s2"), ("s3", "s4"), ("s2", "s1")] {
        let conn = state
            .connection_between(&ServiceId::from(x), &ServiceId::from(y))
            .unwrap();
        assert!(!conn.is_blocked(), "{} -> {} should be unblocked", x, y);
    }

    // AND members of different partitions do not
    assert!(state
        .connection_between(&"s1".into(), &"s3".into())
        .unwrap()
        .is_blocked());
}

#[test]
fn test_unlisted_services_land_in_default_partition() {
    // GIVEN three services
    let mut state = state_with_services(&["s1", "s2", "s3"]);

    // WHEN only s1 is placed explicitly
    state
        .repartition(
            partitions(&[("isolated", &["s1"])]),
            BTreeMap::new(),
            Connection::blocked(),
        )
        .unwrap();

    // THEN s2 and s3 share the default partition
    let default = PartitionId::default_partition();
    assert_eq!(state.partition_of(&"s2".into()), Some(&default));
    assert_eq!(state.partition_of(&"s3".into()), Some(&default));
    assert!(validate_topology(state.topology(), &state.service_ids()).is_ok());
}

#[test]
fn test_repartition_back_to_one_partition() {
    // GIVEN a split topology
    let mut state = state_with_services(&["service1", "service2", "service3"]);
    state
        .repartition(
            partitions(&[("p1", &["service1"]), ("p2", &["service2", "service3"])]),
            BTreeMap::new(),
            Connection::blocked(),
        )
        .unwrap();

    // WHEN everything is put back into one unblocked partition
    state
        .repartition(
            partitions(&[("p1", &["service1", "service2", "service3"])]),
            BTreeMap::new(),
            Connection::unblocked(),
        )
        .unwrap();

    // THEN all pairs are unblocked
    let ids: Vec<ServiceId> = state.service_ids().into_iter().collect();
    for a in &ids {
        for b in &ids {
            assert!(!state.connection_between(a, b).unwrap().is_blocked());
        }
    }
}

#[test]
fn test_removed_service_leaves_its_partition() {
    // GIVEN a service in a named partition
    let mut state = state_with_services(&["s1", "s2"]);
    state
        .repartition(
            partitions(&[("a", &["s1"])]),
            BTreeMap::new(),
            Connection::blocked(),
        )
        .unwrap();

    // WHEN it is removed
    state.remove_service(&"s1".into()).unwrap();

    // THEN the partition is empty but still defined
    let members = state.partitions().get(&PartitionId::from("a")).unwrap();
    assert!(members.is_empty());
    assert!(validate_topology(state.topology(), &state.service_ids()).is_ok());
}
