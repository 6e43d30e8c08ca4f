//! Apply Atomicity Tests
//!
//! Verifies that `apply()` either performs the whole model effect of an
//! instruction or leaves the state untouched.

mod common;

use std::net::Ipv4Addr;

use common::{new_state, partitions, state_with_services};
use enclave_core::model::{Connection, ServiceState};
use enclave_core::{
    apply, Instruction, ModelEffect, NetworkError, RepartitionSpec, ServiceConfig,
};

#[test]
fn test_register_then_start_in_two_steps() {
    // GIVEN an empty network
    let mut state = new_state();

    // WHEN a service is registered
    let registered = apply(
        &mut state,
        &Instruction::RegisterService {
            service_id: "api".into(),
            partition_id: None,
        },
    )
    .unwrap();

    // THEN it gets the first address after the reserved gateway
    assert_eq!(
        registered,
        ModelEffect::Registered {
            service_id: "api".into(),
            ip: Ipv4Addr::new(10, 10, 0, 2)
        }
    );

    // AND starting it marks it started with the same IP
    let started = apply(
        &mut state,
        &Instruction::StartService {
            service_id: "api".into(),
            config: ServiceConfig::new("api:1"),
        },
    )
    .unwrap();
    assert!(matches!(started, ModelEffect::Started { ip, .. } if ip == Ipv4Addr::new(10, 10, 0, 2)));
    assert_eq!(
        state.service(&"api".into()).map(|r| r.state),
        Some(ServiceState::Started)
    );
}

#[test]
fn test_duplicate_add_fails_without_leaking_ip() {
    // GIVEN one started service
    let mut state = state_with_services(&["db"]);
    let before = state.clone();

    // WHEN the same id is added again
    let result = apply(
        &mut state,
        &Instruction::AddService {
            service_id: "db".into(),
            partition_id: None,
            config: ServiceConfig::new("postgres"),
        },
    );

    // THEN the error is typed and the state (including the IP pool) is unchanged
    assert!(matches!(result, Err(NetworkError::DuplicateServiceId { .. })));
    assert_eq!(state, before);
}

#[test]
fn test_start_unregistered_service_is_unknown() {
    let mut state = new_state();

    let result = apply(
        &mut state,
        &Instruction::StartService {
            service_id: "nope".into(),
            config: ServiceConfig::new("x"),
        },
    );

    assert!(matches!(result, Err(NetworkError::UnknownService { .. })));
}

#[test]
fn test_overlapping_repartition_is_rejected_atomically() {
    // GIVEN two services
    let mut state = state_with_services(&["a", "b"]);
    let before = state.clone();

    // WHEN one id is placed in two partitions
    let result = apply(
        &mut state,
        &Instruction::Repartition(RepartitionSpec {
            partitions: partitions(&[("x", &["a"]), ("y", &["a", "b"])]),
            connections: Default::default(),
            default_connection: Connection::blocked(),
        }),
    );

    // THEN PartitionOverlap is returned and nothing changed
    assert!(matches!(result, Err(NetworkError::PartitionOverlap { .. })));
    assert_eq!(state, before);
}

#[test]
fn test_store_files_requires_started_service() {
    // GIVEN a registered but not started service
    let mut state = new_state();
    state.register_service("db".into(), None).unwrap();
    let before = state.clone();

    // WHEN files are stored from it
    let result = apply(
        &mut state,
        &Instruction::StoreFilesArtifact {
            service_id: "db".into(),
            src_path: "/var/lib/data".to_string(),
            artifact_name: "dump".to_string(),
        },
    );

    // THEN it fails and no artifact is recorded
    assert!(matches!(result, Err(NetworkError::ServiceNotStarted { .. })));
    assert_eq!(state, before);
    assert!(!state.has_files_artifact("dump"));
}

#[test]
fn test_remove_then_reregister_same_id() {
    // GIVEN a started service
    let mut state = state_with_services(&["web"]);
    let ip = state.service(&"web".into()).unwrap().ip;

    // WHEN it is removed and registered again
    apply(
        &mut state,
        &Instruction::RemoveService {
            service_id: "web".into(),
        },
    )
    .unwrap();
    let again = state.register_service("web".into(), None).unwrap();

    // THEN the freed address is reused
    assert_eq!(again, ip);
}
