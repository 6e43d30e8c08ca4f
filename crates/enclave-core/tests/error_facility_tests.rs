use enclave_core::errors::{ExError, ExErrorKind, NetworkError};

#[test]
fn test_unknown_service_verifiable_by_kind() {
    let err = NetworkError::UnknownService {
        service_id: "unknown".to_string(),
    };

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::NotFound);
    assert_eq!(ex_err.code(), "ERR_NOT_FOUND");
    assert_eq!(ex_err.entity_id(), Some("unknown"));
}

#[test]
fn test_partition_overlap_structured_fields() {
    let err = NetworkError::PartitionOverlap {
        service_id: "s1".to_string(),
        first: "a".to_string(),
        second: "b".to_string(),
    };

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::PartitionOverlap);
    assert_eq!(ex_err.op(), Some("repartition"));
    assert_eq!(ex_err.entity_id(), Some("s1"));
    assert!(ex_err.message().contains("partition a"));
}

#[test]
fn test_lifecycle_errors_share_invalid_state() {
    let started: ExError = NetworkError::ServiceAlreadyStarted {
        service_id: "x".to_string(),
    }
    .into();
    let not_started: ExError = NetworkError::ServiceNotStarted {
        service_id: "x".to_string(),
    }
    .into();

    assert_eq!(started.kind(), ExErrorKind::InvalidState);
    assert_eq!(not_started.kind(), ExErrorKind::InvalidState);
    assert_ne!(started.message(), not_started.message());
}

#[test]
fn test_error_kind_code_mapping() {
    let kinds = vec![
        (ExErrorKind::NotFound, "ERR_NOT_FOUND"),
        (ExErrorKind::DuplicateServiceId, "ERR_DUPLICATE_SERVICE_ID"),
        (ExErrorKind::InvalidServiceId, "ERR_INVALID_SERVICE_ID"),
        (ExErrorKind::CycleDetected, "ERR_CYCLE_DETECTED"),
        (ExErrorKind::ImageUnavailable, "ERR_IMAGE_UNAVAILABLE"),
        (ExErrorKind::Backend, "ERR_BACKEND"),
    ];

    for (kind, expected_code) in kinds {
        assert_eq!(kind.code(), expected_code);
    }
}

#[test]
fn test_source_chain_is_exposed_through_std_error() {
    use std::error::Error;

    let cause: ExError = NetworkError::AddressSpaceExhausted {
        subnet: "10.0.0.0/30".to_string(),
    }
    .into();
    let err = ExError::new(ExErrorKind::Backend)
        .with_ordinal(4)
        .with_source(cause);

    let source = err.source().map(|s| s.to_string()).unwrap_or_default();
    assert!(source.contains("ERR_ADDRESS_SPACE_EXHAUSTED"));
    assert_eq!(err.ordinal(), Some(4));
    assert_eq!(err.root_cause().kind(), ExErrorKind::AddressSpaceExhausted);
}
