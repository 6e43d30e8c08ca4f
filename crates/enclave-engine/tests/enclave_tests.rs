//! Enclave Facade Tests
//!
//! Construction from configuration, run serialisation and plan
//! description.

mod common;

use std::sync::Arc;

use common::{enclave_with, enclave_with_modules, test_config, MockBackend};
use enclave_core::errors::ExErrorKind;
use enclave_engine::{
    Cancellation, Enclave, EngineConfig, EngineError, InMemoryModuleProvider, RunOptions,
};

const FIRST: &str = r#"add_service(service_id="a1", config=ServiceConfig(image="img:1"))
add_service(service_id="a2", config=ServiceConfig(image="img:1"))
"#;

const SECOND: &str = r#"add_service(service_id="b1", config=ServiceConfig(image="img:1"))
add_service(service_id="b2", config=ServiceConfig(image="img:1"))
"#;

#[tokio::test]
async fn test_concurrent_runs_do_not_interleave() {
    // GIVEN a backend that is slow to create containers
    let backend = Arc::new(MockBackend::new().with_create_delay_ms(20));
    let enclave = enclave_with(backend.clone());
    let cancel = Cancellation::new();

    // WHEN two runs are started together
    let (first, second) = tokio::join!(
        enclave.run_script(FIRST, "{}", RunOptions::default(), &cancel),
        enclave.run_script(SECOND, "{}", RunOptions::default(), &cancel),
    );

    // THEN both succeed and the second only started after the first finished
    assert!(first.is_success(), "{:?}", first.error());
    assert!(second.is_success(), "{:?}", second.error());
    assert_eq!(backend.created(), vec!["a1", "a2", "b1", "b2"]);
}

#[test]
fn test_invalid_subnet_is_a_config_error() {
    // GIVEN a configuration with a malformed subnet
    let config = EngineConfig {
        subnet: "10.0.0.0/33".to_string(),
        ..test_config()
    };

    // WHEN an enclave is created from it
    let result = Enclave::new(
        config,
        Arc::new(MockBackend::new()),
        Arc::new(InMemoryModuleProvider::new()),
    );

    // THEN creation fails with a config error
    assert!(matches!(result, Err(EngineError::Config { .. })));
}

#[test]
fn test_out_of_range_default_packet_loss_is_rejected() {
    let config = EngineConfig {
        default_connection_packet_loss: 150.0,
        ..test_config()
    };

    let result = Enclave::new(
        config,
        Arc::new(MockBackend::new()),
        Arc::new(InMemoryModuleProvider::new()),
    );

    assert!(matches!(result, Err(EngineError::Network(_))));
}

#[tokio::test]
async fn test_repartition_refused_when_partitioning_disabled() {
    // GIVEN an enclave without partitioning
    let config = EngineConfig {
        partitioning_enabled: false,
        ..test_config()
    };
    let enclave = Enclave::new(
        config,
        Arc::new(MockBackend::new()),
        Arc::new(InMemoryModuleProvider::new()),
    )
    .unwrap();
    let script = r#"add_service(service_id="a", config=ServiceConfig(image="img:1"))
repartition(partitions={"alone": ["a"]})
"#;

    // WHEN a script repartitions
    let result = enclave
        .run_script(script, "{}", RunOptions::default(), &Cancellation::new())
        .await;

    // THEN validation refuses the repartition
    assert_eq!(result.validation_errors.len(), 1);
    assert_eq!(
        result.validation_errors[0].kind(),
        ExErrorKind::PartitioningDisabled
    );
}

#[test]
fn test_describe_script_lists_services_artifacts_and_tasks() {
    // GIVEN a script pulling its service config from a module
    let modules = InMemoryModuleProvider::new().with_module(
        "lib.star",
        r#"WEB = ServiceConfig(image="nginx:1.25", ports={"http": PortSpec(number=80)}, env_vars={"MODE": "prod"})"#,
    );
    let enclave = enclave_with_modules(Arc::new(MockBackend::new()), modules);
    let script = r#"load("lib.star", "WEB")
add_service(service_id="web", config=WEB)
run_task(name="seed", image="alpine:3", command=["true"], store={"seed-data": "/out"})
store_service_files(service_id="web", src="/etc/nginx", name="nginx-conf")
"#;

    // WHEN it is described
    let description = enclave.describe_script(script, "{}").unwrap();
    let yaml = description.to_yaml().unwrap();

    // THEN the description lists what the plan would create
    assert_eq!(description.services.len(), 1);
    assert_eq!(description.services[0].image.as_deref(), Some("nginx:1.25"));
    assert_eq!(
        description.files_artifacts,
        vec!["seed-data".to_string(), "nginx-conf".to_string()]
    );
    assert_eq!(description.tasks[0].name, "seed");
    assert!(yaml.contains("http: 80/tcp"));
    assert!(yaml.contains("MODE: prod"));

    // AND nothing ran
    let state = enclave.network().snapshot().unwrap();
    assert!(state.service_ids().is_empty());
}

#[test]
fn test_describe_script_reports_interpretation_errors() {
    let enclave = enclave_with(Arc::new(MockBackend::new()));

    let err = enclave
        .describe_script("print(undefined_name)", "{}")
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::UndefinedName);
}
