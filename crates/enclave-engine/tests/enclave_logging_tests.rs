#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;

use common::{enclave_with, MockBackend};
use enclave_core::logging_facility::test_capture::init_test_capture;
use enclave_core_types::schema::{
    EVENT_END, EVENT_END_ERROR, EVENT_START, FIELD_ERR_CODE, FIELD_RUN_ID, FIELD_TRACE_ID,
};
use enclave_core_types::TraceId;
use enclave_engine::{Cancellation, RunOptions};

#[tokio::test]
async fn test_run_boundaries_are_logged() {
    let capture = init_test_capture();
    let enclave = enclave_with(Arc::new(MockBackend::new()));

    let ok = enclave
        .run_script(
            r#"print("logged run")"#,
            "{}",
            RunOptions::default(),
            &Cancellation::new(),
        )
        .await;
    assert!(ok.is_success());

    capture.assert_event_exists("run_script", EVENT_START);
    capture.assert_event_exists("run_script", EVENT_END);
    let end = capture
        .events_for_op("run_script")
        .into_iter()
        .find(|e| e.event.as_deref() == Some(EVENT_END))
        .unwrap();
    assert!(end.field("duration_ms").is_some());
    assert_eq!(end.field("plan_len"), Some("1"));
}

#[tokio::test]
async fn test_failed_run_logs_error_code() {
    let capture = init_test_capture();
    let enclave = enclave_with(Arc::new(MockBackend::new()));

    let failed = enclave
        .run_bulk_commands(
            r#"{"schemaVersion": 0, "body": {"commands": [{"type": "TELEPORT", "args": {}}]}}"#,
            RunOptions::default(),
            &Cancellation::new(),
        )
        .await;
    assert!(!failed.is_success());

    let errors: Vec<_> = capture
        .events_for_op("run_bulk_commands")
        .into_iter()
        .filter(|e| e.event.as_deref() == Some(EVENT_END_ERROR))
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field(FIELD_ERR_CODE), Some("ERR_UNKNOWN_COMMAND"));
}

#[tokio::test]
async fn test_run_ids_reach_logs_and_errors() {
    // GIVEN a caller-supplied trace id
    let capture = init_test_capture();
    let enclave = enclave_with(Arc::new(MockBackend::new()));
    let options = RunOptions {
        trace_id: Some(TraceId::from_string("req-7".to_string())),
        ..RunOptions::default()
    };

    // WHEN a run fails validation
    let failed = enclave
        .run_script(
            r#"exec(service_id="traced-ghost", command=["ls"])"#,
            "{}",
            options,
            &Cancellation::new(),
        )
        .await;

    // THEN the error and the start event carry the same ids
    let err = failed.error().unwrap();
    assert_eq!(err.run_id(), Some(&failed.context.run_id));
    assert_eq!(err.trace_id().map(|t| t.as_str()), Some("req-7"));

    let start = capture
        .events_for_op("run_script")
        .into_iter()
        .find(|e| {
            e.event.as_deref() == Some(EVENT_START) && e.field(FIELD_TRACE_ID) == Some("req-7")
        })
        .unwrap();
    assert_eq!(
        start.field(FIELD_RUN_ID),
        Some(failed.context.run_id.as_str())
    );
}
