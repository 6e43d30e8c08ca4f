//! Script Interpretation Tests
//!
//! Script source plus run arguments in, plan out: builtins, `load()`,
//! `params()` and the errors interpretation can raise.

use enclave_core::errors::ExErrorKind;
use enclave_core::{Instruction, Plan};
use enclave_engine::interpreter::Interpreter;
use enclave_engine::{Cancellation, InMemoryModuleProvider, InterpretationError};

fn interpret_with(
    provider: &InMemoryModuleProvider,
    source: &str,
    args: &str,
) -> Result<Plan, InterpretationError> {
    Interpreter::new(provider).interpret("main.star", source, args, &Cancellation::new())
}

fn interpret(source: &str) -> Result<Plan, InterpretationError> {
    interpret_with(&InMemoryModuleProvider::new(), source, "{}")
}

#[test]
fn test_empty_ports_equal_omitted_ports() {
    // GIVEN two scripts differing only in an explicit empty port map
    let explicit = r#"add_service(service_id="a", config=ServiceConfig(image="img:1", ports={}))"#;
    let omitted = r#"add_service(service_id="a", config=ServiceConfig(image="img:1"))"#;

    // WHEN both are interpreted
    let explicit = interpret(explicit).unwrap();
    let omitted = interpret(omitted).unwrap();

    // THEN they produce the same instruction
    assert_eq!(
        explicit.get(1).map(|p| &p.instruction),
        omitted.get(1).map(|p| &p.instruction)
    );
}

#[test]
fn test_instructions_are_numbered_in_call_order_with_positions() {
    // GIVEN a script with three instruction calls
    let script = r#"db = add_service(service_id="db", config=ServiceConfig(image="postgres:16"))
print("db at", db.ip_address)
exec(service_id="db", command=["psql", "-c", "select 1"])
"#;

    // WHEN it is interpreted
    let plan = interpret(script).unwrap();

    // THEN numbering starts at 1 and each instruction knows its line
    let summary: Vec<(u32, &str, u32)> = plan
        .numbered()
        .map(|(n, p)| {
            (
                n,
                p.instruction.name(),
                p.position.as_ref().map(|pos| pos.line).unwrap_or(0),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![(1, "add_service", 1), (2, "print", 2), (3, "exec", 3)]
    );
    assert_eq!(
        plan.get(2).map(|p| &p.instruction),
        Some(&Instruction::Print {
            message: "db at {{service:db.ip_address}}".to_string()
        })
    );
}

#[test]
fn test_loaded_module_runs_once_before_the_loading_statement_continues() {
    // GIVEN a library that emits one instruction and exports a config
    let provider = InMemoryModuleProvider::new().with_module(
        "lib/db.star",
        r#"print("loading db library")
DB_CONFIG = ServiceConfig(image="postgres:16", ports={"pg": PortSpec(number=5432)})
_SECRET = "hidden"
"#,
    );
    let script = r#"load("lib/db.star", "DB_CONFIG")
load("lib/db.star", config="DB_CONFIG")
add_service(service_id="db", config=config)
"#;

    // WHEN the main script loads it twice
    let plan = interpret_with(&provider, script, "{}").unwrap();

    // THEN the module body ran once and its instruction came first
    assert_eq!(plan.len(), 2);
    let first = plan.get(1).unwrap();
    assert_eq!(first.instruction.name(), "print");
    assert_eq!(
        first.position.as_ref().map(|p| p.locator.as_str()),
        Some("lib/db.star")
    );
    assert!(matches!(
        plan.get(2).map(|p| &p.instruction),
        Some(Instruction::AddService { config, .. }) if config.ports.contains_key("pg")
    ));
}

#[test]
fn test_private_and_missing_symbols_are_rejected() {
    let provider = InMemoryModuleProvider::new().with_module("lib.star", "_hidden = 1\nshown = 2\n");

    let private = interpret_with(&provider, r#"load("lib.star", "_hidden")"#, "{}").unwrap_err();
    let missing = interpret_with(&provider, r#"load("lib.star", "absent")"#, "{}").unwrap_err();

    assert_eq!(private.kind(), ExErrorKind::SymbolNotFound);
    assert_eq!(missing.kind(), ExErrorKind::SymbolNotFound);
    assert!(missing.message().contains("absent"));
}

#[test]
fn test_missing_module_is_module_not_found() {
    // GIVEN no modules at all
    // WHEN the script loads one
    let err = interpret(r#"load("nowhere.star", "x")"#).unwrap_err();

    // THEN the error points at the load statement
    assert_eq!(err.kind(), ExErrorKind::ModuleNotFound);
    assert_eq!(
        err.position().map(|p| p.to_string()),
        Some("main.star:1:1".to_string())
    );
}

#[test]
fn test_load_cycle_is_detected() {
    // GIVEN two modules loading each other
    let provider = InMemoryModuleProvider::new()
        .with_module("a.star", "load(\"b.star\", \"b\")\na = 1\n")
        .with_module("b.star", "load(\"a.star\", \"a\")\nb = 2\n");

    // WHEN the main script loads one of them
    let err = interpret_with(&provider, r#"load("a.star", "a")"#, "{}").unwrap_err();

    // THEN the cycle is reported with its full chain
    assert_eq!(err.kind(), ExErrorKind::CycleDetected);
    assert!(err
        .message()
        .contains("main.star -> a.star -> b.star -> a.star"));
}

#[test]
fn test_duplicate_service_id_in_one_script() {
    let script = r#"add_service(service_id="x", config=ServiceConfig(image="a"))
add_service(service_id="x", config=ServiceConfig(image="b"))
"#;

    let err = interpret(script).unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::DuplicateServiceId);
    assert_eq!(err.position().map(|p| p.line), Some(2));
}

#[test]
fn test_removed_id_can_be_added_again() {
    let script = r#"add_service(service_id="x", config=ServiceConfig(image="a"))
remove_service(service_id="x")
add_service(service_id="x", config=ServiceConfig(image="b"))
"#;

    let plan = interpret(script).unwrap();

    assert_eq!(plan.len(), 3);
}

#[test]
fn test_params_validate_run_arguments() {
    // GIVEN a script declaring its arguments
    let script = r#"p = params(name="string", replicas="int?")
add_service(service_id=p["name"], config=ServiceConfig(image="img:1"))
print(p["replicas"])
"#;
    let provider = InMemoryModuleProvider::new();

    // WHEN it is run with and without valid arguments
    let ok = interpret_with(&provider, script, r#"{"name": "svc"}"#).unwrap();
    let missing = interpret_with(&provider, script, "{}").unwrap_err();
    let wrong_type = interpret_with(&provider, script, r#"{"name": "svc", "replicas": "3"}"#)
        .unwrap_err();

    // THEN only the valid arguments produce a plan
    assert_eq!(
        ok.get(1).and_then(|p| p.instruction.service_id()).map(|s| s.as_str()),
        Some("svc")
    );
    assert_eq!(
        ok.get(2).map(|p| p.instruction.to_string()),
        Some(r#"print(msg="None")"#.to_string())
    );
    assert_eq!(missing.kind(), ExErrorKind::InvalidArguments);
    assert_eq!(wrong_type.kind(), ExErrorKind::TypeMismatch);
}

#[test]
fn test_run_args_global_in_main_script() {
    let plan = interpret_with(
        &InMemoryModuleProvider::new(),
        r#"print(args["greeting"])"#,
        r#"{"greeting": "hello"}"#,
    )
    .unwrap();

    assert_eq!(
        plan.get(1).map(|p| &p.instruction),
        Some(&Instruction::Print {
            message: "hello".to_string()
        })
    );
}

#[test]
fn test_syntax_error_stops_before_any_instruction() {
    let err = interpret("print(\"a\")\nadd_service(service_id=\"x\"\n").unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Syntax);
}

#[test]
fn test_cancellation_is_checked_between_statements() {
    let cancel = Cancellation::new();
    cancel.cancel();

    let err = Interpreter::new(&InMemoryModuleProvider::new())
        .interpret("main.star", "print(1)", "{}", &cancel)
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Cancelled);
}

#[test]
fn test_deeply_nested_brackets_fail_instead_of_overflowing() {
    // GIVEN a script whose second line nests 3000 brackets
    let source = format!("print(1)\nx = {}0{}\n", "[".repeat(3000), "]".repeat(3000));

    // WHEN interpreted
    let err = interpret(&source).unwrap_err();

    // THEN it is refused as invalid input at that line
    assert_eq!(err.kind(), ExErrorKind::InvalidInput);
    let position = err.position().cloned().unwrap();
    assert_eq!(position.locator, "main.star");
    assert_eq!(position.line, 2);
}
