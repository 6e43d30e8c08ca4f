//! Builtin functions
//!
//! Instruction builtins check the shape and types of their arguments, emit
//! exactly one instruction and return a value the script can keep using.
//! Whether the instruction can actually run against the enclave is decided
//! later by the validator.

use std::collections::BTreeMap;

use enclave_core::errors::ExErrorKind;
use enclave_core::instruction::{Instruction, RepartitionSpec, ServiceConfig, TaskConfig};
use enclave_core::model::{
    Connection, PartitionId, PortSpec, ServiceId, ServiceIdSet, TransportProtocol,
};
use enclave_core::plan::SourcePosition;

use super::value::{ServiceRef, Value};
use crate::errors::InterpretationError;
use crate::plan_builder::{self, invalid_arguments, PlanBuilder};

type Result<T> = std::result::Result<T, InterpretationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    ServiceConfig,
    PortSpec,
    Connection,
    RegisterService,
    StartService,
    AddService,
    RemoveService,
    Repartition,
    Exec,
    WaitForHttpEndpoint,
    StoreServiceFiles,
    RunTask,
    Print,
    Params,
    Str,
    Len,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Builtin> {
        let builtin = match name {
            "ServiceConfig" => Builtin::ServiceConfig,
            "PortSpec" => Builtin::PortSpec,
            "Connection" => Builtin::Connection,
            "register_service" => Builtin::RegisterService,
            "start_service" => Builtin::StartService,
            "add_service" => Builtin::AddService,
            "remove_service" => Builtin::RemoveService,
            "repartition" => Builtin::Repartition,
            "exec" => Builtin::Exec,
            "wait_for_http_endpoint" => Builtin::WaitForHttpEndpoint,
            "store_service_files" => Builtin::StoreServiceFiles,
            "run_task" => Builtin::RunTask,
            "print" => Builtin::Print,
            "params" => Builtin::Params,
            "str" => Builtin::Str,
            "len" => Builtin::Len,
            _ => return None,
        };
        Some(builtin)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::ServiceConfig => "ServiceConfig",
            Builtin::PortSpec => "PortSpec",
            Builtin::Connection => "Connection",
            Builtin::RegisterService => "register_service",
            Builtin::StartService => "start_service",
            Builtin::AddService => "add_service",
            Builtin::RemoveService => "remove_service",
            Builtin::Repartition => "repartition",
            Builtin::Exec => "exec",
            Builtin::WaitForHttpEndpoint => "wait_for_http_endpoint",
            Builtin::StoreServiceFiles => "store_service_files",
            Builtin::RunTask => "run_task",
            Builtin::Print => "print",
            Builtin::Params => "params",
            Builtin::Str => "str",
            Builtin::Len => "len",
        }
    }
}

/// Evaluated arguments of one call
#[derive(Debug, Default)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub named: Vec<(String, Value)>,
}

pub struct BuiltinContext<'a> {
    pub emitter: &'a mut PlanBuilder,
    pub run_args: &'a Value,
    pub position: SourcePosition,
}

/// Call a builtin
///
/// # Errors
///
/// `InvalidArguments` or `TypeMismatch` for malformed arguments,
/// `DuplicateServiceId` for an id the script already declared.
pub fn call(builtin: Builtin, args: CallArgs, ctx: &mut BuiltinContext<'_>) -> Result<Value> {
    match builtin {
        Builtin::ServiceConfig => service_config(args),
        Builtin::PortSpec => port_spec(args),
        Builtin::Connection => connection(args),
        Builtin::RegisterService => register_service(args, ctx),
        Builtin::StartService => start_service(args, ctx),
        Builtin::AddService => add_service(args, ctx),
        Builtin::RemoveService => remove_service(args, ctx),
        Builtin::Repartition => repartition(args, ctx),
        Builtin::Exec => exec(args, ctx),
        Builtin::WaitForHttpEndpoint => wait_for_http_endpoint(args, ctx),
        Builtin::StoreServiceFiles => store_service_files(args, ctx),
        Builtin::RunTask => run_task(args, ctx),
        Builtin::Print => print(args, ctx),
        Builtin::Params => params(args, ctx.run_args),
        Builtin::Str => {
            let mut bound = Bound::bind("str", &["value"], args)?;
            let value = bound.required("value")?;
            Ok(Value::String(value.to_str()))
        }
        Builtin::Len => {
            let mut bound = Bound::bind("len", &["value"], args)?;
            let len = match bound.required("value")? {
                Value::String(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Dict(entries) => entries.len(),
                other => {
                    return Err(type_mismatch(format!(
                        "len() argument of type '{}' has no length",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Int(len as i64))
        }
    }
}

// ===== Value builtins =====

fn service_config(args: CallArgs) -> Result<Value> {
    let mut bound = Bound::bind(
        "ServiceConfig",
        &[
            "image",
            "ports",
            "entrypoint",
            "cmd",
            "env_vars",
            "files",
            "data_dir_mount",
        ],
        args,
    )?;
    let image = bound.required_string("image")?;
    plan_builder::require_image("ServiceConfig()", &image)?;
    let config = ServiceConfig {
        image,
        ports: bound.port_map("ports")?,
        entrypoint: bound.string_list("entrypoint")?,
        cmd: bound.string_list("cmd")?,
        env: bound.string_map("env_vars")?,
        files: bound.string_map("files")?,
        data_dir_mount: bound.optional_string("data_dir_mount")?,
    };
    Ok(Value::ServiceConfig(Box::new(config)))
}

fn port_spec(args: CallArgs) -> Result<Value> {
    let mut bound = Bound::bind(
        "PortSpec",
        &["number", "transport_protocol", "application_protocol"],
        args,
    )?;
    let number = bound.port_number("number")?;
    let transport_protocol = match bound.optional_string("transport_protocol")? {
        None => TransportProtocol::Tcp,
        Some(name) => TransportProtocol::parse(&name).ok_or_else(|| {
            invalid_arguments(format!(
                "PortSpec() unknown transport protocol '{}' (expected TCP, UDP or SCTP)",
                name
            ))
        })?,
    };
    Ok(Value::PortSpec(PortSpec {
        number,
        transport_protocol,
        application_protocol: bound.optional_string("application_protocol")?,
    }))
}

fn connection(args: CallArgs) -> Result<Value> {
    let mut bound = Bound::bind("Connection", &["packet_loss_percentage", "blocked"], args)?;
    let blocked = bound.bool("blocked", false)?;
    let percentage = bound.float("packet_loss_percentage", 0.0)?;
    let conn = if blocked {
        Connection::blocked()
    } else {
        Connection::with_packet_loss(percentage as f32)?
    };
    Ok(Value::Connection(conn))
}

// ===== Instruction builtins =====

fn register_service(args: CallArgs, ctx: &mut BuiltinContext<'_>) -> Result<Value> {
    let mut bound = Bound::bind("register_service", &["service_id", "partition_id"], args)?;
    let service_id = bound.service_id("service_id")?;
    let partition_id = bound.partition_id("partition_id")?;
    ctx.emitter.declare(&service_id)?;
    ctx.emitter.emit(
        Instruction::RegisterService {
            service_id: service_id.clone(),
            partition_id,
        },
        &ctx.position,
    );
    Ok(Value::Service(ServiceRef {
        service_id,
        ports: BTreeMap::new(),
    }))
}

fn start_service(args: CallArgs, ctx: &mut BuiltinContext<'_>) -> Result<Value> {
    let mut bound = Bound::bind("start_service", &["service_id", "config"], args)?;
    let service_id = bound.service_id("service_id")?;
    let config = bound.service_config("config")?;
    let ports = config.ports.clone();
    ctx.emitter.emit(
        Instruction::StartService {
            service_id: service_id.clone(),
            config,
        },
        &ctx.position,
    );
    Ok(Value::Service(ServiceRef { service_id, ports }))
}

fn add_service(args: CallArgs, ctx: &mut BuiltinContext<'_>) -> Result<Value> {
    let mut bound = Bound::bind(
        "add_service",
        &["service_id", "config", "partition_id"],
        args,
    )?;
    let service_id = bound.service_id("service_id")?;
    let config = bound.service_config("config")?;
    let partition_id = bound.partition_id("partition_id")?;
    ctx.emitter.declare(&service_id)?;
    let ports = config.ports.clone();
    ctx.emitter.emit(
        Instruction::AddService {
            service_id: service_id.clone(),
            partition_id,
            config,
        },
        &ctx.position,
    );
    Ok(Value::Service(ServiceRef { service_id, ports }))
}

fn remove_service(args: CallArgs, ctx: &mut BuiltinContext<'_>) -> Result<Value> {
    let mut bound = Bound::bind("remove_service", &["service_id"], args)?;
    let service_id = bound.service_id("service_id")?;
    ctx.emitter.forget(&service_id);
    ctx.emitter
        .emit(Instruction::RemoveService { service_id }, &ctx.position);
    Ok(Value::None)
}

fn repartition(args: CallArgs, ctx: &mut BuiltinContext<'_>) -> Result<Value> {
    let mut bound = Bound::bind(
        "repartition",
        &["partitions", "connections", "default_connection"],
        args,
    )?;

    let mut partitions = BTreeMap::new();
    for (partition, members) in bound.required_dict("partitions")? {
        let partition_id = plan_builder::partition_id("repartition()", partition.clone())?;
        let Value::List(members) = members else {
            return Err(type_mismatch(format!(
                "repartition() partitions['{}'] must be list, not {}",
                partition,
                members.type_name()
            )));
        };
        let members = string_items("repartition", "partitions", members)?;
        let set: ServiceIdSet = members.into_iter().map(ServiceId::from).collect();
        partitions.insert(partition_id, set);
    }

    let mut connections = BTreeMap::new();
    for (first, targets) in bound.dict("connections")? {
        let Value::Dict(targets) = targets else {
            return Err(type_mismatch(format!(
                "repartition() connections['{}'] must be dict, not {}",
                first,
                targets.type_name()
            )));
        };
        for (second, conn) in targets {
            let Value::Connection(conn) = conn else {
                return Err(type_mismatch(format!(
                    "repartition() connections['{}']['{}'] must be Connection, not {}",
                    first,
                    second,
                    conn.type_name()
                )));
            };
            plan_builder::insert_connection(
                "repartition()",
                &mut connections,
                &first,
                &second,
                conn,
            )?;
        }
    }

    let default_connection = match bound.take("default_connection") {
        None => Connection::unblocked(),
        Some(Value::Connection(conn)) => conn,
        Some(other) => {
            return Err(type_mismatch(format!(
                "repartition() argument 'default_connection' must be Connection, not {}",
                other.type_name()
            )))
        }
    };

    ctx.emitter.emit(
        Instruction::Repartition(RepartitionSpec {
            partitions,
            connections,
            default_connection,
        }),
        &ctx.position,
    );
    Ok(Value::None)
}

fn exec(args: CallArgs, ctx: &mut BuiltinContext<'_>) -> Result<Value> {
    let mut bound = Bound::bind(
        "exec",
        &["service_id", "command", "expected_exit_code"],
        args,
    )?;
    let service_id = bound.service_id("service_id")?;
    let command = bound.string_list("command")?;
    plan_builder::require_command("exec()", &command)?;
    let expected_exit_code = match bound.take("expected_exit_code") {
        None => None,
        Some(Value::Int(code)) => Some(i32::try_from(code).map_err(|_| {
            invalid_arguments(format!("exec() expected_exit_code {} out of range", code))
        })?),
        Some(other) => {
            return Err(type_mismatch(format!(
                "exec() argument 'expected_exit_code' must be int, not {}",
                other.type_name()
            )))
        }
    };
    ctx.emitter.emit(
        Instruction::ExecCommand {
            service_id,
            command,
            expected_exit_code,
        },
        &ctx.position,
    );
    Ok(Value::None)
}

fn wait_for_http_endpoint(args: CallArgs, ctx: &mut BuiltinContext<'_>) -> Result<Value> {
    let mut bound = Bound::bind(
        "wait_for_http_endpoint",
        &[
            "service_id",
            "port",
            "path",
            "initial_delay_milliseconds",
            "retries",
            "retries_delay_milliseconds",
            "body_text",
        ],
        args,
    )?;
    let service_id = bound.service_id("service_id")?;
    let port = bound.port_number("port")?;
    let path = bound
        .optional_string("path")?
        .unwrap_or_else(|| "/".to_string());
    let initial_delay_ms = bound.non_negative("initial_delay_milliseconds", 0)?;
    let retries = u32::try_from(bound.non_negative("retries", 10)?)
        .map_err(|_| invalid_arguments("wait_for_http_endpoint() retries out of range"))?;
    let retry_delay_ms = bound.non_negative("retries_delay_milliseconds", 500)?;
    let body_text = bound.optional_string("body_text")?;
    ctx.emitter.emit(
        Instruction::WaitForHttpEndpoint {
            service_id,
            port,
            path,
            initial_delay_ms,
            retries,
            retry_delay_ms,
            body_text,
        },
        &ctx.position,
    );
    Ok(Value::None)
}

fn store_service_files(args: CallArgs, ctx: &mut BuiltinContext<'_>) -> Result<Value> {
    let mut bound = Bound::bind("store_service_files", &["service_id", "src", "name"], args)?;
    let service_id = bound.service_id("service_id")?;
    let src_path = bound.required_string("src")?;
    let artifact_name = bound.required_string("name")?;
    plan_builder::require_artifact_name("store_service_files()", &artifact_name)?;
    ctx.emitter.emit(
        Instruction::StoreFilesArtifact {
            service_id,
            src_path,
            artifact_name: artifact_name.clone(),
        },
        &ctx.position,
    );
    Ok(Value::String(artifact_name))
}

fn run_task(args: CallArgs, ctx: &mut BuiltinContext<'_>) -> Result<Value> {
    let mut bound = Bound::bind(
        "run_task",
        &["name", "image", "command", "env_vars", "files", "store"],
        args,
    )?;
    let name = bound.required_string("name")?;
    let image = bound.required_string("image")?;
    plan_builder::require_image("run_task()", &image)?;
    let task = TaskConfig {
        name,
        image,
        command: bound.string_list("command")?,
        env: bound.string_map("env_vars")?,
        files: bound.string_map("files")?,
        store: bound.string_map("store")?,
    };
    let stored: Vec<Value> = task.store.keys().cloned().map(Value::String).collect();
    ctx.emitter.emit(Instruction::RunTask(task), &ctx.position);
    Ok(Value::List(stored))
}

fn print(args: CallArgs, ctx: &mut BuiltinContext<'_>) -> Result<Value> {
    if let Some((name, _)) = args.named.first() {
        return Err(invalid_arguments(format!(
            "print() got an unexpected keyword argument '{}'",
            name
        )));
    }
    let parts: Vec<String> = args.positional.iter().map(Value::to_str).collect();
    ctx.emitter.emit(
        Instruction::Print {
            message: parts.join(" "),
        },
        &ctx.position,
    );
    Ok(Value::None)
}

// ===== Run arguments =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamType {
    String,
    Int,
    Float,
    Bool,
    List,
    Dict,
    Any,
}

impl ParamType {
    fn parse(spec: &str) -> Option<(ParamType, bool)> {
        let (name, optional) = match spec.strip_suffix('?') {
            Some(name) => (name, true),
            None => (spec, false),
        };
        let ty = match name {
            "string" => ParamType::String,
            "int" => ParamType::Int,
            "float" => ParamType::Float,
            "bool" => ParamType::Bool,
            "list" => ParamType::List,
            "dict" => ParamType::Dict,
            "any" => ParamType::Any,
            _ => return None,
        };
        Some((ty, optional))
    }

    fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ParamType::Any, _)
                | (ParamType::String, Value::String(_))
                | (ParamType::Int, Value::Int(_))
                | (ParamType::Float, Value::Float(_) | Value::Int(_))
                | (ParamType::Bool, Value::Bool(_))
                | (ParamType::List, Value::List(_))
                | (ParamType::Dict, Value::Dict(_))
        )
    }

    fn name(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Bool => "bool",
            ParamType::List => "list",
            ParamType::Dict => "dict",
            ParamType::Any => "any",
        }
    }
}

/// `params(name="string", replicas="int?")` checks the run arguments
/// against the declared shape and returns them; missing optional
/// arguments come back as `None`.
fn params(args: CallArgs, run_args: &Value) -> Result<Value> {
    if !args.positional.is_empty() {
        return Err(invalid_arguments(
            "params() takes only keyword arguments of the form name=\"type\"",
        ));
    }
    let Value::Dict(provided) = run_args else {
        return Err(invalid_arguments("run arguments must be a JSON object"));
    };

    let mut schema = BTreeMap::new();
    for (name, spec) in args.named {
        let Value::String(spec) = spec else {
            return Err(type_mismatch(format!(
                "params() type of '{}' must be a string, not {}",
                name,
                spec.type_name()
            )));
        };
        let parsed = ParamType::parse(&spec).ok_or_else(|| {
            invalid_arguments(format!(
                "params() unknown type '{}' for '{}' (expected string, int, float, bool, list, dict or any, optionally followed by '?')",
                spec, name
            ))
        })?;
        schema.insert(name, parsed);
    }

    if let Some(unknown) = provided.keys().find(|k| !schema.contains_key(*k)) {
        return Err(invalid_arguments(format!(
            "unknown run argument '{}'",
            unknown
        )));
    }

    let mut checked = BTreeMap::new();
    for (name, (ty, optional)) in schema {
        match provided.get(&name) {
            None | Some(Value::None) if optional => {
                checked.insert(name, Value::None);
            }
            None | Some(Value::None) => {
                return Err(invalid_arguments(format!(
                    "missing required run argument '{}'",
                    name
                )));
            }
            Some(value) if !ty.accepts(value) => {
                return Err(type_mismatch(format!(
                    "run argument '{}' must be {}, not {}",
                    name,
                    ty.name(),
                    value.type_name()
                )));
            }
            Some(value) => {
                checked.insert(name, value.clone());
            }
        }
    }
    Ok(Value::Dict(checked))
}

// ===== Argument binding =====

struct Bound {
    function: &'static str,
    values: BTreeMap<&'static str, Value>,
}

impl Bound {
    fn bind(function: &'static str, params: &[&'static str], args: CallArgs) -> Result<Self> {
        if args.positional.len() > params.len() {
            return Err(invalid_arguments(format!(
                "{}() takes at most {} positional arguments but {} were given",
                function,
                params.len(),
                args.positional.len()
            )));
        }
        let mut values = BTreeMap::new();
        for (param, value) in params.iter().zip(args.positional) {
            values.insert(*param, value);
        }
        for (name, value) in args.named {
            let param = params
                .iter()
                .find(|p| **p == name.as_str())
                .ok_or_else(|| {
                    invalid_arguments(format!(
                        "{}() got an unexpected keyword argument '{}'",
                        function, name
                    ))
                })?;
            if values.insert(*param, value).is_some() {
                return Err(invalid_arguments(format!(
                    "{}() got multiple values for argument '{}'",
                    function, name
                )));
            }
        }
        Ok(Self { function, values })
    }

    /// The argument, treating an explicit `None` as absent
    fn take(&mut self, name: &str) -> Option<Value> {
        match self.values.remove(name) {
            None | Some(Value::None) => None,
            Some(value) => Some(value),
        }
    }

    fn required(&mut self, name: &str) -> Result<Value> {
        self.take(name).ok_or_else(|| {
            invalid_arguments(format!(
                "{}() missing required argument '{}'",
                self.function, name
            ))
        })
    }

    fn mismatch(&self, name: &str, expected: &str, found: &Value) -> InterpretationError {
        type_mismatch(format!(
            "{}() argument '{}' must be {}, not {}",
            self.function,
            name,
            expected,
            found.type_name()
        ))
    }

    fn required_string(&mut self, name: &str) -> Result<String> {
        match self.required(name)? {
            Value::String(s) => Ok(s),
            other => Err(self.mismatch(name, "string", &other)),
        }
    }

    fn optional_string(&mut self, name: &str) -> Result<Option<String>> {
        match self.take(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(self.mismatch(name, "string", &other)),
        }
    }

    fn bool(&mut self, name: &str, default: bool) -> Result<bool> {
        match self.take(name) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(b),
            Some(other) => Err(self.mismatch(name, "bool", &other)),
        }
    }

    fn float(&mut self, name: &str, default: f64) -> Result<f64> {
        match self.take(name) {
            None => Ok(default),
            Some(Value::Float(f)) => Ok(f),
            Some(Value::Int(i)) => Ok(i as f64),
            Some(other) => Err(self.mismatch(name, "float", &other)),
        }
    }

    fn non_negative(&mut self, name: &str, default: u64) -> Result<u64> {
        match self.take(name) {
            None => Ok(default),
            Some(Value::Int(i)) => u64::try_from(i).map_err(|_| {
                invalid_arguments(format!(
                    "{}() argument '{}' must not be negative",
                    self.function, name
                ))
            }),
            Some(other) => Err(self.mismatch(name, "int", &other)),
        }
    }

    fn port_number(&mut self, name: &str) -> Result<u16> {
        match self.required(name)? {
            Value::Int(i) => u16::try_from(i)
                .ok()
                .filter(|n| *n != 0)
                .ok_or_else(|| {
                    invalid_arguments(format!(
                        "{}() port number {} is outside 1..=65535",
                        self.function, i
                    ))
                }),
            other => Err(self.mismatch(name, "int", &other)),
        }
    }

    fn service_id(&mut self, name: &str) -> Result<ServiceId> {
        let raw = self.required_string(name)?;
        plan_builder::service_id(&format!("{}()", self.function), raw)
    }

    fn partition_id(&mut self, name: &str) -> Result<Option<PartitionId>> {
        Ok(self
            .optional_string(name)?
            .filter(|p| !p.is_empty())
            .map(PartitionId::from))
    }

    fn string_list(&mut self, name: &str) -> Result<Vec<String>> {
        match self.take(name) {
            None => Ok(Vec::new()),
            Some(Value::List(items)) => string_items(self.function, name, items),
            Some(other) => Err(self.mismatch(name, "list", &other)),
        }
    }

    fn dict(&mut self, name: &str) -> Result<BTreeMap<String, Value>> {
        match self.take(name) {
            None => Ok(BTreeMap::new()),
            Some(Value::Dict(entries)) => Ok(entries),
            Some(other) => Err(self.mismatch(name, "dict", &other)),
        }
    }

    fn required_dict(&mut self, name: &str) -> Result<BTreeMap<String, Value>> {
        match self.required(name)? {
            Value::Dict(entries) => Ok(entries),
            other => Err(self.mismatch(name, "dict", &other)),
        }
    }

    fn string_map(&mut self, name: &str) -> Result<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        for (key, value) in self.dict(name)? {
            match value {
                Value::String(s) => {
                    out.insert(key, s);
                }
                other => {
                    return Err(type_mismatch(format!(
                        "{}() {}['{}'] must be string, not {}",
                        self.function,
                        name,
                        key,
                        other.type_name()
                    )))
                }
            }
        }
        Ok(out)
    }

    fn port_map(&mut self, name: &str) -> Result<BTreeMap<String, PortSpec>> {
        let mut out = BTreeMap::new();
        for (key, value) in self.dict(name)? {
            if key.trim().is_empty() {
                return Err(invalid_arguments(format!(
                    "{}() port names must not be empty",
                    self.function
                )));
            }
            match value {
                Value::PortSpec(port) => {
                    out.insert(key, port);
                }
                other => {
                    return Err(type_mismatch(format!(
                        "{}() {}['{}'] must be PortSpec, not {}",
                        self.function,
                        name,
                        key,
                        other.type_name()
                    )))
                }
            }
        }
        Ok(out)
    }

    fn service_config(&mut self, name: &str) -> Result<ServiceConfig> {
        match self.required(name)? {
            Value::ServiceConfig(config) => Ok(*config),
            other => Err(self.mismatch(name, "ServiceConfig", &other)),
        }
    }
}

fn string_items(function: &str, name: &str, items: Vec<Value>) -> Result<Vec<String>> {
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Ok(s),
            other => Err(type_mismatch(format!(
                "{}() elements of '{}' must be string, not {}",
                function,
                name,
                other.type_name()
            ))),
        })
        .collect()
}

fn type_mismatch(message: impl Into<String>) -> InterpretationError {
    InterpretationError::new(ExErrorKind::TypeMismatch, message)
}
