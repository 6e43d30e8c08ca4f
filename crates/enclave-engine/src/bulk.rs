//! Legacy bulk command documents
//!
//! ```json
//! {
//!   "schemaVersion": 0,
//!   "body": {
//!     "commands": [
//!       { "type": "REGISTER_SERVICE", "args": { "service_id": "service1" } }
//!     ]
//!   }
//! }
//! ```
//!
//! Each command becomes exactly one instruction, in document order. The
//! resulting plan is the one an equivalent script would produce, and the
//! arguments go through the same checks as script builtins; command `n` is
//! reported at position `<locator>:n:1`.

use std::collections::BTreeMap;

use enclave_core::errors::ExErrorKind;
use enclave_core::instruction::{Instruction, RepartitionSpec, ServiceConfig, TaskConfig};
use enclave_core::model::{
    Connection, PartitionId, PortSpec, ServiceId, ServiceIdSet, TransportProtocol,
};
use enclave_core::plan::{Plan, SourcePosition};
use enclave_core_types::schema::FIELD_PLAN_LEN;
use serde::Deserialize;

use crate::errors::InterpretationError;
use crate::plan_builder::{self, invalid_arguments as invalid, PlanBuilder};

type Result<T> = std::result::Result<T, InterpretationError>;

pub const SUPPORTED_SCHEMA_VERSION: u64 = 0;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionProbe {
    schema_version: u64,
}

#[derive(Debug, Deserialize)]
struct DocumentV0 {
    body: BodyV0,
}

#[derive(Debug, Deserialize)]
struct BodyV0 {
    #[serde(default)]
    commands: Vec<RawCommand>,
}

#[derive(Debug, Deserialize)]
struct RawCommand {
    #[serde(rename = "type")]
    command_type: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RegisterServiceArgs {
    service_id: String,
    #[serde(default)]
    partition_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StartServiceArgs {
    service_id: String,
    #[serde(default)]
    partition_id: Option<String>,
    docker_image: String,
    /// Keys of the form `<number>/<protocol>`
    #[serde(default)]
    used_ports: BTreeMap<String, bool>,
    #[serde(default)]
    entrypoint_args: Vec<String>,
    #[serde(default)]
    cmd_args: Vec<String>,
    #[serde(default)]
    docker_env_vars: BTreeMap<String, String>,
    #[serde(default)]
    enclave_data_dir_mnt_dirpath: Option<String>,
    /// Mount path to files artifact name
    #[serde(default)]
    files_artifact_mount_dirpaths: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RemoveServiceArgs {
    service_id: String,
}

#[derive(Debug, Deserialize)]
struct PartitionServicesV0 {
    #[serde(default)]
    service_id_set: BTreeMap<String, bool>,
}

#[derive(Debug, Deserialize)]
struct ConnectionV0 {
    #[serde(default)]
    is_blocked: bool,
    #[serde(default)]
    packet_loss_percentage: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct RepartitionArgs {
    partition_services: BTreeMap<String, PartitionServicesV0>,
    /// First partition to second partition to connection
    #[serde(default)]
    partition_connections: BTreeMap<String, BTreeMap<String, ConnectionV0>>,
    #[serde(default)]
    default_connection: Option<ConnectionV0>,
}

#[derive(Debug, Deserialize)]
struct ExecCommandArgs {
    service_id: String,
    command_args: Vec<String>,
    #[serde(default)]
    expected_exit_code: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct WaitForHttpArgs {
    service_id: String,
    port: u16,
    #[serde(default)]
    path: String,
    #[serde(default)]
    initial_delay_milliseconds: u64,
    #[serde(default)]
    retries: u32,
    #[serde(default)]
    retries_delay_milliseconds: u64,
    #[serde(default)]
    body_text: String,
}

#[derive(Debug, Deserialize)]
struct StoreFilesArtifactArgs {
    service_id: String,
    src_path: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RunTaskArgs {
    name: String,
    image: String,
    #[serde(default)]
    command: Vec<String>,
    #[serde(default)]
    env_vars: BTreeMap<String, String>,
    #[serde(default)]
    files: BTreeMap<String, String>,
    #[serde(default)]
    store: BTreeMap<String, String>,
}

/// Read a bulk command document into a plan
///
/// # Errors
///
/// `UnsupportedSchemaVersion` for any version but 0, `UnknownCommand` for an
/// unrecognised command type, `InvalidArguments` for malformed JSON or
/// command arguments.
pub fn read_bulk_commands(locator: &str, json: &str) -> Result<Plan> {
    let probe: VersionProbe = serde_json::from_str(json).map_err(malformed)?;
    if probe.schema_version != SUPPORTED_SCHEMA_VERSION {
        return Err(InterpretationError::new(
            ExErrorKind::UnsupportedSchemaVersion,
            format!(
                "unsupported bulk command schema version {} (supported: {})",
                probe.schema_version, SUPPORTED_SCHEMA_VERSION
            ),
        ));
    }
    let document: DocumentV0 = serde_json::from_str(json).map_err(malformed)?;

    let mut builder = PlanBuilder::new(Plan::new(locator));
    for (index, command) in document.body.commands.into_iter().enumerate() {
        let position = SourcePosition::new(locator, index as u32 + 1, 1);
        let instruction =
            to_instruction(command, &mut builder).map_err(|e| e.at(position.clone()))?;
        builder.emit(instruction, &position);
    }
    let plan = builder.into_plan();
    tracing::debug!(locator, { FIELD_PLAN_LEN } = plan.len(), "bulk commands read");
    Ok(plan)
}

fn to_instruction(command: RawCommand, builder: &mut PlanBuilder) -> Result<Instruction> {
    let caller = command.command_type.as_str();
    let instruction = match caller {
        "REGISTER_SERVICE" => {
            let args: RegisterServiceArgs = parse_args(&command)?;
            let service_id = plan_builder::service_id(caller, args.service_id)?;
            builder.declare(&service_id)?;
            Instruction::RegisterService {
                service_id,
                partition_id: optional_partition_id(args.partition_id),
            }
        }
        "START_SERVICE" => {
            let args: StartServiceArgs = parse_args(&command)?;
            if optional_partition_id(args.partition_id.clone()).is_some() {
                return Err(invalid(
                    "START_SERVICE does not take a partition_id; \
                     give it to REGISTER_SERVICE instead",
                ));
            }
            let service_id = plan_builder::service_id(caller, args.service_id.clone())?;
            Instruction::StartService {
                service_id,
                config: service_config(caller, args)?,
            }
        }
        "ADD_SERVICE" => {
            let args: StartServiceArgs = parse_args(&command)?;
            let service_id = plan_builder::service_id(caller, args.service_id.clone())?;
            let partition_id = optional_partition_id(args.partition_id.clone());
            let config = service_config(caller, args)?;
            builder.declare(&service_id)?;
            Instruction::AddService {
                service_id,
                partition_id,
                config,
            }
        }
        "REMOVE_SERVICE" => {
            let args: RemoveServiceArgs = parse_args(&command)?;
            let service_id = plan_builder::service_id(caller, args.service_id)?;
            builder.forget(&service_id);
            Instruction::RemoveService { service_id }
        }
        "REPARTITION" => {
            let args: RepartitionArgs = parse_args(&command)?;
            Instruction::Repartition(repartition_spec(caller, args)?)
        }
        "EXEC_COMMAND" => {
            let args: ExecCommandArgs = parse_args(&command)?;
            let service_id = plan_builder::service_id(caller, args.service_id)?;
            plan_builder::require_command(caller, &args.command_args)?;
            Instruction::ExecCommand {
                service_id,
                command: args.command_args,
                expected_exit_code: args.expected_exit_code,
            }
        }
        "WAIT_FOR_HTTP_GET_ENDPOINT_AVAILABILITY" => {
            let args: WaitForHttpArgs = parse_args(&command)?;
            if args.port == 0 {
                return Err(invalid("port 0 is not a valid port"));
            }
            Instruction::WaitForHttpEndpoint {
                service_id: plan_builder::service_id(caller, args.service_id)?,
                port: args.port,
                path: args.path,
                initial_delay_ms: args.initial_delay_milliseconds,
                retries: args.retries,
                retry_delay_ms: args.retries_delay_milliseconds,
                body_text: Some(args.body_text).filter(|b| !b.is_empty()),
            }
        }
        "STORE_FILES_ARTIFACT" => {
            let args: StoreFilesArtifactArgs = parse_args(&command)?;
            let service_id = plan_builder::service_id(caller, args.service_id)?;
            plan_builder::require_artifact_name(caller, &args.name)?;
            Instruction::StoreFilesArtifact {
                service_id,
                src_path: args.src_path,
                artifact_name: args.name,
            }
        }
        "RUN_TASK" => {
            let args: RunTaskArgs = parse_args(&command)?;
            plan_builder::require_image(caller, &args.image)?;
            Instruction::RunTask(TaskConfig {
                name: args.name,
                image: args.image,
                command: args.command,
                env: args.env_vars,
                files: args.files,
                store: args.store,
            })
        }
        other => {
            return Err(InterpretationError::new(
                ExErrorKind::UnknownCommand,
                format!("unknown bulk command type '{}'", other),
            ))
        }
    };
    Ok(instruction)
}

fn parse_args<T: serde::de::DeserializeOwned>(command: &RawCommand) -> Result<T> {
    serde_json::from_value(command.args.clone()).map_err(|e| {
        invalid(format!(
            "invalid args for {}: {}",
            command.command_type, e
        ))
    })
}

/// An empty partition id on registration means the default partition
fn optional_partition_id(raw: Option<String>) -> Option<PartitionId> {
    raw.filter(|p| !p.is_empty()).map(PartitionId::from)
}

fn service_config(caller: &str, args: StartServiceArgs) -> Result<ServiceConfig> {
    plan_builder::require_image(caller, &args.docker_image)?;
    let mut ports = BTreeMap::new();
    for (key, used) in args.used_ports {
        if used {
            let port = parse_port_key(&key)?;
            ports.insert(key, port);
        }
    }
    Ok(ServiceConfig {
        image: args.docker_image,
        ports,
        entrypoint: args.entrypoint_args,
        cmd: args.cmd_args,
        env: args.docker_env_vars,
        files: args.files_artifact_mount_dirpaths,
        data_dir_mount: args.enclave_data_dir_mnt_dirpath,
    })
}

/// `"80/tcp"` → port 80 over TCP; the protocol defaults to TCP when omitted
fn parse_port_key(key: &str) -> Result<PortSpec> {
    let (number, protocol) = match key.split_once('/') {
        Some((number, protocol)) => (number, Some(protocol)),
        None => (key, None),
    };
    let number = number
        .trim()
        .parse::<u16>()
        .ok()
        .filter(|n| *n != 0)
        .ok_or_else(|| invalid(format!("invalid port '{}'", key)))?;
    let transport_protocol = match protocol {
        None => TransportProtocol::Tcp,
        Some(p) => TransportProtocol::parse(p)
            .ok_or_else(|| invalid(format!("invalid port protocol in '{}'", key)))?,
    };
    Ok(PortSpec {
        number,
        transport_protocol,
        application_protocol: None,
    })
}

fn connection(raw: ConnectionV0) -> Result<Connection> {
    if raw.is_blocked {
        return Ok(Connection::blocked());
    }
    Connection::with_packet_loss(raw.packet_loss_percentage.unwrap_or(0.0))
        .map_err(InterpretationError::from)
}

fn repartition_spec(caller: &str, args: RepartitionArgs) -> Result<RepartitionSpec> {
    let mut partitions = BTreeMap::new();
    for (partition, services) in args.partition_services {
        let members: ServiceIdSet = services
            .service_id_set
            .into_iter()
            .filter(|(_, present)| *present)
            .map(|(id, _)| ServiceId::from(id))
            .collect();
        partitions.insert(plan_builder::partition_id(caller, partition)?, members);
    }

    let mut connections = BTreeMap::new();
    for (first, targets) in args.partition_connections {
        for (second, raw) in targets {
            plan_builder::insert_connection(
                caller,
                &mut connections,
                &first,
                &second,
                connection(raw)?,
            )?;
        }
    }

    let default_connection = match args.default_connection {
        Some(raw) => connection(raw)?,
        None => Connection::unblocked(),
    };
    Ok(RepartitionSpec {
        partitions,
        connections,
        default_connection,
    })
}

fn malformed(err: serde_json::Error) -> InterpretationError {
    invalid(format!("malformed bulk command document: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_version() {
        let err = read_bulk_commands(
            "bulk.json",
            r#"{"schemaVersion": 1, "body": {"commands": []}}"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::UnsupportedSchemaVersion);
    }

    #[test]
    fn test_unknown_command_names_its_position() {
        let err = read_bulk_commands(
            "bulk.json",
            r#"{"schemaVersion": 0, "body": {"commands": [
                {"type": "REGISTER_SERVICE", "args": {"service_id": "a"}},
                {"type": "LAUNCH_ROCKET", "args": {}}
            ]}}"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::UnknownCommand);
        assert_eq!(
            err.position().map(|p| p.to_string()),
            Some("bulk.json:2:1".to_string())
        );
    }

    #[test]
    fn test_port_keys() {
        assert_eq!(parse_port_key("80/tcp").unwrap(), PortSpec::tcp(80));
        assert_eq!(
            parse_port_key("53/udp").unwrap().transport_protocol,
            TransportProtocol::Udp
        );
        assert!(parse_port_key("0/tcp").is_err());
        assert!(parse_port_key("80/http").is_err());
    }

    #[test]
    fn test_empty_body_text_means_any_body() {
        let plan = read_bulk_commands(
            "bulk.json",
            r#"{"schemaVersion": 0, "body": {"commands": [
                {"type": "WAIT_FOR_HTTP_GET_ENDPOINT_AVAILABILITY", "args": {
                    "service_id": "s", "port": 80, "path": "", "initial_delay_milliseconds": 0,
                    "retries": 10, "retries_delay_milliseconds": 1000, "body_text": ""
                }}
            ]}}"#,
        )
        .unwrap();
        assert!(matches!(
            plan.get(1).map(|p| &p.instruction),
            Some(Instruction::WaitForHttpEndpoint { body_text: None, .. })
        ));
    }
}
