//! Instruction set
//!
//! Every operation a plan can perform against an enclave is one variant of
//! [`Instruction`]. Variants carry only their own, already validated
//! arguments and are never mutated after construction.
//!
//! Each instruction renders to a canonical one-line form,
//! `name(k1=v1, k2=v2)`, with keyword arguments sorted by name and unset
//! optional arguments left out:
//!
//! ```
//! use enclave_core::instruction::Instruction;
//!
//! let exec = Instruction::ExecCommand {
//!     service_id: "example-service-id".into(),
//!     command: vec!["mkdir".into(), "-p".into(), "/tmp/store".into()],
//!     expected_exit_code: Some(0),
//! };
//! assert_eq!(
//!     exec.to_string(),
//!     r#"exec(command=["mkdir", "-p", "/tmp/store"], expected_exit_code=0, service_id="example-service-id")"#
//! );
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crate::model::{Connection, PartitionConnectionId, PartitionId, PortSpec, ServiceId, ServiceIdSet};

/// Container configuration of a service
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceConfig {
    pub image: String,
    /// Port name to port
    pub ports: BTreeMap<String, PortSpec>,
    pub entrypoint: Vec<String>,
    pub cmd: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Mount path to files artifact name
    pub files: BTreeMap<String, String>,
    /// Where the enclave data directory is mounted inside the container
    pub data_dir_mount: Option<String>,
}

impl ServiceConfig {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }
}

/// A one-shot container run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskConfig {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Mount path to files artifact name
    pub files: BTreeMap<String, String>,
    /// Artifact name to path inside the task container, captured on exit
    pub store: BTreeMap<String, String>,
}

/// Partition layout requested by a repartition
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RepartitionSpec {
    pub partitions: BTreeMap<PartitionId, ServiceIdSet>,
    pub connections: BTreeMap<PartitionConnectionId, Connection>,
    pub default_connection: Connection,
}

/// One operation of a plan
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Reserve an id and an IP, optionally in a partition
    RegisterService {
        service_id: ServiceId,
        partition_id: Option<PartitionId>,
    },

    /// Start the container of a registered service
    StartService {
        service_id: ServiceId,
        config: ServiceConfig,
    },

    /// Register and start in one step
    AddService {
        service_id: ServiceId,
        partition_id: Option<PartitionId>,
        config: ServiceConfig,
    },

    RemoveService { service_id: ServiceId },

    Repartition(RepartitionSpec),

    ExecCommand {
        service_id: ServiceId,
        command: Vec<String>,
        expected_exit_code: Option<i32>,
    },

    /// Block until an HTTP GET on a declared port answers
    WaitForHttpEndpoint {
        service_id: ServiceId,
        port: u16,
        path: String,
        initial_delay_ms: u64,
        retries: u32,
        retry_delay_ms: u64,
        /// Expected response body; any body is accepted when unset
        body_text: Option<String>,
    },

    /// Copy a path out of a service container into a named artifact
    StoreFilesArtifact {
        service_id: ServiceId,
        src_path: String,
        artifact_name: String,
    },

    RunTask(TaskConfig),

    Print { message: String },
}

impl Instruction {
    /// Name used in scripts and in the canonical rendering
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::RegisterService { .. } => "register_service",
            Instruction::StartService { .. } => "start_service",
            Instruction::AddService { .. } => "add_service",
            Instruction::RemoveService { .. } => "remove_service",
            Instruction::Repartition(_) => "repartition",
            Instruction::ExecCommand { .. } => "exec",
            Instruction::WaitForHttpEndpoint { .. } => "wait_for_http_endpoint",
            Instruction::StoreFilesArtifact { .. } => "store_service_files",
            Instruction::RunTask(_) => "run_task",
            Instruction::Print { .. } => "print",
        }
    }

    /// The service this instruction targets, if any
    pub fn service_id(&self) -> Option<&ServiceId> {
        match self {
            Instruction::RegisterService { service_id, .. }
            | Instruction::StartService { service_id, .. }
            | Instruction::AddService { service_id, .. }
            | Instruction::RemoveService { service_id }
            | Instruction::ExecCommand { service_id, .. }
            | Instruction::WaitForHttpEndpoint { service_id, .. }
            | Instruction::StoreFilesArtifact { service_id, .. } => Some(service_id),
            Instruction::Repartition(_) | Instruction::RunTask(_) | Instruction::Print { .. } => {
                None
            }
        }
    }

    /// Container image this instruction needs, if any
    pub fn image(&self) -> Option<&str> {
        match self {
            Instruction::StartService { config, .. } | Instruction::AddService { config, .. } => {
                Some(config.image.as_str())
            }
            Instruction::RunTask(task) => Some(task.image.as_str()),
            _ => None,
        }
    }
}

// ===== Canonical rendering =====

/// Collects keyword arguments and renders them sorted by name
struct Kwargs(Vec<(&'static str, String)>);

impl Kwargs {
    fn new() -> Self {
        Self(Vec::new())
    }

    fn arg(mut self, key: &'static str, value: String) -> Self {
        self.0.push((key, value));
        self
    }

    fn opt<T>(self, key: &'static str, value: Option<T>, render: impl Fn(T) -> String) -> Self {
        match value {
            Some(v) => self.arg(key, render(v)),
            None => self,
        }
    }

    /// Empty collections are left out
    fn non_empty(self, key: &'static str, is_empty: bool, value: impl FnOnce() -> String) -> Self {
        if is_empty {
            self
        } else {
            self.arg(key, value())
        }
    }

    fn render(mut self, name: &str) -> String {
        self.0.sort_by(|a, b| a.0.cmp(b.0));
        let args: Vec<String> = self
            .0
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{}({})", name, args.join(", "))
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn list<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    let rendered: Vec<String> = items.into_iter().map(|s| quote(s)).collect();
    format!("[{}]", rendered.join(", "))
}

fn dict<'a, V: 'a>(
    entries: impl IntoIterator<Item = (&'a String, &'a V)>,
    render: impl Fn(&V) -> String,
) -> String {
    let rendered: Vec<String> = entries
        .into_iter()
        .map(|(k, v)| format!("{}: {}", quote(k), render(v)))
        .collect();
    format!("{{{}}}", rendered.join(", "))
}

fn render_port(port: &PortSpec) -> String {
    Kwargs::new()
        .arg("number", port.number.to_string())
        .arg(
            "transport_protocol",
            quote(port.transport_protocol.as_str()),
        )
        .opt(
            "application_protocol",
            port.application_protocol.as_deref(),
            quote,
        )
        .render("PortSpec")
}

fn render_service_config(config: &ServiceConfig) -> String {
    Kwargs::new()
        .arg("image", quote(&config.image))
        .non_empty("ports", config.ports.is_empty(), || {
            dict(&config.ports, render_port)
        })
        .non_empty("entrypoint", config.entrypoint.is_empty(), || {
            list(&config.entrypoint)
        })
        .non_empty("cmd", config.cmd.is_empty(), || list(&config.cmd))
        .non_empty("env_vars", config.env.is_empty(), || {
            dict(&config.env, |v| quote(v))
        })
        .non_empty("files", config.files.is_empty(), || {
            dict(&config.files, |v| quote(v))
        })
        .opt("data_dir_mount", config.data_dir_mount.as_deref(), quote)
        .render("ServiceConfig")
}

fn render_connection(connection: &Connection) -> String {
    format!(
        "Connection(packet_loss_percentage={})",
        connection.packet_loss_percentage()
    )
}

fn render_repartition(spec: &RepartitionSpec) -> String {
    let partitions: Vec<String> = spec
        .partitions
        .iter()
        .map(|(pid, members)| {
            let ids: Vec<String> = members.iter().map(|s| quote(s.as_str())).collect();
            format!("{}: [{}]", quote(pid.as_str()), ids.join(", "))
        })
        .collect();
    let connections: Vec<String> = spec
        .connections
        .iter()
        .map(|(cid, conn)| {
            let (a, b) = cid.partitions();
            format!(
                "({}, {}): {}",
                quote(a.as_str()),
                quote(b.as_str()),
                render_connection(conn)
            )
        })
        .collect();

    Kwargs::new()
        .arg("partitions", format!("{{{}}}", partitions.join(", ")))
        .non_empty("connections", connections.is_empty(), || {
            format!("{{{}}}", connections.join(", "))
        })
        .arg("default_connection", render_connection(&spec.default_connection))
        .render("repartition")
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = match self {
            Instruction::RegisterService {
                service_id,
                partition_id,
            } => Kwargs::new()
                .arg("service_id", quote(service_id.as_str()))
                .opt("partition_id", partition_id.as_ref(), |p| quote(p.as_str()))
                .render(self.name()),

            Instruction::StartService { service_id, config } => Kwargs::new()
                .arg("service_id", quote(service_id.as_str()))
                .arg("config", render_service_config(config))
                .render(self.name()),

            Instruction::AddService {
                service_id,
                partition_id,
                config,
            } => Kwargs::new()
                .arg("service_id", quote(service_id.as_str()))
                .opt("partition_id", partition_id.as_ref(), |p| quote(p.as_str()))
                .arg("config", render_service_config(config))
                .render(self.name()),

            Instruction::RemoveService { service_id } => Kwargs::new()
                .arg("service_id", quote(service_id.as_str()))
                .render(self.name()),

            Instruction::Repartition(spec) => render_repartition(spec),

            Instruction::ExecCommand {
                service_id,
                command,
                expected_exit_code,
            } => Kwargs::new()
                .arg("service_id", quote(service_id.as_str()))
                .arg("command", list(command))
                .opt("expected_exit_code", *expected_exit_code, |c| c.to_string())
                .render(self.name()),

            Instruction::WaitForHttpEndpoint {
                service_id,
                port,
                path,
                initial_delay_ms,
                retries,
                retry_delay_ms,
                body_text,
            } => Kwargs::new()
                .arg("service_id", quote(service_id.as_str()))
                .arg("port", port.to_string())
                .arg("path", quote(path))
                .arg("initial_delay_milliseconds", initial_delay_ms.to_string())
                .arg("retries", retries.to_string())
                .arg("retries_delay_milliseconds", retry_delay_ms.to_string())
                .opt("body_text", body_text.as_deref(), quote)
                .render(self.name()),

            Instruction::StoreFilesArtifact {
                service_id,
                src_path,
                artifact_name,
            } => Kwargs::new()
                .arg("service_id", quote(service_id.as_str()))
                .arg("src", quote(src_path))
                .arg("name", quote(artifact_name))
                .render(self.name()),

            Instruction::RunTask(task) => Kwargs::new()
                .arg("name", quote(&task.name))
                .arg("image", quote(&task.image))
                .non_empty("command", task.command.is_empty(), || list(&task.command))
                .non_empty("env_vars", task.env.is_empty(), || {
                    dict(&task.env, |v| quote(v))
                })
                .non_empty("files", task.files.is_empty(), || {
                    dict(&task.files, |v| quote(v))
                })
                .non_empty("store", task.store.is_empty(), || {
                    dict(&task.store, |v| quote(v))
                })
                .render(self.name()),

            Instruction::Print { message } => Kwargs::new()
                .arg("msg", quote(message))
                .render(self.name()),
        };
        f.write_str(&rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_rendering_sorts_kwargs() {
        let exec = Instruction::ExecCommand {
            service_id: "example-service-id".into(),
            command: vec!["mkdir".into(), "-p".into(), "/tmp/store".into()],
            expected_exit_code: Some(0),
        };
        assert_eq!(
            exec.to_string(),
            r#"exec(command=["mkdir", "-p", "/tmp/store"], expected_exit_code=0, service_id="example-service-id")"#
        );
    }

    #[test]
    fn test_unset_optionals_are_omitted() {
        let register = Instruction::RegisterService {
            service_id: "db".into(),
            partition_id: None,
        };
        assert_eq!(register.to_string(), r#"register_service(service_id="db")"#);
    }

    #[test]
    fn test_service_config_rendering() {
        let mut config = ServiceConfig::new("nginx:latest");
        config.ports.insert("http".to_string(), PortSpec::tcp(80));
        let start = Instruction::StartService {
            service_id: "web".into(),
            config,
        };
        assert_eq!(
            start.to_string(),
            r#"start_service(config=ServiceConfig(image="nginx:latest", ports={"http": PortSpec(number=80, transport_protocol="TCP")}), service_id="web")"#
        );
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("a\"b\\c\n"), r#""a\"b\\c\n""#);
    }

    #[test]
    fn test_images_and_service_ids() {
        let add = Instruction::AddService {
            service_id: "db".into(),
            partition_id: None,
            config: ServiceConfig::new("postgres:16"),
        };
        assert_eq!(add.image(), Some("postgres:16"));

        let print = Instruction::Print {
            message: "hi".to_string(),
        };
        assert_eq!(print.image(), None);
        assert_eq!(print.service_id(), None);
    }
}
