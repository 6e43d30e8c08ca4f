//! Static description of what a plan would create
//!
//! Derived from the instructions alone, without simulating the network.
//! Services removed later in the same plan are dropped from the
//! description.

use std::collections::BTreeMap;

use enclave_core::instruction::{Instruction, ServiceConfig};
use enclave_core::model::PortSpec;
use enclave_core::plan::Plan;
use serde::Serialize;

use crate::errors::EngineError;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ServiceDescription {
    pub service_id: String,
    /// `None` for services that are only registered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Port name to `<number>/<protocol>`
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub ports: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDescription {
    pub name: String,
    pub image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub store: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PlanDescription {
    pub services: Vec<ServiceDescription>,
    pub files_artifacts: Vec<String>,
    pub tasks: Vec<TaskDescription>,
}

impl PlanDescription {
    pub fn from_plan(plan: &Plan) -> Self {
        let mut services: BTreeMap<String, ServiceDescription> = BTreeMap::new();
        let mut files_artifacts = Vec::new();
        let mut tasks = Vec::new();

        for (_, planned) in plan.numbered() {
            match &planned.instruction {
                Instruction::RegisterService { service_id, .. } => {
                    services.insert(
                        service_id.to_string(),
                        ServiceDescription {
                            service_id: service_id.to_string(),
                            ..ServiceDescription::default()
                        },
                    );
                }
                Instruction::StartService { service_id, config }
                | Instruction::AddService {
                    service_id, config, ..
                } => {
                    services.insert(
                        service_id.to_string(),
                        describe_service(&service_id.to_string(), config),
                    );
                }
                Instruction::RemoveService { service_id } => {
                    services.remove(service_id.as_str());
                }
                Instruction::StoreFilesArtifact { artifact_name, .. } => {
                    files_artifacts.push(artifact_name.clone());
                }
                Instruction::RunTask(task) => {
                    files_artifacts.extend(task.store.keys().cloned());
                    tasks.push(TaskDescription {
                        name: task.name.clone(),
                        image: task.image.clone(),
                        command: task.command.clone(),
                        store: task.store.keys().cloned().collect(),
                    });
                }
                Instruction::Repartition(_)
                | Instruction::ExecCommand { .. }
                | Instruction::WaitForHttpEndpoint { .. }
                | Instruction::Print { .. } => {}
            }
        }

        Self {
            services: services.into_values().collect(),
            files_artifacts,
            tasks,
        }
    }

    /// # Errors
    ///
    /// `EngineError::Config` if serialization fails.
    pub fn to_yaml(&self) -> Result<String, EngineError> {
        serde_yaml::to_string(self).map_err(|e| EngineError::Config {
            message: format!("plan description is not YAML-serializable: {}", e),
        })
    }

    /// # Errors
    ///
    /// `EngineError::Config` if serialization fails.
    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::Config {
            message: format!("plan description is not JSON-serializable: {}", e),
        })
    }
}

fn describe_service(service_id: &str, config: &ServiceConfig) -> ServiceDescription {
    ServiceDescription {
        service_id: service_id.to_string(),
        image: Some(config.image.clone()),
        ports: config
            .ports
            .iter()
            .map(|(name, port)| (name.clone(), render_port(port)))
            .collect(),
        env: config.env.clone(),
        files: config.files.clone(),
        entrypoint: config.entrypoint.clone(),
        cmd: config.cmd.clone(),
    }
}

fn render_port(port: &PortSpec) -> String {
    format!("{}/{}", port.number, port.transport_protocol.as_str())
}
