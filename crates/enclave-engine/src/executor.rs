//! Plan execution
//!
//! ## Per-instruction protocol
//!
//! 1. Checkpoint the model
//! 2. Apply the model effect under the network lock (`enclave_core::apply`)
//! 3. Resolve runtime placeholders against the updated model
//! 4. Perform the backend effect without holding the lock (skipped in dry run)
//! 5. On any failure restore the checkpoint and abort the run
//!
//! Instructions that already succeeded are never rolled back. Output
//! messages depend only on the model effect, so a dry run and a real run of
//! the same plan produce identical messages; backend specifics such as
//! container handles or command output go into `detail`.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use enclave_core::apply::{apply, ModelEffect};
use enclave_core::errors::{ExError, ExErrorKind, NetworkError};
use enclave_core::instruction::{Instruction, ServiceConfig};
use enclave_core::model::{ContainerHandle, ServiceId};
use enclave_core::ops::{NetworkState, ServiceNetwork};
use enclave_core::plan::{Plan, PlannedInstruction};
use enclave_core_types::schema::FIELD_INSTRUCTION_KIND;
use serde::Serialize;

use crate::backend::{Backend, ContainerSpec, HttpWaitSpec};
use crate::cancel::Cancellation;
use crate::config::RunOptions;
use crate::errors::ExecutionError;
use crate::magic::substitute;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InstructionState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    NotStarted,
    Running,
    Completed,
    Aborted,
}

/// Log entry of one successfully completed instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstructionOutput {
    pub number: u32,
    /// Canonical rendering of the instruction
    pub instruction: String,
    pub message: String,
    /// Backend-specific information; always `None` in dry runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub outputs: Vec<InstructionOutput>,
    /// One entry per plan instruction, by index
    pub states: Vec<InstructionState>,
    pub run_state: RunState,
    pub error: Option<ExecutionError>,
}

impl ExecutionReport {
    fn new(instructions: usize) -> Self {
        Self {
            outputs: Vec::new(),
            states: vec![InstructionState::Pending; instructions],
            run_state: RunState::NotStarted,
            error: None,
        }
    }
}

/// Backend work prepared from a model effect
enum BackendCall {
    None,
    StartContainer {
        service_id: ServiceId,
        spec: ContainerSpec,
    },
    StopContainer {
        handle: Option<ContainerHandle>,
    },
    TrafficControl,
    Exec {
        service_id: ServiceId,
        command: Vec<String>,
        expected_exit_code: Option<i32>,
    },
    WaitHttp {
        ip: Ipv4Addr,
        spec: HttpWaitSpec,
    },
    CopyFiles {
        service_id: ServiceId,
        src_path: String,
        artifact_name: String,
    },
    RunTask {
        spec: ContainerSpec,
        command: Vec<String>,
        store: Vec<(String, String)>,
    },
}

pub struct Executor<'a> {
    network: &'a ServiceNetwork,
    backend: &'a dyn Backend,
    options: RunOptions,
}

impl<'a> Executor<'a> {
    pub fn new(network: &'a ServiceNetwork, backend: &'a dyn Backend, options: RunOptions) -> Self {
        Self {
            network,
            backend,
            options,
        }
    }

    /// Run every instruction in order, stopping at the first failure
    pub async fn execute(&self, plan: &Plan, cancel: &Cancellation) -> ExecutionReport {
        let mut report = ExecutionReport::new(plan.len());
        report.run_state = RunState::Running;

        for (number, planned) in plan.numbered() {
            let index = (number - 1) as usize;
            let outcome = if cancel.is_cancelled() {
                Err(ExError::new(ExErrorKind::Cancelled)
                    .with_message("execution cancelled before this instruction"))
            } else {
                report.states[index] = InstructionState::Running;
                self.execute_one(planned).await
            };

            match outcome {
                Ok((message, detail)) => {
                    tracing::debug!(
                        instruction_number = number,
                        { FIELD_INSTRUCTION_KIND } = planned.instruction.name(),
                        "instruction succeeded"
                    );
                    report.states[index] = InstructionState::Succeeded;
                    report.outputs.push(InstructionOutput {
                        number,
                        instruction: planned.instruction.to_string(),
                        message,
                        detail,
                    });
                }
                Err(cause) => {
                    if cause.kind() != ExErrorKind::Cancelled {
                        report.states[index] = InstructionState::Failed;
                    }
                    report.error = Some(
                        ExecutionError::new(
                            number,
                            report.outputs.len(),
                            cause.kind(),
                            cause.message().to_string(),
                        )
                        .at(planned.position.clone())
                        .with_cause(cause),
                    );
                    report.run_state = RunState::Aborted;
                    return report;
                }
            }
        }

        report.run_state = RunState::Completed;
        report
    }

    async fn execute_one(
        &self,
        planned: &PlannedInstruction,
    ) -> Result<(String, Option<String>), ExError> {
        let instruction = &planned.instruction;
        let checkpoint = self.network.snapshot()?;

        let applied = self.network.with_state(|state| {
            let effect = apply(state, instruction)?;
            let call = prepare(instruction, &effect, state)?;
            Ok::<_, NetworkError>((effect, call))
        })?;
        let (effect, call) = match applied {
            Ok(applied) => applied,
            Err(err) => {
                self.network.restore(checkpoint)?;
                return Err(err.into());
            }
        };
        let message = describe(instruction, &effect);

        if self.options.dry_run {
            return Ok((message, None));
        }
        match self.run_backend(call).await {
            Ok(detail) => Ok((message, detail)),
            Err(err) => {
                tracing::debug!(
                    { FIELD_INSTRUCTION_KIND } = instruction.name(),
                    error = %err,
                    "backend effect failed, restoring checkpoint"
                );
                self.network.restore(checkpoint)?;
                Err(err)
            }
        }
    }

    async fn run_backend(&self, call: BackendCall) -> Result<Option<String>, ExError> {
        match call {
            BackendCall::None => Ok(None),

            BackendCall::StartContainer { service_id, spec } => {
                self.backend.pull_image(&spec.image).await?;
                let handle = self.backend.create_and_start_container(&spec).await?;
                match self.wire_container(&service_id, &spec, &handle).await {
                    Ok(detail) => Ok(Some(detail)),
                    Err(err) => {
                        self.discard_container(&handle).await;
                        Err(err)
                    }
                }
            }

            BackendCall::StopContainer { handle } => match handle {
                Some(handle) => {
                    self.backend.stop_container(&handle).await?;
                    Ok(Some(format!("container {} stopped", handle)))
                }
                None => Ok(None),
            },

            BackendCall::TrafficControl => {
                let state = self.network.snapshot()?;
                let updated = self.push_traffic_control(&state).await?;
                Ok(Some(format!("traffic control updated on {} containers", updated)))
            }

            BackendCall::Exec {
                service_id,
                command,
                expected_exit_code,
            } => {
                let handle = self.handle_of(&service_id)?;
                let result = self.backend.exec_in_container(&handle, &command).await?;
                if let Some(expected) = expected_exit_code {
                    if result.exit_code != expected {
                        return Err(ExError::new(ExErrorKind::Backend)
                            .with_op("exec")
                            .with_entity_id(service_id.to_string())
                            .with_message(format!(
                                "command exited with code {} instead of the expected {}; output: {}",
                                result.exit_code, expected, result.output
                            )));
                    }
                }
                Ok(Some(format!(
                    "exit code {}: {}",
                    result.exit_code, result.output
                )))
            }

            BackendCall::WaitHttp { ip, spec } => {
                self.backend.wait_for_http_endpoint(ip, &spec).await?;
                Ok(None)
            }

            BackendCall::CopyFiles {
                service_id,
                src_path,
                artifact_name,
            } => {
                let handle = self.handle_of(&service_id)?;
                self.backend
                    .copy_files_from_container(&handle, &src_path, &artifact_name)
                    .await?;
                Ok(Some(format!("copied {} from container {}", src_path, handle)))
            }

            BackendCall::RunTask {
                mut spec,
                command,
                store,
            } => {
                let ip = self.network.with_state(|state| state.allocate_ip())??;
                spec.ip = Some(ip);
                let result = self.run_task_container(&spec, &command, &store).await;
                self.network.with_state(|state| state.release_ip(ip))?;
                result
            }
        }
    }

    async fn run_task_container(
        &self,
        spec: &ContainerSpec,
        command: &[String],
        store: &[(String, String)],
    ) -> Result<Option<String>, ExError> {
        self.backend.pull_image(&spec.image).await?;
        let handle = self.backend.create_and_start_container(spec).await?;
        match self.run_task_steps(spec, &handle, command, store).await {
            Ok(detail) => {
                self.backend.stop_container(&handle).await?;
                Ok(Some(detail))
            }
            Err(err) => {
                self.discard_container(&handle).await;
                Err(err)
            }
        }
    }

    async fn run_task_steps(
        &self,
        spec: &ContainerSpec,
        handle: &ContainerHandle,
        command: &[String],
        store: &[(String, String)],
    ) -> Result<String, ExError> {
        let mut detail = format!("task container {}", handle);
        if !command.is_empty() {
            let result = self.backend.exec_in_container(handle, command).await?;
            if result.exit_code != 0 {
                return Err(ExError::new(ExErrorKind::Backend)
                    .with_op("run_task")
                    .with_entity_id(spec.name.clone())
                    .with_message(format!(
                        "task command exited with code {}; output: {}",
                        result.exit_code, result.output
                    )));
            }
            detail.push_str(&format!("; output: {}", result.output));
        }
        for (artifact_name, path) in store {
            self.backend
                .copy_files_from_container(handle, path, artifact_name)
                .await?;
        }
        Ok(detail)
    }

    /// Attach a freshly started container to its service, bind its ports and
    /// refresh traffic control
    async fn wire_container(
        &self,
        service_id: &ServiceId,
        spec: &ContainerSpec,
        handle: &ContainerHandle,
    ) -> Result<String, ExError> {
        self.network
            .with_state(|state| state.attach_container(service_id, handle.clone()))??;

        let mut bindings = Vec::new();
        for (name, port) in &spec.ports {
            let binding = self.backend.bind_host_port(handle, port).await?;
            bindings.push(format!("{}={}:{}", name, binding.host_ip, binding.host_port));
        }

        let state = self.network.snapshot()?;
        if traffic_rules(&state).iter().any(|(_, rules)| !rules.is_empty()) {
            self.push_traffic_control(&state).await?;
        }

        let mut detail = format!("container {}", handle);
        if !bindings.is_empty() {
            detail.push_str(&format!("; ports {}", bindings.join(", ")));
        }
        Ok(detail)
    }

    /// Stop a container whose instruction failed after it was created
    ///
    /// The instruction's own error is what gets reported, so a failed stop
    /// is only logged.
    async fn discard_container(&self, handle: &ContainerHandle) {
        if let Err(err) = self.backend.stop_container(handle).await {
            tracing::warn!(
                container = %handle,
                error = %err,
                "failed to stop container of a failed instruction"
            );
        }
    }

    /// Push the packet-loss rules of `state` to every service with a container
    async fn push_traffic_control(&self, state: &NetworkState) -> Result<usize, ExError> {
        let mut updated = 0;
        for (service_id, rules) in traffic_rules(state) {
            let Some(handle) = state.service(&service_id).and_then(|r| r.handle.clone()) else {
                continue;
            };
            self.backend.update_traffic_control(&handle, &rules).await?;
            updated += 1;
        }
        Ok(updated)
    }

    fn handle_of(&self, service_id: &ServiceId) -> Result<ContainerHandle, ExError> {
        self.network
            .with_state(|state| state.service(service_id).and_then(|r| r.handle.clone()))?
            .ok_or_else(|| {
                ExError::new(ExErrorKind::InvalidState)
                    .with_entity_id(service_id.to_string())
                    .with_message(format!("service '{}' has no running container", service_id))
            })
    }
}

/// Per-service packet loss keyed by peer IP
fn traffic_rules(state: &NetworkState) -> Vec<(ServiceId, BTreeMap<Ipv4Addr, f32>)> {
    state
        .packet_loss_by_service()
        .into_iter()
        .map(|(service_id, targets)| {
            let rules = targets
                .into_iter()
                .filter_map(|(target, loss)| state.service(&target).map(|r| (r.ip, loss)))
                .collect();
            (service_id, rules)
        })
        .collect()
}

fn prepare(
    instruction: &Instruction,
    effect: &ModelEffect,
    state: &NetworkState,
) -> Result<BackendCall, NetworkError> {
    let resolve = |text: &str| substitute(text, |id| state.service(id).map(|r| r.ip));
    let resolve_all = |items: &[String]| -> Result<Vec<String>, NetworkError> {
        items.iter().map(|s| resolve(s)).collect()
    };

    let call = match (instruction, effect) {
        (
            Instruction::StartService { service_id, config }
            | Instruction::AddService {
                service_id, config, ..
            },
            ModelEffect::Started { ip, .. } | ModelEffect::Added { ip, .. },
        ) => BackendCall::StartContainer {
            service_id: service_id.clone(),
            spec: service_container_spec(service_id, config, *ip, &resolve)?,
        },

        (_, ModelEffect::Removed { record }) => BackendCall::StopContainer {
            handle: record.handle.clone(),
        },

        (Instruction::Repartition(_), _) => BackendCall::TrafficControl,

        (
            Instruction::ExecCommand {
                service_id,
                command,
                expected_exit_code,
            },
            _,
        ) => BackendCall::Exec {
            service_id: service_id.clone(),
            command: resolve_all(command)?,
            expected_exit_code: *expected_exit_code,
        },

        (
            Instruction::WaitForHttpEndpoint {
                service_id,
                port,
                path,
                initial_delay_ms,
                retries,
                retry_delay_ms,
                body_text,
            },
            _,
        ) => BackendCall::WaitHttp {
            ip: state
                .service(service_id)
                .map(|r| r.ip)
                .ok_or_else(|| NetworkError::UnknownService {
                    service_id: service_id.to_string(),
                })?,
            spec: HttpWaitSpec {
                port: *port,
                path: path.clone(),
                initial_delay_ms: *initial_delay_ms,
                retries: *retries,
                retry_delay_ms: *retry_delay_ms,
                body_text: body_text.clone(),
            },
        },

        (
            Instruction::StoreFilesArtifact {
                service_id,
                src_path,
                artifact_name,
            },
            _,
        ) => BackendCall::CopyFiles {
            service_id: service_id.clone(),
            src_path: src_path.clone(),
            artifact_name: artifact_name.clone(),
        },

        (Instruction::RunTask(task), _) => BackendCall::RunTask {
            spec: ContainerSpec {
                name: task.name.clone(),
                image: task.image.clone(),
                env: resolve_env(&task.env, &resolve)?,
                files: task.files.clone(),
                ..ContainerSpec::default()
            },
            command: resolve_all(&task.command)?,
            store: task
                .store
                .iter()
                .map(|(name, path)| (name.clone(), path.clone()))
                .collect(),
        },

        _ => BackendCall::None,
    };
    Ok(call)
}

fn service_container_spec(
    service_id: &ServiceId,
    config: &ServiceConfig,
    ip: Ipv4Addr,
    resolve: &impl Fn(&str) -> Result<String, NetworkError>,
) -> Result<ContainerSpec, NetworkError> {
    Ok(ContainerSpec {
        name: service_id.to_string(),
        image: config.image.clone(),
        ip: Some(ip),
        ports: config.ports.clone(),
        entrypoint: config
            .entrypoint
            .iter()
            .map(|s| resolve(s))
            .collect::<Result<_, _>>()?,
        cmd: config
            .cmd
            .iter()
            .map(|s| resolve(s))
            .collect::<Result<_, _>>()?,
        env: resolve_env(&config.env, resolve)?,
        files: config.files.clone(),
        data_dir_mount: config.data_dir_mount.clone(),
    })
}

fn resolve_env(
    env: &BTreeMap<String, String>,
    resolve: &impl Fn(&str) -> Result<String, NetworkError>,
) -> Result<BTreeMap<String, String>, NetworkError> {
    env.iter()
        .map(|(k, v)| Ok((k.clone(), resolve(v)?)))
        .collect()
}

/// Output message; depends on the model effect only
fn describe(instruction: &Instruction, effect: &ModelEffect) -> String {
    match (instruction, effect) {
        (_, ModelEffect::Registered { service_id, ip }) => {
            format!("Service '{}' registered with IP {}", service_id, ip)
        }
        (_, ModelEffect::Started { service_id, ip }) => {
            format!("Service '{}' started with IP {}", service_id, ip)
        }
        (_, ModelEffect::Added { service_id, ip }) => {
            format!("Service '{}' added with IP {}", service_id, ip)
        }
        (_, ModelEffect::Removed { record }) => {
            format!("Service '{}' removed, IP {} released", record.id, record.ip)
        }
        (Instruction::Repartition(spec), _) => format!(
            "Network repartitioned into {} named partition(s)",
            spec.partitions.len()
        ),
        (Instruction::ExecCommand { service_id, .. }, _) => {
            format!("Command executed on service '{}'", service_id)
        }
        (
            Instruction::WaitForHttpEndpoint {
                service_id,
                port,
                path,
                ..
            },
            _,
        ) => format!(
            "HTTP endpoint '{}' on port {} of service '{}' is available",
            path, port, service_id
        ),
        (
            Instruction::StoreFilesArtifact {
                service_id,
                artifact_name,
                ..
            },
            _,
        ) => format!(
            "Files artifact '{}' stored from service '{}'",
            artifact_name, service_id
        ),
        (Instruction::RunTask(task), ModelEffect::TaskScheduled { stored }) => {
            if stored.is_empty() {
                format!("Task '{}' completed", task.name)
            } else {
                format!(
                    "Task '{}' completed, stored artifacts: {}",
                    task.name,
                    stored.join(", ")
                )
            }
        }
        (Instruction::Print { message }, _) => message.clone(),
        (other, _) => format!("{} completed", other.name()),
    }
}
