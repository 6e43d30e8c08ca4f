//! Model-level apply function
//!
//! `apply()` performs the part of an instruction that concerns the
//! service-network model only: registering ids, allocating IPs, lifecycle
//! transitions, partition layout and artifact bookkeeping. Container work is
//! the engine's business and happens after the model has accepted the
//! instruction.
//!
//! ## Atomicity Contract
//!
//! - **All-or-nothing**: on `Err` the state is exactly as it was before
//! - **No panics**: invalid input returns typed errors
//! - **Deterministic**: the same state and instruction always give the same
//!   effect, including the same allocated IPs
//!
//! ## Example
//!
//! ```
//! use enclave_core::apply::{apply, ModelEffect};
//! use enclave_core::instruction::Instruction;
//! use enclave_core::model::Connection;
//! use enclave_core::ops::{NetworkSettings, NetworkState};
//!
//! let mut state = NetworkState::new(NetworkSettings {
//!     subnet: "10.0.0.0/24".parse().unwrap(),
//!     reserved_ips: vec![],
//!     partitioning_enabled: true,
//!     default_connection: Connection::unblocked(),
//! });
//! let effect = apply(
//!     &mut state,
//!     &Instruction::RegisterService { service_id: "db".into(), partition_id: None },
//! )
//! .unwrap();
//! assert!(matches!(effect, ModelEffect::Registered { .. }));
//! ```

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::errors::{NetworkError, Result};
use crate::instruction::Instruction;
use crate::model::{ServiceId, ServiceRecord};
use crate::ops::NetworkState;

/// What an instruction did to the model
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEffect {
    Registered {
        service_id: ServiceId,
        ip: Ipv4Addr,
    },
    Started {
        service_id: ServiceId,
        ip: Ipv4Addr,
    },
    /// Registered and started
    Added {
        service_id: ServiceId,
        ip: Ipv4Addr,
    },
    /// The record as it was just before removal
    Removed { record: ServiceRecord },
    /// New per-service packet loss toward services in other partitions
    Repartitioned {
        packet_loss: BTreeMap<ServiceId, BTreeMap<ServiceId, f32>>,
    },
    ArtifactStored { name: String },
    TaskScheduled { stored: Vec<String> },
    /// The instruction has no model-level effect beyond its checks
    Unchanged,
}

/// Apply the model part of one instruction
///
/// # Errors
///
/// Any [`NetworkError`] raised by the underlying operation; the state is
/// left untouched.
pub fn apply(state: &mut NetworkState, instruction: &Instruction) -> Result<ModelEffect> {
    match instruction {
        Instruction::RegisterService {
            service_id,
            partition_id,
        } => {
            let ip = state.register_service(service_id.clone(), partition_id.clone())?;
            Ok(ModelEffect::Registered {
                service_id: service_id.clone(),
                ip,
            })
        }

        Instruction::StartService { service_id, config } => {
            state.require_files_artifacts(config.files.values())?;
            state.mark_started(service_id, None, config.ports.clone())?;
            let ip = service_ip(state, service_id)?;
            Ok(ModelEffect::Started {
                service_id: service_id.clone(),
                ip,
            })
        }

        Instruction::AddService {
            service_id,
            partition_id,
            config,
        } => {
            state.require_files_artifacts(config.files.values())?;
            let ip = state.register_service(service_id.clone(), partition_id.clone())?;
            // a fresh registration cannot already be started
            state.mark_started(service_id, None, config.ports.clone())?;
            Ok(ModelEffect::Added {
                service_id: service_id.clone(),
                ip,
            })
        }

        Instruction::RemoveService { service_id } => {
            let record = state
                .service(service_id)
                .cloned()
                .ok_or_else(|| NetworkError::UnknownService {
                    service_id: service_id.to_string(),
                })?;
            state.remove_service(service_id)?;
            Ok(ModelEffect::Removed { record })
        }

        Instruction::Repartition(spec) => {
            state.repartition(
                spec.partitions.clone(),
                spec.connections.clone(),
                spec.default_connection,
            )?;
            Ok(ModelEffect::Repartitioned {
                packet_loss: state.packet_loss_by_service(),
            })
        }

        Instruction::ExecCommand { service_id, .. }
        | Instruction::WaitForHttpEndpoint { service_id, .. } => {
            require_started(state, service_id)?;
            Ok(ModelEffect::Unchanged)
        }

        Instruction::StoreFilesArtifact {
            service_id,
            artifact_name,
            ..
        } => {
            require_started(state, service_id)?;
            state.add_files_artifact(artifact_name.clone())?;
            Ok(ModelEffect::ArtifactStored {
                name: artifact_name.clone(),
            })
        }

        Instruction::RunTask(task) => {
            state.require_files_artifacts(task.files.values())?;
            if let Some(name) = task.store.keys().find(|n| state.has_files_artifact(n)) {
                return Err(NetworkError::DuplicateArtifact { name: name.clone() });
            }
            let stored: Vec<String> = task.store.keys().cloned().collect();
            for name in &stored {
                state.add_files_artifact(name.clone())?;
            }
            Ok(ModelEffect::TaskScheduled { stored })
        }

        Instruction::Print { .. } => Ok(ModelEffect::Unchanged),
    }
}

fn service_ip(state: &NetworkState, service_id: &ServiceId) -> Result<Ipv4Addr> {
    state
        .service(service_id)
        .map(|record| record.ip)
        .ok_or_else(|| NetworkError::UnknownService {
            service_id: service_id.to_string(),
        })
}

fn require_started(state: &NetworkState, service_id: &ServiceId) -> Result<()> {
    let record = state
        .service(service_id)
        .ok_or_else(|| NetworkError::UnknownService {
            service_id: service_id.to_string(),
        })?;
    if !record.is_started() {
        return Err(NetworkError::ServiceNotStarted {
            service_id: service_id.to_string(),
        });
    }
    Ok(())
}
