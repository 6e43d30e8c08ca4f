//! Enclave Core - service-network model and instruction set
//!
//! This crate provides the in-memory state of one enclave and the
//! operations a plan is made of:
//! - Service ids, ports, lifecycle records and container handles
//! - Deterministic IP allocation within the enclave subnet
//! - Partition topology with pairwise connection rules
//! - The closed `Instruction` set and its canonical rendering
//! - `Plan`, an ordered list of instructions with source positions
//! - `apply()`, the atomic model-level effect of one instruction
//! - The error and logging facilities shared with the engine

pub mod apply;
pub mod errors;
pub mod instruction;
pub mod logging_facility;
pub mod model;
pub mod ops;
pub mod plan;
pub mod rules;

// Re-export commonly used types
pub use apply::{apply, ModelEffect};
pub use errors::{ExError, ExErrorKind, NetworkError, Result};
pub use instruction::{Instruction, RepartitionSpec, ServiceConfig, TaskConfig};
pub use model::{Connection, PartitionId, PortSpec, ServiceId, ServiceIdSet};
pub use ops::{NetworkSettings, NetworkState, ServiceNetwork, Subnet};
pub use plan::{Plan, PlannedInstruction, SourcePosition};
