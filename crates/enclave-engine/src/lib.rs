//! Enclave Engine - plan orchestration
//!
//! Turns user input into plans and runs them against an enclave:
//! - Script interpreter and the legacy bulk-command reader
//! - Validator: simulated walk plus bounded-parallel image checks
//! - Executor: per-instruction checkpoint, model effect, backend effect
//! - `Enclave`, the run facade tying the phases together
//!
//! Container work goes through the [`backend::Backend`] trait; module
//! sources come from a [`module_provider::ModuleContentProvider`].

pub mod backend;
pub mod bulk;
pub mod cancel;
pub mod config;
pub mod enclave;
pub mod errors;
pub mod executor;
pub mod interpreter;
pub mod magic;
pub mod module_provider;
pub mod plan_builder;
pub mod plan_description;
pub mod validator;

pub use backend::{
    Backend, BackendError, ContainerSpec, ExecResult, HostPortBinding, HttpWaitSpec, ImageProbe,
};
pub use cancel::Cancellation;
pub use config::{EngineConfig, RunOptions};
pub use enclave::{Enclave, PlanExecutionResult};
pub use errors::{EngineError, ExecutionError, InterpretationError, ValidationError};
pub use executor::{InstructionOutput, InstructionState, RunState};
pub use module_provider::{InMemoryModuleProvider, ModuleContentProvider, ModuleProviderError};
pub use plan_description::PlanDescription;
