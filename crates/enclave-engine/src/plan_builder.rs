//! Plan assembly shared by script builtins and the bulk command reader
//!
//! Both front ends push instructions through a [`PlanBuilder`] and check
//! argument values with the functions below, so a script and the equivalent
//! bulk document are rejected with the same error kind. Each check takes the
//! caller's name (`"ServiceConfig()"`, `"START_SERVICE"`) as a message prefix.

use std::collections::{BTreeMap, BTreeSet};

use enclave_core::errors::ExErrorKind;
use enclave_core::instruction::Instruction;
use enclave_core::model::{Connection, PartitionConnectionId, PartitionId, ServiceId};
use enclave_core::plan::{Plan, SourcePosition};
use enclave_core_types::schema::{FIELD_INSTRUCTION_KIND, FIELD_SERVICE_ID};

use crate::errors::InterpretationError;

type Result<T> = std::result::Result<T, InterpretationError>;

/// Collects instructions and the service ids the plan has declared so far
#[derive(Debug)]
pub struct PlanBuilder {
    plan: Plan,
    declared: BTreeSet<ServiceId>,
}

impl PlanBuilder {
    pub fn new(plan: Plan) -> Self {
        Self {
            plan,
            declared: BTreeSet::new(),
        }
    }

    pub fn into_plan(self) -> Plan {
        self.plan
    }

    pub fn emit(&mut self, instruction: Instruction, position: &SourcePosition) {
        tracing::debug!(
            { FIELD_INSTRUCTION_KIND } = instruction.name(),
            position = %position,
            "instruction emitted"
        );
        self.plan.push(instruction, Some(position.clone()));
    }

    /// Record that the plan registers `service_id`
    ///
    /// # Errors
    ///
    /// `DuplicateServiceId` when the id was declared before and not removed
    /// since.
    pub fn declare(&mut self, service_id: &ServiceId) -> Result<()> {
        if !self.declared.insert(service_id.clone()) {
            tracing::debug!({ FIELD_SERVICE_ID } = %service_id, "duplicate declaration");
            return Err(InterpretationError::new(
                ExErrorKind::DuplicateServiceId,
                format!(
                    "service id '{}' is already declared earlier in this plan",
                    service_id
                ),
            ));
        }
        Ok(())
    }

    pub fn forget(&mut self, service_id: &ServiceId) {
        self.declared.remove(service_id);
    }
}

/// # Errors
///
/// `InvalidServiceId` for a blank id.
pub fn service_id(caller: &str, raw: String) -> Result<ServiceId> {
    let id = ServiceId::from(raw);
    if id.is_blank() {
        return Err(InterpretationError::new(
            ExErrorKind::InvalidServiceId,
            format!("{} service id must not be empty", caller),
        ));
    }
    Ok(id)
}

/// # Errors
///
/// `InvalidArguments` for a blank image reference.
pub fn require_image(caller: &str, image: &str) -> Result<()> {
    require_non_blank(caller, "image", image)
}

/// # Errors
///
/// `InvalidArguments` for a blank artifact name.
pub fn require_artifact_name(caller: &str, name: &str) -> Result<()> {
    require_non_blank(caller, "artifact name", name)
}

/// # Errors
///
/// `InvalidArguments` for a blank partition id.
pub fn partition_id(caller: &str, raw: String) -> Result<PartitionId> {
    if raw.trim().is_empty() {
        return Err(invalid_arguments(format!(
            "{} partition ids must not be empty",
            caller
        )));
    }
    Ok(PartitionId::from(raw))
}

/// # Errors
///
/// `InvalidArguments` for an empty command.
pub fn require_command(caller: &str, command: &[String]) -> Result<()> {
    if command.is_empty() {
        return Err(invalid_arguments(format!(
            "{} command must not be empty",
            caller
        )));
    }
    Ok(())
}

/// Add the connection between `first` and `second`
///
/// # Errors
///
/// `InvalidArguments` when the pair already has a connection, in either
/// order.
pub fn insert_connection(
    caller: &str,
    connections: &mut BTreeMap<PartitionConnectionId, Connection>,
    first: &str,
    second: &str,
    connection: Connection,
) -> Result<()> {
    let id = PartitionConnectionId::new(
        PartitionId::from(first.to_string()),
        PartitionId::from(second.to_string()),
    );
    if connections.insert(id, connection).is_some() {
        return Err(invalid_arguments(format!(
            "{} connection between '{}' and '{}' given twice",
            caller, first, second
        )));
    }
    Ok(())
}

fn require_non_blank(caller: &str, what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid_arguments(format!(
            "{} {} must not be empty",
            caller, what
        )));
    }
    Ok(())
}

pub(crate) fn invalid_arguments(message: impl Into<String>) -> InterpretationError {
    InterpretationError::new(ExErrorKind::InvalidArguments, message)
}
