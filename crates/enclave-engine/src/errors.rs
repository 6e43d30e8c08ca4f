//! Phase errors
//!
//! Interpretation, validation and execution each report failures through
//! their own type. All three carry an [`ExErrorKind`], a message and an
//! optional chained [`ExError`] cause; validation and execution errors also
//! carry the 1-based number of the instruction they concern.

use std::fmt;

use enclave_core::errors::{ExError, ExErrorKind, NetworkError};
use enclave_core::plan::SourcePosition;
use thiserror::Error;

use crate::backend::BackendError;
use crate::module_provider::ModuleProviderError;

/// Script or bulk document could not be turned into a plan
#[derive(Debug, Clone, PartialEq)]
pub struct InterpretationError {
    kind: ExErrorKind,
    message: String,
    position: Option<SourcePosition>,
    cause: Option<ExError>,
}

impl InterpretationError {
    pub fn new(kind: ExErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            position: None,
            cause: None,
        }
    }

    /// Attach a source position unless one is already set
    pub fn at(mut self, position: SourcePosition) -> Self {
        if self.position.is_none() {
            self.position = Some(position);
        }
        self
    }

    pub fn with_cause(mut self, cause: ExError) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn position(&self) -> Option<&SourcePosition> {
        self.position.as_ref()
    }

    pub fn cause(&self) -> Option<&ExError> {
        self.cause.as_ref()
    }
}

impl fmt::Display for InterpretationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Evaluation error: {}", self.message)?;
        if let Some(position) = &self.position {
            write!(f, "\n\tat {}", position)?;
        }
        Ok(())
    }
}

impl std::error::Error for InterpretationError {}

impl From<ModuleProviderError> for InterpretationError {
    fn from(err: ModuleProviderError) -> Self {
        let cause: ExError = err.clone().into();
        InterpretationError::new(cause.kind(), err.to_string()).with_cause(cause)
    }
}

impl From<NetworkError> for InterpretationError {
    fn from(err: NetworkError) -> Self {
        let cause: ExError = err.into();
        InterpretationError::new(cause.kind(), cause.message().to_string()).with_cause(cause)
    }
}

impl From<InterpretationError> for ExError {
    fn from(err: InterpretationError) -> Self {
        let mut ex = ExError::new(err.kind)
            .with_op("interpret")
            .with_message(err.message);
        if let Some(position) = err.position {
            ex = ex.with_entity_id(position.to_string());
        }
        match err.cause {
            Some(cause) => ex.with_source(cause),
            None => ex,
        }
    }
}

/// A plan precondition that does not hold
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    kind: ExErrorKind,
    instruction_number: u32,
    message: String,
    cause: Option<ExError>,
}

impl ValidationError {
    pub fn new(instruction_number: u32, kind: ExErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            instruction_number,
            message: message.into(),
            cause: None,
        }
    }

    /// Validation error whose kind and message come from a model error
    pub fn from_network(instruction_number: u32, err: NetworkError) -> Self {
        let cause: ExError = err.into();
        Self::new(instruction_number, cause.kind(), cause.message().to_string()).with_cause(cause)
    }

    pub fn with_cause(mut self, cause: ExError) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    pub fn instruction_number(&self) -> u32 {
        self.instruction_number
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&ExError> {
        self.cause.as_ref()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Validation failed for instruction (number {}): {}",
            self.instruction_number, self.message
        )
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ExError {
    fn from(err: ValidationError) -> Self {
        let ex = ExError::new(err.kind)
            .with_op("validate")
            .with_ordinal(err.instruction_number)
            .with_message(err.message);
        match err.cause {
            Some(cause) => ex.with_source(cause),
            None => ex,
        }
    }
}

/// The instruction that stopped a run
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionError {
    kind: ExErrorKind,
    instruction_number: u32,
    succeeded: usize,
    message: String,
    position: Option<SourcePosition>,
    cause: Option<ExError>,
}

impl ExecutionError {
    pub fn new(
        instruction_number: u32,
        succeeded: usize,
        kind: ExErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            instruction_number,
            succeeded,
            message: message.into(),
            position: None,
            cause: None,
        }
    }

    pub fn at(mut self, position: Option<SourcePosition>) -> Self {
        self.position = position;
        self
    }

    pub fn with_cause(mut self, cause: ExError) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    pub fn instruction_number(&self) -> u32 {
        self.instruction_number
    }

    /// Instructions that completed before this one failed
    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn position(&self) -> Option<&SourcePosition> {
        self.position.as_ref()
    }

    pub fn cause(&self) -> Option<&ExError> {
        self.cause.as_ref()
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "An error occurred executing instruction (number {})",
            self.instruction_number
        )?;
        if let Some(position) = &self.position {
            write!(f, " at {}", position)?;
        }
        write!(f, ":\n{}", self.message)
    }
}

impl std::error::Error for ExecutionError {}

impl From<ExecutionError> for ExError {
    fn from(err: ExecutionError) -> Self {
        let ex = ExError::new(err.kind)
            .with_op("execute")
            .with_ordinal(err.instruction_number)
            .with_message(err.message);
        match err.cause {
            Some(cause) => ex.with_source(cause),
            None => ex,
        }
    }
}

/// Failures outside a single run (setup, configuration)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl From<EngineError> for ExError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Config { message } => ExError::new(ExErrorKind::Config)
                .with_op("load_config")
                .with_message(message),
            EngineError::Network(inner) => inner.into(),
        }
    }
}

impl From<BackendError> for ExError {
    fn from(err: BackendError) -> Self {
        let message = err.to_string();
        let kind = match &err {
            BackendError::ImageNotFound { .. } => ExErrorKind::ImageUnavailable,
            BackendError::Timeout { .. } => ExErrorKind::Timeout,
            BackendError::ContainerNotFound { .. } => ExErrorKind::NotFound,
            BackendError::ExecFailed { .. } | BackendError::Runtime { .. } => ExErrorKind::Backend,
        };
        let ex = ExError::new(kind).with_message(message);
        match err {
            BackendError::ImageNotFound { image } => ex.with_entity_id(image),
            BackendError::ContainerNotFound { handle } => ex.with_entity_id(handle),
            _ => ex,
        }
    }
}

impl From<ModuleProviderError> for ExError {
    fn from(err: ModuleProviderError) -> Self {
        let message = err.to_string();
        match err {
            ModuleProviderError::NotFound { locator } => {
                ExError::new(ExErrorKind::ModuleNotFound)
                    .with_entity_id(locator)
                    .with_message(message)
            }
            ModuleProviderError::Unreadable { locator, .. } => {
                ExError::new(ExErrorKind::InvalidInput)
                    .with_entity_id(locator)
                    .with_message(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_message_names_instruction() {
        let err = ExecutionError::new(2, 1, ExErrorKind::Backend, "boom")
            .at(Some(SourcePosition::new("main.star", 12, 1)));
        let rendered = err.to_string();
        assert!(rendered
            .starts_with("An error occurred executing instruction (number 2) at main.star:12:1:"));
        assert!(rendered.contains("boom"));
    }

    #[test]
    fn test_validation_error_from_network_keeps_cause() {
        let err = ValidationError::from_network(
            3,
            NetworkError::UnknownService {
                service_id: "ghost".to_string(),
            },
        );
        assert_eq!(err.kind(), ExErrorKind::NotFound);
        assert_eq!(err.instruction_number(), 3);
        assert_eq!(err.cause().and_then(|c| c.entity_id()), Some("ghost"));

        let ex: ExError = err.into();
        assert_eq!(ex.ordinal(), Some(3));
        assert_eq!(ex.root_cause().kind(), ExErrorKind::NotFound);
    }

    #[test]
    fn test_interpretation_error_keeps_first_position() {
        let err = InterpretationError::new(ExErrorKind::Syntax, "bad")
            .at(SourcePosition::new("inner.star", 1, 2))
            .at(SourcePosition::new("main.star", 9, 9));
        assert_eq!(err.position().map(|p| p.locator.as_str()), Some("inner.star"));
    }
}
