use enclave_core_types::{RunId, TraceId};
use thiserror::Error;

/// Result type alias using NetworkError
pub type Result<T> = std::result::Result<T, NetworkError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Every error surfaced by the model, the interpreter, the validator or the
/// executor is classified by one of these kinds. Each kind maps to a stable
/// error code that tests and callers match on instead of message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExErrorKind {
    // Structural/Validation
    InvalidInput,
    InvalidServiceId,
    NotFound,
    DuplicateServiceId,
    AlreadyExists,
    InvalidState,

    // Network model
    AddressSpaceExhausted,
    InvalidSubnet,
    PartitionOverlap,
    UnknownPartition,
    PartitioningDisabled,
    InvalidPacketLoss,

    // Interpretation
    Syntax,
    TypeMismatch,
    UndefinedName,
    ModuleNotFound,
    SymbolNotFound,
    CycleDetected,
    InvalidArguments,
    UnsupportedSchemaVersion,
    UnknownCommand,

    // Validation
    ImageUnavailable,
    UndeclaredPort,
    UnknownArtifact,

    // Integration/IO
    Backend,
    Timeout,
    Serialization,
    Config,
    Concurrency,
    Cancelled,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::InvalidServiceId => "ERR_INVALID_SERVICE_ID",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::DuplicateServiceId => "ERR_DUPLICATE_SERVICE_ID",
            ExErrorKind::AlreadyExists => "ERR_ALREADY_EXISTS",
            ExErrorKind::InvalidState => "ERR_INVALID_STATE",
            ExErrorKind::AddressSpaceExhausted => "ERR_ADDRESS_SPACE_EXHAUSTED",
            ExErrorKind::InvalidSubnet => "ERR_INVALID_SUBNET",
            ExErrorKind::PartitionOverlap => "ERR_PARTITION_OVERLAP",
            ExErrorKind::UnknownPartition => "ERR_UNKNOWN_PARTITION",
            ExErrorKind::PartitioningDisabled => "ERR_PARTITIONING_DISABLED",
            ExErrorKind::InvalidPacketLoss => "ERR_INVALID_PACKET_LOSS",
            ExErrorKind::Syntax => "ERR_SYNTAX",
            ExErrorKind::TypeMismatch => "ERR_TYPE_MISMATCH",
            ExErrorKind::UndefinedName => "ERR_UNDEFINED_NAME",
            ExErrorKind::ModuleNotFound => "ERR_MODULE_NOT_FOUND",
            ExErrorKind::SymbolNotFound => "ERR_SYMBOL_NOT_FOUND",
            ExErrorKind::CycleDetected => "ERR_CYCLE_DETECTED",
            ExErrorKind::InvalidArguments => "ERR_INVALID_ARGUMENTS",
            ExErrorKind::UnsupportedSchemaVersion => "ERR_UNSUPPORTED_SCHEMA_VERSION",
            ExErrorKind::UnknownCommand => "ERR_UNKNOWN_COMMAND",
            ExErrorKind::ImageUnavailable => "ERR_IMAGE_UNAVAILABLE",
            ExErrorKind::UndeclaredPort => "ERR_UNDECLARED_PORT",
            ExErrorKind::UnknownArtifact => "ERR_UNKNOWN_ARTIFACT",
            ExErrorKind::Backend => "ERR_BACKEND",
            ExErrorKind::Timeout => "ERR_TIMEOUT",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Config => "ERR_CONFIG",
            ExErrorKind::Concurrency => "ERR_CONCURRENCY",
            ExErrorKind::Cancelled => "ERR_CANCELLED",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries a classification for programmatic handling plus optional
/// context (operation, entity, instruction ordinal, correlation ids) and a
/// chained cause.
#[derive(Debug, Clone, PartialEq)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    ordinal: Option<u32>,
    run_id: Option<RunId>,
    trace_id: Option<TraceId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            ordinal: None,
            run_id: None,
            trace_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity ID context (service, partition, image, module...)
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add ordinal context (1-based instruction number)
    pub fn with_ordinal(mut self, ordinal: u32) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn ordinal(&self) -> Option<u32> {
        self.ordinal
    }

    pub fn run_id(&self) -> Option<&RunId> {
        self.run_id.as_ref()
    }

    pub fn trace_id(&self) -> Option<&TraceId> {
        self.trace_id.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }

    /// Innermost error of the cause chain (self when there is no source)
    pub fn root_cause(&self) -> &ExError {
        let mut current = self;
        while let Some(next) = current.source_error() {
            current = next;
        }
        current
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        if let Some(ordinal) = self.ordinal {
            write!(f, " (instruction: {})", ordinal)?;
        }
        if let Some(source) = &self.source {
            write!(f, ": caused by {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Failures of the service-network model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    /// Service id is empty or whitespace-only
    #[error("Invalid service id: '{service_id}'")]
    InvalidServiceId { service_id: String },

    #[error("Service already registered: {service_id}")]
    DuplicateServiceId { service_id: String },

    #[error("Unknown service: {service_id}")]
    UnknownService { service_id: String },

    #[error("Service {service_id} is already started")]
    ServiceAlreadyStarted { service_id: String },

    #[error("Service {service_id} is not started")]
    ServiceNotStarted { service_id: String },

    /// Every address of the subnet is taken
    #[error("No free IP address left in subnet {subnet}")]
    AddressSpaceExhausted { subnet: String },

    #[error("Invalid subnet '{subnet}': {reason}")]
    InvalidSubnet { subnet: String, reason: String },

    /// A service appears in more than one target partition
    #[error("Service {service_id} is assigned to both partition {first} and partition {second}")]
    PartitionOverlap {
        service_id: String,
        first: String,
        second: String,
    },

    #[error("Partition {partition_id} names unknown service {service_id}")]
    UnknownServiceInPartition {
        service_id: String,
        partition_id: String,
    },

    #[error("Unknown partition: {partition_id}")]
    UnknownPartition { partition_id: String },

    #[error("Partitioning is disabled for this enclave")]
    PartitioningDisabled,

    #[error("Packet loss percentage {percentage} is outside [0, 100]")]
    InvalidPacketLoss { percentage: f32 },

    #[error("Files artifact already exists: {name}")]
    DuplicateArtifact { name: String },

    #[error("Unknown files artifact: {name}")]
    UnknownArtifact { name: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Model state could not be accessed (poisoned lock)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<NetworkError> for ExError {
    fn from(err: NetworkError) -> Self {
        let message = err.to_string();
        match err {
            NetworkError::InvalidServiceId { service_id } => {
                ExError::new(ExErrorKind::InvalidServiceId)
                    .with_entity_id(service_id)
                    .with_message(message)
            }

            NetworkError::DuplicateServiceId { service_id } => {
                ExError::new(ExErrorKind::DuplicateServiceId)
                    .with_entity_id(service_id)
                    .with_message(message)
            }

            NetworkError::UnknownService { service_id } => ExError::new(ExErrorKind::NotFound)
                .with_entity_id(service_id)
                .with_message(message),

            NetworkError::ServiceAlreadyStarted { service_id }
            | NetworkError::ServiceNotStarted { service_id } => {
                ExError::new(ExErrorKind::InvalidState)
                    .with_entity_id(service_id)
                    .with_message(message)
            }

            NetworkError::AddressSpaceExhausted { subnet } => {
                ExError::new(ExErrorKind::AddressSpaceExhausted)
                    .with_entity_id(subnet)
                    .with_message(message)
            }

            NetworkError::InvalidSubnet { subnet, .. } => {
                ExError::new(ExErrorKind::InvalidSubnet)
                    .with_entity_id(subnet)
                    .with_message(message)
            }

            NetworkError::PartitionOverlap { service_id, .. } => {
                ExError::new(ExErrorKind::PartitionOverlap)
                    .with_op("repartition")
                    .with_entity_id(service_id)
                    .with_message(message)
            }

            NetworkError::UnknownServiceInPartition { service_id, .. } => {
                ExError::new(ExErrorKind::NotFound)
                    .with_op("repartition")
                    .with_entity_id(service_id)
                    .with_message(message)
            }

            NetworkError::UnknownPartition { partition_id } => {
                ExError::new(ExErrorKind::UnknownPartition)
                    .with_entity_id(partition_id)
                    .with_message(message)
            }

            NetworkError::PartitioningDisabled => {
                ExError::new(ExErrorKind::PartitioningDisabled).with_message(message)
            }

            NetworkError::InvalidPacketLoss { .. } => {
                ExError::new(ExErrorKind::InvalidPacketLoss).with_message(message)
            }

            NetworkError::DuplicateArtifact { name } => ExError::new(ExErrorKind::AlreadyExists)
                .with_entity_id(name)
                .with_message(message),

            NetworkError::UnknownArtifact { name } => ExError::new(ExErrorKind::UnknownArtifact)
                .with_entity_id(name)
                .with_message(message),

            NetworkError::Serialization { .. } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }

            NetworkError::Internal { .. } => {
                ExError::new(ExErrorKind::Internal).with_message(message)
            }
        }
    }
}

impl From<serde_json::Error> for NetworkError {
    fn from(err: serde_json::Error) -> Self {
        NetworkError::Serialization {
            message: err.to_string(),
        }
    }
}
