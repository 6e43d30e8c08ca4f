//! Canonical schema constants for structured logging and events
//!
//! These constants keep field names identical across the interpreter,
//! validator and executor log lines.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_RUN_ID: &str = "run_id";
pub const FIELD_TRACE_ID: &str = "trace_id";

// Entity identifiers
pub const FIELD_SERVICE_ID: &str = "service_id";
pub const FIELD_PARTITION_ID: &str = "partition_id";
pub const FIELD_INSTRUCTION_NUMBER: &str = "instruction_number";
pub const FIELD_INSTRUCTION_KIND: &str = "instruction_kind";

// Collection sizes
pub const FIELD_PLAN_LEN: &str = "plan_len";
pub const FIELD_ERROR_COUNT: &str = "error_count";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
