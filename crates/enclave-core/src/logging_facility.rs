//! Structured logging for enclave runs
//!
//! Engine operations log one `start` event and one `end` or `end_error`
//! event each, through [`log_op_start!`](crate::log_op_start),
//! [`log_op_end!`](crate::log_op_end) and
//! [`log_op_error!`](crate::log_op_error). Field names come from
//! `enclave_core_types::schema`.
//!
//! ```rust
//! use enclave_core::logging_facility::{init, LogSettings};
//!
//! init(&LogSettings::default());
//! ```

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, LogFormat, LogSettings};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
