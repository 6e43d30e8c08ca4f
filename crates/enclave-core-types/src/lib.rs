//! Core types shared across the enclave crates
//!
//! This crate provides foundational types used by the error handling and
//! logging facilities and by the plan engine:
//!
//! - **Correlation types**: RunId, TraceId, RunContext
//! - **Schema constants**: Canonical field keys and event names

pub mod correlation;
pub mod schema;

pub use correlation::{RunContext, RunId, TraceId};
