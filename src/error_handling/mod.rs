//! Error handling and intake statistics.
//!
//! This module provides:
//! - Error type definitions for every stage of the pipeline
//! - Intake statistics tracking (received, dropped, committed, failed)
//!
//! Errors fall into the four classes the pipeline reacts to differently:
//! - **Connectivity**: store or broker unreachable; retried with backoff
//! - **Validation**: a single record is unusable; only that record is skipped
//! - **Commit**: the batch write failed; the whole batch is retried later
//! - **Decode**: the message body is not a telemetry object; it is dropped

mod stats;
mod types;

// Re-export public API
pub use stats::{IntakeEvent, IntakeStats};
pub use types::{
    CommitError, ConfigError, ConnectionError, DecodeError, InitializationError, QueueError,
    SchemaError, ValidationError, ValidationIssue,
};
