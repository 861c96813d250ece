//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (thresholds, timeouts, queue defaults)
//! - CLI option types and parsing
//! - Validation of names that end up in SQL text or on the NSQ wire

mod constants;
mod types;

// Re-export all constants
pub use constants::*;
pub use types::{
    is_valid_identifier, is_valid_nsq_name, BackoffKind, BatchConfig, Config, LogFormat, LogLevel,
};
