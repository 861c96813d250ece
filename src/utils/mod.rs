//! Shared utilities.
//!
//! This module provides:
//! - Bounded retry with a configurable backoff policy
//! - Sanitizing of untrusted message bodies before they reach the log

mod retry;
pub mod sanitize;

pub use retry::{retry_with_backoff, BackoffPolicy};
