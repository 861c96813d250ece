//! Application initialization.
//!
//! Sets up process-wide state before the consumer starts. Store and queue
//! connections are opened by the run itself so they can be retried.

mod logger;

// Re-export public API
pub use logger::init_logger_with;
