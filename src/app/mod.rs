//! Main application modules.
//!
//! This module provides the message intake loop plus the progress logging,
//! shutdown handling and statistics printing used around it.

pub mod intake;
pub mod logging;
pub mod shutdown;
pub mod statistics;

// Re-export public API
pub use intake::{run_intake, BufferState, Disposition, IntakeLoop};
pub use logging::spawn_progress_logger;
pub use shutdown::{shutdown_gracefully, spawn_signal_listener};
pub use statistics::{log_intake_statistics, log_summary};
