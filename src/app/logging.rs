//! Progress logging utilities.

use std::sync::Arc;
use std::time::Instant;

use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::STATS_LOGGING_INTERVAL;
use crate::error_handling::{IntakeEvent, IntakeStats};

/// Logs throughput since `start_time`.
pub fn log_progress(start_time: Instant, stats: &IntakeStats) {
    let elapsed_secs = start_time.elapsed().as_secs_f64();
    let received = stats.get(IntakeEvent::MessagesReceived);
    let rate = if elapsed_secs > 0.0 {
        received as f64 / elapsed_secs
    } else {
        0.0
    };
    info!(
        "Received {} messages, committed {} rows in {:.0} seconds (~{:.2} messages/sec)",
        received,
        stats.get(IntakeEvent::RowsCommitted),
        elapsed_secs,
        rate
    );
}

/// Spawns a task that logs progress every few minutes until `cancel` fires.
pub fn spawn_progress_logger(
    start_time: Instant,
    stats: Arc<IntakeStats>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATS_LOGGING_INTERVAL);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => log_progress(start_time, &stats),
            }
        }
    })
}
