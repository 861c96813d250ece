//! Statistics printing.

use log::info;

use crate::error_handling::IntakeStats;

/// Logs every non-zero intake counter.
pub fn log_intake_statistics(stats: &IntakeStats) {
    let counts: Vec<_> = stats
        .snapshot()
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .collect();
    if counts.is_empty() {
        info!("Intake counts: no messages handled");
        return;
    }
    info!("Intake counts:");
    for (event, count) in counts {
        info!("   {}: {}", event, count);
    }
}

/// Logs a one-line summary of the run.
pub fn log_summary(rows_committed: usize, messages_received: usize, elapsed_seconds: f64) {
    info!(
        "✅ Committed {} row{} from {} message{} in {:.1}s",
        rows_committed,
        if rows_committed == 1 { "" } else { "s" },
        messages_received,
        if messages_received == 1 { "" } else { "s" },
        elapsed_seconds
    );
}
