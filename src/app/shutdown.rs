//! Graceful shutdown handling.

use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::app::intake::IntakeLoop;
use crate::queue::MessageSource;

/// Cancels `cancel` on Ctrl-C or, on Unix, SIGTERM.
pub fn spawn_signal_listener(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => {
                info!("Received shutdown signal, finishing up");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Shuts down the intake pipeline gracefully.
///
/// Stops the progress logging task, attempts one final flush of the buffer
/// and closes the queue subscription. Returns the number of buffered records
/// that could not be written; those messages were already acknowledged.
pub async fn shutdown_gracefully<S>(
    intake: &mut IntakeLoop,
    source: &mut S,
    logging_cancel: CancellationToken,
    logging_task: Option<JoinHandle<()>>,
) -> usize
where
    S: MessageSource + ?Sized,
{
    logging_cancel.cancel();
    if let Some(logging_task) = logging_task {
        let _ = logging_task.await;
    }

    let pending = intake.buffered().len();
    let unflushed = match intake.shutdown().await {
        Some(Err(e)) => {
            error!(
                "Final flush failed, {} buffered records were not written: {}",
                pending, e
            );
            pending
        }
        _ => 0,
    };

    if let Err(e) = source.close().await {
        warn!("Error closing queue subscription: {}", e);
    }
    unflushed
}
