//! Message intake loop.
//!
//! Messages are handled strictly one at a time: decode, buffer, evaluate the
//! flush triggers and, when due, write the whole buffer in one commit. The
//! buffer is only drained once the commit is confirmed. A failed flush keeps
//! the records that were already acknowledged and hands the triggering record
//! back to the queue, which redelivers it; each message is thus buffered at
//! most once at a time.
//!
//! A connectivity-class commit failure makes the next flush open a fresh
//! store pool through the connector, if one is attached, before writing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::{BatchConfig, MIN_IDLE_TICK};
use crate::error_handling::{CommitError, IntakeEvent, IntakeStats, QueueError};
use crate::models::TelemetryRecord;
use crate::queue::MessageSource;
use crate::storage::{ensure_schema, BatchBuffer, BatchWriter, FlushResult, StoreConnector};
use crate::utils::sanitize::preview_body;

/// What to tell the queue about a handled message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Acknowledge: the message is buffered, committed or deliberately dropped
    Finish,
    /// Ask for redelivery: the flush it triggered did not commit
    Requeue,
}

/// Observable state of the buffer between messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Nothing buffered
    Empty,
    /// Records waiting for a flush trigger
    Accumulating,
}

/// Buffer, writer and flush policy for one subscription.
pub struct IntakeLoop {
    buffer: BatchBuffer,
    writer: BatchWriter,
    config: BatchConfig,
    connector: Option<StoreConnector>,
    stats: Arc<IntakeStats>,
    reconnect_pending: bool,
}

impl IntakeLoop {
    /// Creates a loop with an empty buffer whose flush clock starts now.
    pub fn new(writer: BatchWriter, config: BatchConfig, stats: Arc<IntakeStats>) -> Self {
        IntakeLoop {
            buffer: BatchBuffer::new(Instant::now()),
            writer,
            config,
            connector: None,
            stats,
            reconnect_pending: false,
        }
    }

    /// Lets the loop reopen the store pool after a connectivity failure.
    pub fn with_connector(mut self, connector: StoreConnector) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Handles one message body at the current time.
    pub async fn handle_message(&mut self, body: &[u8]) -> Disposition {
        self.handle_message_at(body, Instant::now()).await
    }

    /// Handles one message body as if it arrived at `now`.
    ///
    /// Undecodable bodies are logged and acknowledged without touching the
    /// buffer. Otherwise the record is appended and, if a trigger fires, the
    /// buffer is flushed. A failed flush removes the record again and asks for
    /// redelivery, leaving the buffer as it was before this message.
    pub async fn handle_message_at(&mut self, body: &[u8], now: Instant) -> Disposition {
        self.stats.increment(IntakeEvent::MessagesReceived);

        match TelemetryRecord::decode(body) {
            Ok(record) => self.buffer.append(record),
            Err(e) => {
                self.stats.increment(IntakeEvent::DecodeDropped);
                warn!("Dropping undecodable message ({}): {}", e, preview_body(body));
                return Disposition::Finish;
            }
        }

        if !self.is_due(now) {
            return Disposition::Finish;
        }
        match self.flush_at(now).await {
            Ok(_) => Disposition::Finish,
            Err(_) => {
                self.buffer.pop_last();
                Disposition::Requeue
            }
        }
    }

    /// Flushes a non-empty buffer whose time threshold has passed.
    ///
    /// Returns `None` when nothing was due.
    pub async fn flush_if_due(&mut self, now: Instant) -> Option<Result<FlushResult, CommitError>> {
        if self.buffer.is_empty() || !self.is_due(now) {
            return None;
        }
        debug!("Idle flush of {} buffered records", self.buffer.len());
        Some(self.flush_at(now).await)
    }

    /// Writes the whole buffer in one commit.
    ///
    /// On success the buffer is drained and the flush clock reset to `now`.
    /// On failure the buffer is left untouched.
    ///
    /// # Errors
    ///
    /// Returns the `CommitError` of the failed write.
    pub async fn flush_at(&mut self, now: Instant) -> Result<FlushResult, CommitError> {
        if self.reconnect_pending {
            self.reconnect_store().await;
        }
        if self.buffer.is_empty() {
            self.buffer.mark_flushed(now);
            return Ok(FlushResult::empty());
        }

        let pending = self.buffer.len();
        match self.writer.write(self.buffer.records()).await {
            Ok(result) => {
                self.buffer.drain();
                self.buffer.mark_flushed(now);
                self.stats.increment(IntakeEvent::FlushesCommitted);
                self.stats.add(IntakeEvent::RowsCommitted, result.written);
                self.stats.add(IntakeEvent::ValidationDropped, result.skipped);
                info!(
                    "Committed {} of {} buffered records ({} dropped as invalid)",
                    result.written, result.total, result.skipped
                );
                Ok(result)
            }
            Err(e) => {
                self.stats.increment(IntakeEvent::CommitFailures);
                error!(
                    "Batch of {} records not committed, keeping it buffered: {}",
                    pending, e
                );
                if e.is_connectivity() && self.connector.is_some() {
                    self.reconnect_pending = true;
                }
                Err(e)
            }
        }
    }

    /// Final flush before exit. Returns `None` if the buffer was empty.
    pub async fn shutdown(&mut self) -> Option<Result<FlushResult, CommitError>> {
        if self.buffer.is_empty() {
            return None;
        }
        info!("Flushing {} buffered records before exit", self.buffer.len());
        Some(self.flush_at(Instant::now()).await)
    }

    async fn reconnect_store(&mut self) {
        let Some(connector) = &self.connector else {
            self.reconnect_pending = false;
            return;
        };
        match connector.connect_once().await {
            Ok(pool) => {
                if let Err(e) = ensure_schema(&pool, self.writer.table()).await {
                    warn!("Schema check after reconnect failed: {}", e);
                }
                let old = self.writer.replace_pool(pool);
                // close() waits for checked-out connections
                tokio::spawn(async move { old.close().await });
                self.reconnect_pending = false;
                self.stats.increment(IntakeEvent::Reconnects);
                info!("Reopened store connection");
            }
            Err(e) => warn!("Store reconnect failed, retrying on next flush: {}", e),
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        self.buffer
            .should_flush(self.config.batch_size, self.config.flush_interval, now)
    }

    /// Empty or accumulating.
    pub fn state(&self) -> BufferState {
        if self.buffer.is_empty() {
            BufferState::Empty
        } else {
            BufferState::Accumulating
        }
    }

    /// The buffered records in arrival order.
    pub fn buffered(&self) -> &[TelemetryRecord] {
        self.buffer.records()
    }

    /// The identifier the next committed row will get.
    pub fn next_id(&self) -> i64 {
        self.writer.next_id()
    }

    /// Flush thresholds in use.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Shared counters.
    pub fn stats(&self) -> &Arc<IntakeStats> {
        &self.stats
    }

    /// The writer's current pool.
    pub fn pool(&self) -> &sqlx::AnyPool {
        self.writer.pool()
    }
}

/// Pulls messages from `source` until it ends or `cancel` fires.
///
/// Every message is settled right after it is handled: finished when
/// buffered, committed or dropped, requeued with `requeue_delay` when its
/// flush failed. An idle ticker flushes a buffer whose time threshold passed
/// while no message arrived.
///
/// # Errors
///
/// Returns the `QueueError` that broke the subscription. The buffer is left as
/// is; the caller decides whether to reconnect or shut down.
pub async fn run_intake<S>(
    source: &mut S,
    intake: &mut IntakeLoop,
    requeue_delay: Duration,
    cancel: &CancellationToken,
) -> Result<(), QueueError>
where
    S: MessageSource + ?Sized,
{
    let mut ticker = tokio::time::interval(intake.config().flush_interval.max(MIN_IDLE_TICK));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Shutdown requested, leaving intake loop");
                return Ok(());
            }
            _ = ticker.tick() => {
                let _ = intake.flush_if_due(Instant::now()).await;
            }
            next = source.next_message() => {
                let Some(delivery) = next? else {
                    info!("Queue subscription ended");
                    return Ok(());
                };
                match intake.handle_message(&delivery.body).await {
                    Disposition::Finish => source.finish(&delivery.id).await?,
                    Disposition::Requeue => {
                        intake.stats().increment(IntakeEvent::MessagesRequeued);
                        source.requeue(&delivery.id, requeue_delay).await?;
                    }
                }
            }
        }
    }
}
