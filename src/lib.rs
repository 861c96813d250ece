//! telemetry_consumer library: batched ingestion of host telemetry
//!
//! This library subscribes to an NSQ topic carrying host telemetry snapshots
//! (CPU, memory, disk, processes, connections), buffers the decoded records and
//! writes them to a SQL table in atomic batches. A batch is flushed when it
//! reaches the configured size or when the flush interval has passed, and the
//! buffer is only cleared once the store confirms the commit.
//!
//! # Example
//!
//! ```no_run
//! use telemetry_consumer::{run_consumer, Config};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config {
//!     store_url: "mysql://mysql:3306/infra_monitoring".to_string(),
//!     store_username: Some("root".to_string()),
//!     nsqd_address: "nsq:4150".to_string(),
//!     ..Default::default()
//! };
//!
//! let report = run_consumer(config, CancellationToken::new()).await?;
//! println!("Committed {} rows", report.rows_committed);
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Use `#[tokio::main]` in your application
//! or ensure you're calling library functions within an async context.

#![warn(missing_docs)]

mod app;
pub mod config;
mod error_handling;
pub mod initialization;
mod models;
pub mod queue;
mod storage;
mod utils;

// Re-export public API
pub use app::{run_intake, spawn_signal_listener, BufferState, Disposition, IntakeLoop};
pub use config::{BackoffKind, BatchConfig, Config, LogFormat, LogLevel};
pub use error_handling::{
    CommitError, ConfigError, ConnectionError, DecodeError, InitializationError, IntakeEvent,
    IntakeStats, QueueError, SchemaError, ValidationError, ValidationIssue,
};
pub use models::{SystemSnapshot, TelemetryRecord};
pub use run::{run_consumer, run_with_source, ConsumerReport};
pub use storage::{
    ensure_schema, next_free_id, BatchBuffer, BatchWriter, FlushResult, StoreConnector,
    StoreTarget,
};
pub use utils::BackoffPolicy;

// Internal run module (wires the store, the queue and the intake loop together)
mod run {
    use std::sync::Arc;
    use std::time::Instant;

    use anyhow::{Context, Result};
    use log::{error, info, warn};
    use tokio_util::sync::CancellationToken;

    use crate::app::{
        log_intake_statistics, log_summary, run_intake, shutdown_gracefully,
        spawn_progress_logger, IntakeLoop,
    };
    use crate::config::Config;
    use crate::error_handling::{IntakeEvent, IntakeStats};
    use crate::queue::{MessageSource, NsqConfig, NsqSource};
    use crate::storage::{ensure_schema, next_free_id, BatchWriter, StoreConnector};

    /// Results of a consumer run.
    ///
    /// Contains the intake counters at the time the run ended.
    #[derive(Debug, Clone)]
    pub struct ConsumerReport {
        /// Messages delivered by the queue (including redeliveries)
        pub messages_received: usize,
        /// Rows confirmed by a commit
        pub rows_committed: usize,
        /// Messages dropped because their body could not be decoded
        pub decode_dropped: usize,
        /// Records dropped at write time because a field was missing or mistyped
        pub validation_dropped: usize,
        /// Flushes whose commit failed
        pub commit_failures: usize,
        /// Messages handed back to the queue
        pub messages_requeued: usize,
        /// Records still buffered when the final flush failed
        pub unflushed: usize,
        /// Identifier the next committed row would have received
        pub next_id: i64,
        /// Elapsed time in seconds
        pub elapsed_seconds: f64,
    }

    /// Runs the consumer against the configured store and nsqd.
    ///
    /// Connects to the store (retrying per the configured policy), creates the
    /// table if needed, picks the first identifier, subscribes to the topic and
    /// then handles messages until `cancel` fires or the subscription is lost
    /// for good. Any buffered records get one final flush before returning.
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - The configuration is invalid
    /// - The store cannot be reached within the configured attempts
    /// - The table cannot be created
    /// - nsqd cannot be reached or rejects the subscription
    /// - The subscription drops and cannot be re-established
    pub async fn run_consumer(config: Config, cancel: CancellationToken) -> Result<ConsumerReport> {
        config.validate().context("Invalid configuration")?;

        let connector = StoreConnector::from_config(&config);
        let pool = connector
            .connect()
            .await
            .context("Failed to connect to store")?;
        ensure_schema(&pool, &config.table)
            .await
            .context("Failed to create telemetry table")?;

        let first_id = match config.id_start {
            Some(id) => id,
            None => next_free_id(&pool, &config.table)
                .await
                .context("Failed to read the highest stored id")?,
        };
        info!("Assigning ids from {}", first_id);

        let writer = BatchWriter::new(pool, &config.table, first_id, config.commit_timeout());
        let source = NsqSource::connect(NsqConfig::from_config(&config))
            .await
            .context("Failed to subscribe to nsqd")?;

        run_with_source(&config, writer, Some(connector), source, cancel).await
    }

    /// Runs the intake loop over an already connected source and writer.
    ///
    /// When the source fails, one reconnect is attempted through
    /// [`MessageSource::reconnect`] before giving up. `connector`, if given,
    /// is used to reopen a closed store pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue subscription is lost and cannot be
    /// re-established. The final flush is attempted first.
    pub async fn run_with_source<S>(
        config: &Config,
        writer: BatchWriter,
        connector: Option<StoreConnector>,
        mut source: S,
        cancel: CancellationToken,
    ) -> Result<ConsumerReport>
    where
        S: MessageSource,
    {
        let start_time = Instant::now();
        let stats = Arc::new(IntakeStats::new());
        let mut intake = IntakeLoop::new(writer, config.batch_config(), Arc::clone(&stats));
        if let Some(connector) = connector {
            intake = intake.with_connector(connector);
        }

        let logging_cancel = cancel.child_token();
        let logging_task =
            spawn_progress_logger(start_time, Arc::clone(&stats), logging_cancel.clone());

        let outcome = loop {
            match run_intake(&mut source, &mut intake, config.requeue_delay(), &cancel).await {
                Ok(()) => break Ok(()),
                Err(_) if cancel.is_cancelled() => break Ok(()),
                Err(e) => {
                    warn!("Queue subscription failed: {}; reconnecting", e);
                    match source.reconnect().await {
                        Ok(()) => stats.increment(IntakeEvent::QueueReconnects),
                        Err(reconnect_err) => {
                            error!("Could not re-establish queue subscription: {}", reconnect_err);
                            break Err(reconnect_err);
                        }
                    }
                }
            }
        };

        let unflushed =
            shutdown_gracefully(&mut intake, &mut source, logging_cancel, Some(logging_task))
                .await;

        let elapsed_seconds = start_time.elapsed().as_secs_f64();
        log_intake_statistics(&stats);
        log_summary(
            stats.get(IntakeEvent::RowsCommitted),
            stats.get(IntakeEvent::MessagesReceived),
            elapsed_seconds,
        );

        outcome.context("Lost queue subscription")?;

        Ok(ConsumerReport {
            messages_received: stats.get(IntakeEvent::MessagesReceived),
            rows_committed: stats.get(IntakeEvent::RowsCommitted),
            decode_dropped: stats.get(IntakeEvent::DecodeDropped),
            validation_dropped: stats.get(IntakeEvent::ValidationDropped),
            commit_failures: stats.get(IntakeEvent::CommitFailures),
            messages_requeued: stats.get(IntakeEvent::MessagesRequeued),
            unflushed,
            next_id: intake.next_id(),
            elapsed_seconds,
        })
    }
}
