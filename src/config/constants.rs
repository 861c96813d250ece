//! Configuration constants.
//!
//! This module defines the defaults and hard limits used throughout the consumer,
//! including batching thresholds, retry parameters, and queue settings.

use std::time::Duration;

// Batching defaults
/// Number of buffered records that triggers a flush
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// Seconds since the last successful flush after which the next message triggers a flush
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 60;
/// Maximum rows carried by a single INSERT statement.
///
/// Larger batches are split into several statements inside the same transaction.
/// 500 rows x 7 bound columns stays well below SQLite's bind-parameter limit.
pub const MAX_ROWS_PER_STATEMENT: usize = 500;

// Store connection defaults
/// Default store URL (SQLite file next to the working directory)
pub const DEFAULT_STORE_URL: &str = "sqlite://./telemetry.db?mode=rwc";
/// Default target table
pub const DEFAULT_TABLE: &str = "system_info";
/// Longest accepted table name
pub const MAX_IDENTIFIER_LENGTH: usize = 64;
/// Connect attempts before giving up at startup
pub const DEFAULT_CONNECT_MAX_ATTEMPTS: usize = 10;
/// Delay between connect attempts (base delay for non-fixed policies)
pub const DEFAULT_CONNECT_BACKOFF_SECS: u64 = 5;
/// Upper bound for a single backoff delay, whatever the policy
pub const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(60);
/// Pool size; the writer uses one connection at a time
pub const DEFAULT_MAX_CONNECTIONS: u32 = 2;
/// Deadline for acquiring a pooled connection
pub const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
/// Deadline for one batch write (validation excluded)
pub const DEFAULT_COMMIT_TIMEOUT_SECS: u64 = 30;

// Queue defaults
/// nsqd TCP address
pub const DEFAULT_NSQD_ADDRESS: &str = "127.0.0.1:4150";
/// Topic the probe publishes to
pub const DEFAULT_TOPIC: &str = "system_info";
/// Channel this consumer subscribes with
pub const DEFAULT_CHANNEL: &str = "channel";
/// Redelivery delay requested when a message could not be persisted
pub const DEFAULT_REQUEUE_DELAY_MS: u64 = 5_000;
/// Longest topic/channel name nsqd accepts
pub const MAX_NSQ_NAME_LENGTH: usize = 64;
/// Capacity of the channel between the NSQ reader task and the intake loop
pub const QUEUE_CHANNEL_CAPACITY: usize = 64;
/// Heartbeat interval requested in IDENTIFY (nsqd default)
pub const NSQ_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
/// Largest frame accepted from nsqd
pub const NSQ_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
/// How long close() waits for nsqd to acknowledge CLS
pub const NSQ_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// Intake loop
/// Shortest idle-flush tick, for very small flush intervals
pub const MIN_IDLE_TICK: Duration = Duration::from_millis(100);
/// How often intake counters are logged while running
pub const STATS_LOGGING_INTERVAL: Duration = Duration::from_secs(300);

/// Number of characters of a rejected message body included in log lines
pub const MAX_LOGGED_BODY_CHARS: usize = 200;
