//! Configuration types and CLI options.
//!
//! This module defines enums and structs used for command-line argument parsing
//! and configuration. Every option can also be supplied through an environment
//! variable so the consumer can run unmodified inside a container.

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::config::constants::*;
use crate::error_handling::ConfigError;
use crate::utils::BackoffPolicy;

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted:
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Delay growth between connection attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackoffKind {
    /// Same delay between every attempt
    Fixed,
    /// Delay doubles after every attempt
    Exponential,
    /// Exponential growth with random jitter
    Jittered,
}

/// Consumer configuration.
///
/// Parsed from the command line (with environment variable fallbacks) by the
/// binary, or constructed programmatically by library users.
///
/// # Examples
///
/// ```no_run
/// use telemetry_consumer::Config;
///
/// let config = Config {
///     store_url: "mysql://db:3306/infra_monitoring".to_string(),
///     store_username: Some("root".to_string()),
///     batch_size: 250,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Parser)]
#[command(
    name = "telemetry_consumer",
    about = "Consumes host telemetry from NSQ and writes it to a SQL store in batches."
)]
pub struct Config {
    /// Log level: error|warn|info|debug|trace
    #[arg(long, value_enum, default_value_t = LogLevel::Info, env = "LOG_LEVEL")]
    pub log_level: LogLevel,

    /// Log format: plain|json
    #[arg(long, value_enum, default_value_t = LogFormat::Plain, env = "LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Store URL (sqlite://path?mode=rwc or mysql://host:port/database)
    #[arg(long, default_value = DEFAULT_STORE_URL, env = "STORE_URL")]
    pub store_url: String,

    /// Store user name, spliced into the store URL
    #[arg(long, env = "STORE_USERNAME")]
    pub store_username: Option<String>,

    /// Store password, spliced into the store URL
    #[arg(long, env = "STORE_PASSWORD", hide_env_values = true)]
    pub store_password: Option<String>,

    /// Target table name
    #[arg(long, default_value = DEFAULT_TABLE, env = "STORE_TABLE")]
    pub table: String,

    /// Maximum pooled store connections
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS, env = "STORE_MAX_CONNECTIONS")]
    pub max_connections: u32,

    /// Connection attempts (store and queue) before giving up at startup
    #[arg(long, default_value_t = DEFAULT_CONNECT_MAX_ATTEMPTS, env = "CONNECT_MAX_ATTEMPTS")]
    pub connect_max_attempts: usize,

    /// Delay between connection attempts in seconds (base delay for exponential policies)
    #[arg(long, default_value_t = DEFAULT_CONNECT_BACKOFF_SECS, env = "CONNECT_BACKOFF_SECS")]
    pub connect_backoff_secs: u64,

    /// Backoff policy between connection attempts: fixed|exponential|jittered
    #[arg(long, value_enum, default_value_t = BackoffKind::Fixed, env = "CONNECT_BACKOFF")]
    pub connect_backoff: BackoffKind,

    /// Deadline for a single batch commit in seconds
    #[arg(long, default_value_t = DEFAULT_COMMIT_TIMEOUT_SECS, env = "COMMIT_TIMEOUT_SECS")]
    pub commit_timeout_secs: u64,

    /// First identifier to assign. Defaults to MAX(id) + 1 of the target table.
    #[arg(long, env = "ID_START")]
    pub id_start: Option<i64>,

    /// nsqd TCP address (host:port)
    #[arg(long, default_value = DEFAULT_NSQD_ADDRESS, env = "NSQD_ADDRESS")]
    pub nsqd_address: String,

    /// NSQ topic to subscribe to
    #[arg(long, default_value = DEFAULT_TOPIC, env = "NSQ_TOPIC")]
    pub topic: String,

    /// NSQ channel to subscribe with
    #[arg(long, default_value = DEFAULT_CHANNEL, env = "NSQ_CHANNEL")]
    pub channel: String,

    /// Redelivery delay requested for messages whose batch failed to commit (ms)
    #[arg(long, default_value_t = DEFAULT_REQUEUE_DELAY_MS, env = "REQUEUE_DELAY_MS")]
    pub requeue_delay_ms: u64,

    /// Buffered records that trigger a flush
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, env = "BATCH_SIZE")]
    pub batch_size: usize,

    /// Seconds since the last flush after which the next message triggers a flush
    #[arg(long, default_value_t = DEFAULT_FLUSH_INTERVAL_SECS, env = "FLUSH_INTERVAL_SECS")]
    pub flush_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_format: LogFormat::Plain,
            store_url: DEFAULT_STORE_URL.to_string(),
            store_username: None,
            store_password: None,
            table: DEFAULT_TABLE.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_max_attempts: DEFAULT_CONNECT_MAX_ATTEMPTS,
            connect_backoff_secs: DEFAULT_CONNECT_BACKOFF_SECS,
            connect_backoff: BackoffKind::Fixed,
            commit_timeout_secs: DEFAULT_COMMIT_TIMEOUT_SECS,
            id_start: None,
            nsqd_address: DEFAULT_NSQD_ADDRESS.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            channel: DEFAULT_CHANNEL.to_string(),
            requeue_delay_ms: DEFAULT_REQUEUE_DELAY_MS,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
        }
    }
}

impl Config {
    /// Checks values clap cannot check on its own.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        if self.connect_max_attempts == 0 {
            return Err(ConfigError::InvalidConnectAttempts);
        }
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections);
        }
        if !is_valid_identifier(&self.table) {
            return Err(ConfigError::InvalidTableName(self.table.clone()));
        }
        if !is_valid_nsq_name(&self.topic) {
            return Err(ConfigError::InvalidQueueName(self.topic.clone()));
        }
        if !is_valid_nsq_name(&self.channel) {
            return Err(ConfigError::InvalidQueueName(self.channel.clone()));
        }
        Ok(())
    }

    /// Size threshold and time threshold for the batch buffer.
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            batch_size: self.batch_size,
            flush_interval: Duration::from_secs(self.flush_interval_secs),
        }
    }

    /// Retry policy shared by the store connector and the queue client.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        let base = Duration::from_secs(self.connect_backoff_secs);
        match self.connect_backoff {
            BackoffKind::Fixed => BackoffPolicy::Fixed(base),
            BackoffKind::Exponential => BackoffPolicy::Exponential {
                base,
                max: MAX_BACKOFF_DELAY,
            },
            BackoffKind::Jittered => BackoffPolicy::Jittered {
                base,
                max: MAX_BACKOFF_DELAY,
            },
        }
    }

    /// Deadline for one batch commit.
    pub fn commit_timeout(&self) -> Duration {
        Duration::from_secs(self.commit_timeout_secs)
    }

    /// Redelivery delay for messages whose flush failed.
    pub fn requeue_delay(&self) -> Duration {
        Duration::from_millis(self.requeue_delay_ms)
    }
}

/// Flush thresholds for a batch buffer.
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    /// Buffered records that trigger a flush
    pub batch_size: usize,
    /// Time since the last flush after which the next evaluation triggers a flush
    pub flush_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
        }
    }
}

/// Returns true for plain SQL identifiers (`[A-Za-z_][A-Za-z0-9_]*`).
///
/// The table name is the only value interpolated into SQL text, so anything
/// else is rejected.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= MAX_IDENTIFIER_LENGTH && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Returns true for names nsqd accepts as topic or channel.
pub fn is_valid_nsq_name(name: &str) -> bool {
    let base = name.strip_suffix("#ephemeral").unwrap_or(name);
    !base.is_empty()
        && name.len() <= MAX_NSQ_NAME_LENGTH
        && base
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(
            log::LevelFilter::from(LogLevel::Error),
            log::LevelFilter::Error
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Warn),
            log::LevelFilter::Warn
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Info),
            log::LevelFilter::Info
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Debug),
            log::LevelFilter::Debug
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Trace),
            log::LevelFilter::Trace
        );
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.flush_interval_secs, 60);
        assert_eq!(config.connect_max_attempts, 10);
        assert_eq!(config.connect_backoff_secs, 5);
        assert_eq!(config.topic, "system_info");
        assert_eq!(config.channel, "channel");
        assert_eq!(config.table, "system_info");
        assert!(config.id_start.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_zero_batch_size() {
        let config = Config {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBatchSize)
        ));
    }

    #[test]
    fn test_config_rejects_injected_table_name() {
        let config = Config {
            table: "system_info; DROP TABLE x".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTableName(_))
        ));
    }

    #[test]
    fn test_config_rejects_bad_channel() {
        let config = Config {
            channel: "bad channel".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidQueueName(_))
        ));
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_valid_identifier("system_info"));
        assert!(is_valid_identifier("_t1"));
        assert!(!is_valid_identifier("1table"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("a-b"));
        assert!(!is_valid_identifier("a'b"));
    }

    #[test]
    fn test_nsq_name_rules() {
        assert!(is_valid_nsq_name("system_info"));
        assert!(is_valid_nsq_name("metrics.v1-a"));
        assert!(is_valid_nsq_name("consumer#ephemeral"));
        assert!(!is_valid_nsq_name("#ephemeral"));
        assert!(!is_valid_nsq_name(""));
        assert!(!is_valid_nsq_name(&"x".repeat(65)));
    }

    #[test]
    fn test_backoff_policy_from_config() {
        let config = Config {
            connect_backoff: BackoffKind::Exponential,
            connect_backoff_secs: 2,
            ..Default::default()
        };
        match config.backoff_policy() {
            BackoffPolicy::Exponential { base, max } => {
                assert_eq!(base, Duration::from_secs(2));
                assert_eq!(max, MAX_BACKOFF_DELAY);
            }
            other => panic!("unexpected policy {other:?}"),
        }
        assert_eq!(
            Config::default().backoff_policy(),
            BackoffPolicy::Fixed(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_batch_config_from_config() {
        let config = Config {
            batch_size: 7,
            flush_interval_secs: 3,
            ..Default::default()
        };
        let batch = config.batch_config();
        assert_eq!(batch.batch_size, 7);
        assert_eq!(batch.flush_interval, Duration::from_secs(3));
    }

    #[test]
    fn test_cli_parsing_overrides() {
        let config = Config::try_parse_from([
            "telemetry_consumer",
            "--batch-size",
            "50",
            "--connect-backoff",
            "jittered",
            "--id-start",
            "1000",
            "--log-format",
            "json",
        ])
        .expect("arguments should parse");
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.connect_backoff, BackoffKind::Jittered);
        assert_eq!(config.id_start, Some(1000));
        assert!(matches!(config.log_format, LogFormat::Json));
    }
}
