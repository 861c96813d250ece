//! Error type definitions.
//!
//! This module defines all error types used throughout the consumer.

use std::fmt;
use std::time::Duration;

use log::SetLoggerError;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),
}

/// Invalid configuration values.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A batch size of zero would never flush
    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    /// At least one connection attempt is required
    #[error("connect attempts must be at least 1")]
    InvalidConnectAttempts,

    /// The pool needs at least one connection
    #[error("max connections must be at least 1")]
    InvalidMaxConnections,

    /// The table name is not a plain SQL identifier
    #[error("invalid table name {0:?}: expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidTableName(String),

    /// nsqd would reject the topic or channel name
    #[error("invalid NSQ topic or channel name {0:?}")]
    InvalidQueueName(String),

    /// The store URL does not parse
    #[error("invalid store URL: {0}")]
    InvalidStoreUrl(String),

    /// The store URL scheme has no place for a user name or password.
    #[error("store URL {0:?} cannot carry credentials")]
    CredentialsNotSupported(String),
}

/// Failure to establish the store connection.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Every attempt allowed by the retry policy failed.
    #[error("could not connect to {target} after {attempts} attempt(s): {source}")]
    Exhausted {
        /// Store URL with the password masked
        target: String,
        /// Attempts made
        attempts: usize,
        /// Error of the last attempt
        #[source]
        source: sqlx::Error,
    },

    /// The store target itself is unusable
    #[error(transparent)]
    InvalidTarget(#[from] ConfigError),
}

/// Failure to create the target table.
#[derive(Error, Debug)]
#[error("schema setup failed for table {table}: {source}")]
pub struct SchemaError {
    /// Table that could not be created
    pub table: String,
    /// Underlying store error
    #[source]
    pub source: sqlx::Error,
}

/// A message body that is not a telemetry object.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Not valid JSON
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Valid JSON of another type
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),
}

/// What is wrong with a record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// Absent or null
    Missing,
    /// Present with an unexpected JSON type
    WrongType {
        /// Type the column needs
        expected: &'static str,
        /// Type found in the message
        found: &'static str,
    },
}

/// A decoded record whose fields do not match the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Offending field
    pub field: &'static str,
    /// What is wrong with it
    pub issue: ValidationIssue,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.issue {
            ValidationIssue::Missing => write!(f, "field `{}` is missing", self.field),
            ValidationIssue::WrongType { expected, found } => write!(
                f,
                "field `{}` has the wrong type: expected {}, found {}",
                self.field, expected, found
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Failure of an atomic batch write. The batch is left for the next trigger.
#[derive(Error, Debug)]
pub enum CommitError {
    /// The store could not be reached (I/O, pool exhausted or closed).
    #[error("store unreachable: {0}")]
    Connectivity(#[source] sqlx::Error),

    /// The store rejected a statement or the commit.
    #[error("batch statement failed: {0}")]
    Statement(#[source] sqlx::Error),

    /// The write did not finish before the commit deadline.
    #[error("batch write did not finish within {0:?}")]
    Timeout(Duration),
}

impl CommitError {
    /// True when reconnecting may help.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, CommitError::Connectivity(_))
    }
}

impl From<sqlx::Error> for CommitError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => CommitError::Connectivity(e),
            other => CommitError::Statement(other),
        }
    }
}

/// Errors from the queue client.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Socket failure
    #[error("queue I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bytes on the wire that do not follow the protocol.
    #[error("queue protocol violation: {0}")]
    Protocol(String),

    /// An error frame sent by the broker.
    #[error("broker error: {0}")]
    Broker(String),

    /// No TCP connection could be made within the allowed attempts
    #[error("could not connect to broker {address} after {attempts} attempt(s): {source}")]
    ConnectExhausted {
        /// nsqd address
        address: String,
        /// Attempts made
        attempts: usize,
        /// Error of the last attempt
        #[source]
        source: std::io::Error,
    },

    /// The subscription ended.
    #[error("queue connection closed")]
    Closed,
}
