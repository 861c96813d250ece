//! Store connection management.
//!
//! This module opens the long-lived connection pool the batch writer uses:
//! - Credentials are spliced into the store URL, never logged
//! - The first handshake is retried with the configured backoff policy
//! - A closed pool can be reopened after a connectivity failure

use log::{error, info};
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use url::Url;

use crate::config::{Config, POOL_ACQUIRE_TIMEOUT};
use crate::error_handling::{ConfigError, ConnectionError};
use crate::utils::{retry_with_backoff, BackoffPolicy};

/// Where the store lives and how to log in.
#[derive(Debug, Clone)]
pub struct StoreTarget {
    /// Database URL (`sqlite://...`, `mysql://host:port/db`)
    pub url: String,
    /// User name spliced into the URL
    pub username: Option<String>,
    /// Password spliced into the URL
    pub password: Option<String>,
}

impl StoreTarget {
    /// A target without separate credentials.
    pub fn new(url: impl Into<String>) -> Self {
        StoreTarget {
            url: url.into(),
            username: None,
            password: None,
        }
    }

    /// The URL handed to the driver, with credentials applied.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidStoreUrl` if the URL does not parse and
    /// `ConfigError::CredentialsNotSupported` if credentials are configured for
    /// a URL without an authority (e.g. a SQLite file path).
    pub fn connection_url(&self) -> Result<String, ConfigError> {
        if self.username.is_none() && self.password.is_none() {
            return Ok(self.url.clone());
        }

        let mut url =
            Url::parse(&self.url).map_err(|e| ConfigError::InvalidStoreUrl(e.to_string()))?;
        if url.scheme() == "sqlite" || !url.has_host() {
            return Err(ConfigError::CredentialsNotSupported(self.redacted()));
        }
        if let Some(username) = &self.username {
            url.set_username(username)
                .map_err(|_| ConfigError::CredentialsNotSupported(self.redacted()))?;
        }
        if let Some(password) = &self.password {
            url.set_password(Some(password))
                .map_err(|_| ConfigError::CredentialsNotSupported(self.redacted()))?;
        }
        Ok(url.to_string())
    }

    /// The URL with any embedded password masked, for log lines.
    pub fn redacted(&self) -> String {
        match Url::parse(&self.url) {
            Ok(mut url) => {
                if url.password().is_some() {
                    let _ = url.set_password(Some("***"));
                }
                url.to_string()
            }
            Err(_) => "<unparseable store URL>".to_string(),
        }
    }
}

/// Opens connection pools to the store.
#[derive(Debug, Clone)]
pub struct StoreConnector {
    target: StoreTarget,
    policy: BackoffPolicy,
    max_attempts: usize,
    max_connections: u32,
}

impl StoreConnector {
    /// A connector making up to `max_attempts` attempts per connect.
    pub fn new(
        target: StoreTarget,
        policy: BackoffPolicy,
        max_attempts: usize,
        max_connections: u32,
    ) -> Self {
        StoreConnector {
            target,
            policy,
            max_attempts: max_attempts.max(1),
            max_connections: max_connections.max(1),
        }
    }

    /// Connector for the configured store and retry policy.
    pub fn from_config(config: &Config) -> Self {
        let target = StoreTarget {
            url: config.store_url.clone(),
            username: config.store_username.clone(),
            password: config.store_password.clone(),
        };
        Self::new(
            target,
            config.backoff_policy(),
            config.connect_max_attempts,
            config.max_connections,
        )
    }

    /// The store this connector opens.
    pub fn target(&self) -> &StoreTarget {
        &self.target
    }

    /// Connects with retries.
    ///
    /// Every attempt opens a pool and runs `SELECT 1`. Exhausting the policy is
    /// returned as `ConnectionError::Exhausted`; callers at startup treat it
    /// as fatal.
    pub async fn connect(&self) -> Result<AnyPool, ConnectionError> {
        self.connect_with_attempts(self.max_attempts).await
    }

    /// A single connection attempt, for reconnecting in steady state where the
    /// next flush trigger acts as the retry.
    pub async fn connect_once(&self) -> Result<AnyPool, ConnectionError> {
        self.connect_with_attempts(1).await
    }

    async fn connect_with_attempts(&self, max_attempts: usize) -> Result<AnyPool, ConnectionError> {
        sqlx::any::install_default_drivers();
        let url = self.target.connection_url()?;
        let redacted = self.target.redacted();
        let subject = format!("Connecting to store {}", redacted);

        let (result, attempts) =
            retry_with_backoff(&self.policy, max_attempts, &subject, || self.open(&url)).await;

        match result {
            Ok(pool) => {
                info!(
                    "Connected to store {} after {} attempt(s)",
                    redacted, attempts
                );
                Ok(pool)
            }
            Err(source) => {
                error!(
                    "Could not connect to store {} after {} attempt(s): {}",
                    redacted, attempts, source
                );
                Err(ConnectionError::Exhausted {
                    target: redacted,
                    attempts,
                    source,
                })
            }
        }
    }

    async fn open(&self, url: &str) -> Result<AnyPool, sqlx::Error> {
        let pool = AnyPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
            .connect(url)
            .await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(pool)
    }
}
