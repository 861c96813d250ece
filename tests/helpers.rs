// Shared test helpers for store setup and message bodies.
//
// This module provides common utilities used across multiple test files to reduce duplication.

use std::time::Duration;

use serde_json::{json, Value};
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use tempfile::TempDir;

use telemetry_consumer::{ensure_schema, BackoffPolicy, StoreConnector, StoreTarget};

pub const TABLE: &str = "system_info";

/// A SQLite store in a temporary directory with the telemetry table created.
///
/// Keep the struct alive for as long as the pool is used; dropping it removes
/// the database file.
#[allow(dead_code)] // Not every test file uses every field
pub struct TestStore {
    pub pool: AnyPool,
    pub url: String,
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TestStore {
    /// A connector that opens the same database file.
    pub fn connector(&self) -> StoreConnector {
        StoreConnector::new(
            StoreTarget::new(self.url.clone()),
            BackoffPolicy::Fixed(Duration::from_millis(10)),
            3,
            2,
        )
    }
}

/// Creates a fresh store with the telemetry table.
pub async fn create_test_store() -> TestStore {
    sqlx::any::install_default_drivers();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("telemetry.db").display()
    );
    let pool = AnyPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("Failed to create test database pool");
    ensure_schema(&pool, TABLE)
        .await
        .expect("Failed to create telemetry table");
    TestStore { pool, url, dir }
}

/// A valid telemetry message body as JSON.
#[allow(dead_code)]
pub fn telemetry_json(host: &str) -> Value {
    json!({
        "info": format!("Linux {host} 6.1.0-18-amd64 x86_64"),
        "cpu_usage": 17.5,
        "memory_usage": 63.2,
        "disk_usage": {
            "/": {
                "path": "/",
                "fstype": "ext4",
                "total": 105_089_261_568u64,
                "free": 61_772_406_784u64,
                "used": 37_928_882_176u64,
                "usedPercent": 38.04,
                "inodesTotal": 6_553_600,
                "inodesUsed": 412_331,
                "inodesFree": 6_141_269,
                "inodesUsedPercent": 6.29
            }
        },
        "processes": ["systemd", "sshd", "probe"],
        "connections": ["10.0.0.5:22 10.0.0.9:51234 ESTABLISHED"]
    })
}

/// Serialized valid telemetry message body.
#[allow(dead_code)]
pub fn telemetry_body(host: &str) -> Vec<u8> {
    telemetry_json(host).to_string().into_bytes()
}

/// A body that decodes but fails validation (missing `memory_usage`).
#[allow(dead_code)]
pub fn invalid_body(host: &str) -> Vec<u8> {
    let mut value = telemetry_json(host);
    value
        .as_object_mut()
        .expect("object")
        .remove("memory_usage");
    value.to_string().into_bytes()
}

/// Stored ids in ascending order.
#[allow(dead_code)]
pub async fn stored_ids(pool: &AnyPool) -> Vec<i64> {
    sqlx::query_scalar::<_, i64>(&format!("SELECT id FROM {TABLE} ORDER BY id"))
        .fetch_all(pool)
        .await
        .expect("Failed to read ids")
}

/// Stored `info` values in id order.
#[allow(dead_code)]
pub async fn stored_infos(pool: &AnyPool) -> Vec<String> {
    sqlx::query_scalar::<_, String>(&format!("SELECT info FROM {TABLE} ORDER BY id"))
        .fetch_all(pool)
        .await
        .expect("Failed to read rows")
}
