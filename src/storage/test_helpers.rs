//! Shared test helpers for storage module tests.
//!
//! Each pool points at a SQLite file in its own temporary directory, so every
//! pooled connection sees the same database. Keep the returned `TempDir`
//! alive for as long as the pool is used.

#[cfg(test)]
use sqlx::any::AnyPoolOptions;
#[cfg(test)]
use sqlx::AnyPool;
#[cfg(test)]
use tempfile::TempDir;

/// Creates a test pool over an empty SQLite file.
#[cfg(test)]
pub async fn create_test_pool() -> (AnyPool, TempDir) {
    sqlx::any::install_default_drivers();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
    let pool = AnyPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("Failed to create test database pool");
    (pool, dir)
}

/// Number of tables called `name` (0 or 1).
#[cfg(test)]
pub async fn table_count(pool: &AnyPool, name: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
    )
    .bind(name)
    .fetch_one(pool)
    .await
    .expect("Failed to count tables")
}

/// Number of rows in `table`.
#[cfg(test)]
pub async fn row_count(pool: &AnyPool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .expect("Failed to count rows")
}
