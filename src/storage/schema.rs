//! Target table setup.
//!
//! The table is created with create-if-absent semantics, so running setup on
//! every start (or twice in a row) is harmless. The column types are accepted
//! by both SQLite and MySQL.

use sqlx::AnyPool;

use crate::error_handling::SchemaError;

/// DDL for the telemetry table.
pub fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id BIGINT NOT NULL,
            info TEXT NOT NULL,
            cpu_usage DOUBLE NOT NULL,
            memory_usage DOUBLE NOT NULL,
            disk_usage TEXT NOT NULL,
            processes TEXT NOT NULL,
            connections TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )"
    )
}

/// Creates the telemetry table if it does not exist.
///
/// `table` must already be a validated identifier.
///
/// # Errors
///
/// Returns a `SchemaError` if the statement fails; the consumer cannot run
/// without the table.
pub async fn ensure_schema(pool: &AnyPool, table: &str) -> Result<(), SchemaError> {
    sqlx::query(&create_table_sql(table))
        .execute(pool)
        .await
        .map_err(|source| SchemaError {
            table: table.to_string(),
            source,
        })?;
    log::info!("Table {} is ready", table);
    Ok(())
}

/// The identifier following the largest one stored, or 1 for an empty table.
pub async fn next_free_id(pool: &AnyPool, table: &str) -> Result<i64, sqlx::Error> {
    let sql = format!("SELECT COALESCE(MAX(id), 0) + 1 FROM {table}");
    sqlx::query_scalar::<_, i64>(&sql).fetch_one(pool).await
}
