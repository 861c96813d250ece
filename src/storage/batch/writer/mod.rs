//! Batch writer implementation.
//!
//! This module provides the BatchWriter struct, which owns the store pool and
//! the identifier sequence and writes whole batches in one transaction.

mod flush;

use std::time::Duration;

use sqlx::AnyPool;

use crate::storage::sequence::IdSequence;

const INSERT_COLUMNS: &str = "id, info, cpu_usage, memory_usage, disk_usage, processes, connections";

/// Writes batches of telemetry records to one table.
pub struct BatchWriter {
    pool: AnyPool,
    table: String,
    sequence: IdSequence,
    commit_timeout: Duration,
    insert_prefix: String,
}

impl BatchWriter {
    /// Creates a writer whose first committed row gets `first_id`.
    ///
    /// `table` must already be a validated identifier.
    pub fn new(pool: AnyPool, table: &str, first_id: i64, commit_timeout: Duration) -> Self {
        BatchWriter {
            pool,
            table: table.to_string(),
            sequence: IdSequence::new(first_id),
            commit_timeout,
            insert_prefix: format!("INSERT INTO {table} ({INSERT_COLUMNS}) "),
        }
    }

    /// The pool batches are written through.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Target table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Swaps in a freshly opened pool and returns the previous one.
    pub fn replace_pool(&mut self, pool: AnyPool) -> AnyPool {
        std::mem::replace(&mut self.pool, pool)
    }

    /// The identifier the next committed row will get.
    pub fn next_id(&self) -> i64 {
        self.sequence.peek()
    }
}
