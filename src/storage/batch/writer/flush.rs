//! Batch flushing logic.

use log::{debug, warn};
use sqlx::{Any, AnyConnection, QueryBuilder};

use crate::config::MAX_ROWS_PER_STATEMENT;
use crate::error_handling::CommitError;
use crate::models::TelemetryRecord;
use crate::storage::batch::FlushResult;
use crate::storage::models::StoreRow;

use super::BatchWriter;

impl BatchWriter {
    /// Writes `records` as one atomic batch.
    ///
    /// Records that fail validation are logged and left out; the rest get
    /// consecutive identifiers in slice order and are inserted in a single
    /// transaction. The identifier sequence only moves once the commit is
    /// confirmed, so retrying the same records after an error reuses the same
    /// identifiers. A batch with no valid record commits nothing and succeeds.
    ///
    /// # Errors
    ///
    /// Returns a `CommitError` if any statement or the commit fails, or if the
    /// inserts do not finish within the commit timeout. Nothing from the batch
    /// is persisted in that case. The deadline covers the inserts only: once
    /// COMMIT is sent its outcome is always awaited, so a reported failure
    /// never hides rows that landed.
    pub async fn write(&mut self, records: &[TelemetryRecord]) -> Result<FlushResult, CommitError> {
        if records.is_empty() {
            return Ok(FlushResult::empty());
        }

        let mut skipped = 0;
        let mut snapshots = Vec::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            match record.validate() {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => {
                    skipped += 1;
                    warn!(
                        "Dropping record {} of {} from batch: {}",
                        position + 1,
                        records.len(),
                        e
                    );
                }
            }
        }

        let ids = self.sequence.peek_range(snapshots.len());
        let rows: Vec<StoreRow> = snapshots
            .into_iter()
            .zip(self.sequence.peek()..)
            .map(|(snapshot, id)| StoreRow::new(id, snapshot))
            .collect();

        if !rows.is_empty() {
            self.insert_rows(&rows).await?;
            self.sequence.advance(rows.len());
        }

        let result = FlushResult {
            total: records.len(),
            written: rows.len(),
            skipped,
            ids,
        };
        debug!(
            "Committed {} of {} records to {} (ids {:?})",
            result.written, result.total, self.table, result.ids
        );
        Ok(result)
    }

    async fn insert_rows(&self, rows: &[StoreRow]) -> Result<(), CommitError> {
        let mut tx = self.pool.begin().await?;

        let inserted = tokio::time::timeout(
            self.commit_timeout,
            insert_chunks(&self.insert_prefix, &mut *tx, rows),
        )
        .await;
        let failure = match inserted {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(CommitError::from(e)),
            Err(_) => Some(CommitError::Timeout(self.commit_timeout)),
        };
        if let Some(failure) = failure {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Rollback after failed insert also failed: {}", rollback_err);
            }
            return Err(failure);
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn insert_chunks(
    insert_prefix: &str,
    conn: &mut AnyConnection,
    rows: &[StoreRow],
) -> Result<(), sqlx::Error> {
    for chunk in rows.chunks(MAX_ROWS_PER_STATEMENT) {
        let mut builder = QueryBuilder::<Any>::new(insert_prefix);
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(row.id)
                .push_bind(row.info.clone())
                .push_bind(row.cpu_usage)
                .push_bind(row.memory_usage)
                .push_bind(row.disk_usage.clone())
                .push_bind(row.processes.clone())
                .push_bind(row.connections.clone());
        });
        builder.build().execute(&mut *conn).await?;
    }
    Ok(())
}
