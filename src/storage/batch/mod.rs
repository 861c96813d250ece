//! Batching of decoded records into atomic store writes.
//!
//! [`BatchBuffer`] collects records between flushes and [`BatchWriter`] turns a
//! slice of records into one transaction. The decision of when to flush lives
//! with the intake loop.

mod buffer;
mod writer;

use std::ops::RangeInclusive;

pub use buffer::BatchBuffer;
pub use writer::BatchWriter;

/// Outcome of a committed batch write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushResult {
    /// Records handed to the writer
    pub total: usize,
    /// Rows inserted by the commit
    pub written: usize,
    /// Records dropped because they failed validation
    pub skipped: usize,
    /// Identifiers assigned to the inserted rows
    pub ids: Option<RangeInclusive<i64>>,
}

impl FlushResult {
    pub(crate) fn empty() -> Self {
        FlushResult {
            total: 0,
            written: 0,
            skipped: 0,
            ids: None,
        }
    }
}
