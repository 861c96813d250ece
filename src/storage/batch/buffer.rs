//! In-memory batch buffer.
//!
//! The buffer holds decoded records in arrival order until a flush trigger
//! fires. It is only ever touched by the intake task, so it carries no locking.

use std::mem;
use std::time::{Duration, Instant};

use crate::models::TelemetryRecord;

/// Ordered records awaiting a flush, plus the time of the last flush.
#[derive(Debug)]
pub struct BatchBuffer {
    records: Vec<TelemetryRecord>,
    last_flush: Instant,
}

impl BatchBuffer {
    /// An empty buffer whose flush clock starts at `now`.
    pub fn new(now: Instant) -> Self {
        BatchBuffer {
            records: Vec::new(),
            last_flush: now,
        }
    }

    /// Adds a record at the end.
    pub fn append(&mut self, record: TelemetryRecord) {
        self.records.push(record);
    }

    /// True when the buffer holds `batch_size` records, or when more than
    /// `flush_interval` has passed since the last successful flush.
    ///
    /// The time trigger fires even for an empty buffer; an empty flush is a
    /// no-op that only resets the clock.
    pub fn should_flush(&self, batch_size: usize, flush_interval: Duration, now: Instant) -> bool {
        self.records.len() >= batch_size
            || now.saturating_duration_since(self.last_flush) > flush_interval
    }

    /// Buffered records in arrival order.
    pub fn records(&self) -> &[TelemetryRecord] {
        &self.records
    }

    /// Empties the buffer and hands back its records.
    pub fn drain(&mut self) -> Vec<TelemetryRecord> {
        mem::take(&mut self.records)
    }

    /// Removes and returns the most recently appended record.
    ///
    /// Used to hand a record back to the queue when the flush it triggered
    /// failed; the broker redelivers it, so keeping it would store it twice.
    pub fn pop_last(&mut self) -> Option<TelemetryRecord> {
        self.records.pop()
    }

    /// Resets the flush clock after a confirmed commit.
    pub fn mark_flushed(&mut self, now: Instant) {
        self.last_flush = now;
    }

    /// When the last successful flush happened.
    pub fn last_flush(&self) -> Instant {
        self.last_flush
    }

    /// Number of buffered records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
