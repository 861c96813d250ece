//! Intake statistics tracking.
//!
//! This module provides thread-safe counters for what happened to messages and
//! records as they moved through the consumer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter as EnumIterMacro};

/// Countable events in the intake pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro, Display)]
#[strum(serialize_all = "snake_case")]
pub enum IntakeEvent {
    /// Messages delivered by the queue
    MessagesReceived,
    /// Messages dropped because the body could not be decoded
    DecodeDropped,
    /// Records dropped at write time because a field was missing or mistyped
    ValidationDropped,
    /// Rows confirmed by a commit
    RowsCommitted,
    /// Flushes that committed
    FlushesCommitted,
    /// Flushes whose commit failed
    CommitFailures,
    /// Messages handed back to the queue for redelivery
    MessagesRequeued,
    /// Store pools reopened after a connectivity failure
    Reconnects,
    /// Queue subscriptions re-established after the connection dropped
    QueueReconnects,
}

/// Thread-safe intake statistics tracker.
///
/// All event kinds are initialized to zero on creation, so lookups never miss.
/// Shared across tasks with `Arc`.
pub struct IntakeStats {
    counters: HashMap<IntakeEvent, AtomicUsize>,
}

impl IntakeStats {
    /// All counters at zero.
    pub fn new() -> Self {
        let mut counters = HashMap::new();
        for event in IntakeEvent::iter() {
            counters.insert(event, AtomicUsize::new(0));
        }
        IntakeStats { counters }
    }

    /// Adds one to an event counter.
    pub fn increment(&self, event: IntakeEvent) {
        self.add(event, 1);
    }

    /// Adds `n` to an event counter.
    pub fn add(&self, event: IntakeEvent, n: usize) {
        if let Some(counter) = self.counters.get(&event) {
            counter.fetch_add(n, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment counter for {:?} which is not in the map. \
                 This indicates a bug in IntakeStats initialization.",
                event
            );
        }
    }

    /// Current value of an event counter.
    pub fn get(&self, event: IntakeEvent) -> usize {
        self.counters
            .get(&event)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// All counters in declaration order.
    pub fn snapshot(&self) -> Vec<(IntakeEvent, usize)> {
        IntakeEvent::iter().map(|e| (e, self.get(e))).collect()
    }
}

impl Default for IntakeStats {
    fn default() -> Self {
        Self::new()
    }
}
