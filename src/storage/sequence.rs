//! Process-local identifier sequence.
//!
//! Identifiers are handed out per surviving record in buffer order. A batch
//! first peeks at the identifiers it would use and only advances the sequence
//! once its commit is confirmed, so a retried batch reuses the same range.
//!
//! The sequence is scoped to one writer. Two consumers writing to the same
//! table will produce duplicate identifiers.

use std::ops::RangeInclusive;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdSequence {
    next: i64,
}

impl IdSequence {
    pub fn new(start: i64) -> Self {
        IdSequence { next: start }
    }

    /// The identifier the next committed row will get.
    pub fn peek(&self) -> i64 {
        self.next
    }

    /// Identifiers `count` rows would get, without consuming them.
    pub fn peek_range(&self, count: usize) -> Option<RangeInclusive<i64>> {
        if count == 0 {
            return None;
        }
        let last = self.next.saturating_add(count as i64 - 1);
        Some(self.next..=last)
    }

    /// Consumes `count` identifiers after a confirmed commit.
    pub fn advance(&mut self, count: usize) {
        self.next = self.next.saturating_add(count as i64);
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        IdSequence::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peek_does_not_consume() {
        let seq = IdSequence::new(1);
        assert_eq!(seq.peek_range(3), Some(1..=3));
        assert_eq!(seq.peek_range(3), Some(1..=3));
        assert_eq!(seq.peek(), 1);
    }

    #[test]
    fn test_advance_after_commit() {
        let mut seq = IdSequence::default();
        seq.advance(100);
        assert_eq!(seq.peek(), 101);
        assert_eq!(seq.peek_range(2), Some(101..=102));
    }

    #[test]
    fn test_empty_range() {
        assert_eq!(IdSequence::new(5).peek_range(0), None);
    }
}
