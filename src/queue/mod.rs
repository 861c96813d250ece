//! Queue subscription.
//!
//! The intake loop pulls messages through the [`MessageSource`] trait and
//! reports each outcome back as either a finish or a requeue. Two sources are
//! provided: [`NsqSource`] speaks the nsqd TCP protocol, and [`MemorySource`]
//! is fed from an in-process channel.

mod memory;
pub mod nsq;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error_handling::QueueError;

pub use memory::{Ack, AckLog, MemoryPublisher, MemorySource};
pub use nsq::{NsqConfig, NsqSource};

/// Broker-assigned message identifier (16 bytes, hex ASCII for nsqd).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId([u8; 16]);

impl MessageId {
    /// Wraps raw identifier bytes.
    pub fn new(bytes: [u8; 16]) -> Self {
        MessageId(bytes)
    }

    /// The identifier as sent on the wire.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// One message handed out by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Identifier used to finish or requeue the message
    pub id: MessageId,
    /// Delivery attempts so far, starting at 1
    pub attempts: u16,
    /// Publish time in nanoseconds since the Unix epoch
    pub timestamp_ns: i64,
    /// Raw message body
    pub body: Vec<u8>,
}

/// A subscription that delivers messages one at a time.
///
/// `next_message` must be cancel-safe: the intake loop races it against the
/// idle timer and the shutdown token.
#[async_trait]
pub trait MessageSource: Send {
    /// Waits for the next message. `Ok(None)` means the subscription ended
    /// cleanly.
    async fn next_message(&mut self) -> Result<Option<Delivery>, QueueError>;

    /// Acknowledges a message so it is never redelivered.
    async fn finish(&mut self, id: &MessageId) -> Result<(), QueueError>;

    /// Hands a message back for redelivery after `delay`.
    async fn requeue(&mut self, id: &MessageId, delay: Duration) -> Result<(), QueueError>;

    /// Stops the subscription.
    async fn close(&mut self) -> Result<(), QueueError> {
        Ok(())
    }

    /// Re-establishes a dropped subscription.
    async fn reconnect(&mut self) -> Result<(), QueueError> {
        Err(QueueError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_display() {
        let id = MessageId::new(*b"0a1b2c3d4e5f6a7b");
        assert_eq!(id.to_string(), "0a1b2c3d4e5f6a7b");
        assert_eq!(id.as_bytes(), b"0a1b2c3d4e5f6a7b");
    }
}
