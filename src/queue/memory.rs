//! In-process message source.
//!
//! Messages published through a [`MemoryPublisher`] are delivered in order.
//! Requeued messages are redelivered ahead of new ones with their attempt
//! count bumped, ignoring the requested delay. Every finish and requeue is
//! recorded in an [`AckLog`] that callers can inspect.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Delivery, MessageId, MessageSource};
use crate::error_handling::QueueError;

/// How a message was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// Acknowledged
    Finished(MessageId),
    /// Handed back for redelivery
    Requeued(MessageId, Duration),
}

/// Shared record of settled messages, in settlement order.
#[derive(Debug, Clone, Default)]
pub struct AckLog(Arc<Mutex<Vec<Ack>>>);

impl AckLog {
    fn push(&self, ack: Ack) {
        if let Ok(mut acks) = self.0.lock() {
            acks.push(ack);
        }
    }

    /// Copy of everything recorded so far.
    pub fn entries(&self) -> Vec<Ack> {
        self.0.lock().map(|acks| acks.clone()).unwrap_or_default()
    }

    /// Number of finished messages.
    pub fn finished(&self) -> usize {
        self.count(|ack| matches!(ack, Ack::Finished(_)))
    }

    /// Number of requeued messages.
    pub fn requeued(&self) -> usize {
        self.count(|ack| matches!(ack, Ack::Requeued(..)))
    }

    fn count(&self, pred: impl Fn(&Ack) -> bool) -> usize {
        self.0
            .lock()
            .map(|acks| acks.iter().filter(|a| pred(a)).count())
            .unwrap_or(0)
    }
}

/// Sending half of an in-memory subscription.
#[derive(Debug, Clone)]
pub struct MemoryPublisher {
    tx: mpsc::Sender<Delivery>,
    next_id: Arc<Mutex<u64>>,
}

impl MemoryPublisher {
    /// Publishes a body and returns the identifier it was given.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Closed` if the source was dropped.
    pub async fn publish(&self, body: impl Into<Vec<u8>>) -> Result<MessageId, QueueError> {
        let id = {
            let mut next = self.next_id.lock().map_err(|_| QueueError::Closed)?;
            *next += 1;
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(format!("{:016x}", *next).as_bytes());
            MessageId::new(bytes)
        };
        let delivery = Delivery {
            id,
            attempts: 1,
            timestamp_ns: chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            body: body.into(),
        };
        self.tx
            .send(delivery)
            .await
            .map_err(|_| QueueError::Closed)?;
        Ok(id)
    }
}

/// Receiving half of an in-memory subscription.
#[derive(Debug)]
pub struct MemorySource {
    rx: mpsc::Receiver<Delivery>,
    redeliveries: VecDeque<Delivery>,
    in_flight: HashMap<MessageId, Delivery>,
    acks: AckLog,
}

impl MemorySource {
    /// Creates a connected publisher and source.
    ///
    /// The source ends once every publisher is dropped and all pending
    /// redeliveries were handed out.
    pub fn channel(capacity: usize) -> (MemoryPublisher, MemorySource) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let publisher = MemoryPublisher {
            tx,
            next_id: Arc::new(Mutex::new(0)),
        };
        let source = MemorySource {
            rx,
            redeliveries: VecDeque::new(),
            in_flight: HashMap::new(),
            acks: AckLog::default(),
        };
        (publisher, source)
    }

    /// Handle to the log of settled messages.
    pub fn acks(&self) -> AckLog {
        self.acks.clone()
    }

    /// Messages handed out but not yet settled.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn next_message(&mut self) -> Result<Option<Delivery>, QueueError> {
        let delivery = match self.redeliveries.pop_front() {
            Some(delivery) => delivery,
            None => match self.rx.recv().await {
                Some(delivery) => delivery,
                None => return Ok(None),
            },
        };
        self.in_flight.insert(delivery.id, delivery.clone());
        Ok(Some(delivery))
    }

    async fn finish(&mut self, id: &MessageId) -> Result<(), QueueError> {
        self.in_flight.remove(id);
        self.acks.push(Ack::Finished(*id));
        Ok(())
    }

    async fn requeue(&mut self, id: &MessageId, delay: Duration) -> Result<(), QueueError> {
        if let Some(mut delivery) = self.in_flight.remove(id) {
            delivery.attempts = delivery.attempts.saturating_add(1);
            self.redeliveries.push_back(delivery);
        }
        self.acks.push(Ack::Requeued(*id, delay));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), QueueError> {
        self.rx.close();
        Ok(())
    }
}
