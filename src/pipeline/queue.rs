use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::error;

use crate::models::Event;

/// Sending half of the delivery queue.
///
/// Enqueueing never blocks: when the queue is full the new event is dropped.
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<Event>,
}

impl EventQueue {
    /// Create a queue holding at most `capacity` events (at least one).
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Try to enqueue an event. Returns `false` if it was dropped.
    pub fn submit(&self, event: Event) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                error!(hostname = %event.hostname, url = %event.url, "failed to submit event: queue full");
                false
            }
            Err(TrySendError::Closed(_)) => {
                error!("failed to submit event: delivery worker is gone");
                false
            }
        }
    }

    /// Number of events waiting for delivery.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}
