//! Event bus for control events
//!
//! Uses a bounded tokio::sync::mpsc channel: every adapter holds a cloned
//! [`EventBus`] sender and the dispatcher owns the single [`EventReceiver`].
//! Producers wait when the queue is full.

pub mod events;

pub use events::{Action, ControlEvent, EventSource, SEEK_STEP_SECS};

use tokio::sync::mpsc;

/// Default queue depth. Control events are rare; a full queue means the
/// dispatcher is stuck on the player and producers should wait.
pub const DEFAULT_CAPACITY: usize = 10;

/// Error returned when the dispatcher has gone away
#[derive(Debug, thiserror::Error)]
#[error("event bus closed, dropped {0}")]
pub struct BusClosed(pub ControlEvent);

/// Producer handle, cheap to clone
#[derive(Clone)]
pub struct EventBus {
    sender: mpsc::Sender<ControlEvent>,
}

impl EventBus {
    /// Queue an event, waiting for room if the dispatcher is behind
    pub async fn publish(&self, event: ControlEvent) -> Result<(), BusClosed> {
        self.sender
            .send(event)
            .await
            .map_err(|mpsc::error::SendError(event)| BusClosed(event))
    }

    /// Whether the dispatcher side has been dropped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Free slots left in the queue
    pub fn capacity(&self) -> usize {
        self.sender.capacity()
    }
}

/// Consumer side, owned by the dispatcher
pub struct EventReceiver {
    receiver: mpsc::Receiver<ControlEvent>,
}

impl EventReceiver {
    /// Next event in FIFO order, `None` once every producer is gone
    pub async fn recv(&mut self) -> Option<ControlEvent> {
        self.receiver.recv().await
    }

    /// Stop accepting new events; already queued events can still be drained
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// Create a bus with the given capacity
pub fn channel(capacity: usize) -> (EventBus, EventReceiver) {
    let (sender, receiver) = mpsc::channel(capacity);
    (EventBus { sender }, EventReceiver { receiver })
}

/// Create a bus with [`DEFAULT_CAPACITY`]
pub fn create_bus() -> (EventBus, EventReceiver) {
    channel(DEFAULT_CAPACITY)
}
