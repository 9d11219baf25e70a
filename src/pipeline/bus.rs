//! The pipeline bus: many posters, exactly one consumer.
//!
//! The channel is unbounded so posting never blocks the frame path. Messages
//! are delivered in posting order and are never dropped while the receiver
//! exists.

use crate::types::BusMessage;
use tokio::sync::mpsc;
use tracing::debug;

/// Constructor for a bus handle/receiver pair.
pub struct Bus;

impl Bus {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (BusHandle, BusReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (BusHandle { tx }, BusReceiver { rx })
    }
}

/// Cloneable posting side of the bus.
#[derive(Debug, Clone)]
pub struct BusHandle {
    tx: mpsc::UnboundedSender<BusMessage>,
}

impl BusHandle {
    /// Post a message. Returns `false` if the consumer is gone.
    pub fn post(&self, message: BusMessage) -> bool {
        match self.tx.send(message) {
            Ok(()) => true,
            Err(e) => {
                debug!(message = %e.0, "Bus consumer gone, message discarded");
                false
            }
        }
    }
}

/// Single consuming side of the bus.
#[derive(Debug)]
pub struct BusReceiver {
    rx: mpsc::UnboundedReceiver<BusMessage>,
}

impl BusReceiver {
    /// Wait for the next message. `None` means every handle was dropped.
    pub async fn next_message(&mut self) -> Option<BusMessage> {
        self.rx.recv().await
    }

    /// Next message if one is already queued.
    pub fn try_next(&mut self) -> Option<BusMessage> {
        self.rx.try_recv().ok()
    }

    /// Take every message queued right now.
    pub fn drain_pending(&mut self) -> Vec<BusMessage> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StageFailure;

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let (bus, mut rx) = Bus::new();
        let other = bus.clone();
        assert!(bus.post(BusMessage::Error(StageFailure::new("source", "boom"))));
        assert!(other.post(BusMessage::EndOfStream));

        assert!(matches!(rx.next_message().await, Some(BusMessage::Error(_))));
        assert_eq!(rx.drain_pending(), vec![BusMessage::EndOfStream]);
        assert!(rx.try_next().is_none());
    }

    #[tokio::test]
    async fn test_closed_when_handles_dropped() {
        let (bus, mut rx) = Bus::new();
        drop(bus);
        assert!(rx.next_message().await.is_none());
    }

    #[test]
    fn test_post_after_receiver_dropped() {
        let (bus, rx) = Bus::new();
        drop(rx);
        assert!(!bus.post(BusMessage::EndOfStream));
    }
}
