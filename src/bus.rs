//! Pub/sub between the scheduler, skills and channel adapters. Two topics
//! per direction: inbound messages are consumed by the agent pump, outbound
//! messages by the channel manager. Delivery is best-effort; order is
//! preserved per topic.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct BusMessage {
    pub(crate) channel: String,
    pub(crate) sender_id: String,
    pub(crate) chat_id: String,
    pub(crate) content: String,
}

impl BusMessage {
    pub(crate) fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        BusMessage {
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
        }
    }
}

pub(crate) struct MessageBus {
    inbound_tx: Sender<BusMessage>,
    inbound_rx: Mutex<Receiver<BusMessage>>,
    outbound_tx: Sender<BusMessage>,
    outbound_rx: Mutex<Receiver<BusMessage>>,
}

impl MessageBus {
    pub(crate) fn new() -> Self {
        let (inbound_tx, inbound_rx) = channel();
        let (outbound_tx, outbound_rx) = channel();
        MessageBus {
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            outbound_tx,
            outbound_rx: Mutex::new(outbound_rx),
        }
    }

    pub(crate) fn publish_inbound(&self, msg: BusMessage) {
        if self.inbound_tx.send(msg).is_err() {
            eprintln!("[bus] inbound topic closed, message dropped");
        }
    }

    pub(crate) fn publish_outbound(&self, msg: BusMessage) {
        if self.outbound_tx.send(msg).is_err() {
            eprintln!("[bus] outbound topic closed, message dropped");
        }
    }

    /// Blocking pop with a timeout so consumers can observe shutdown.
    pub(crate) fn next_inbound(&self, timeout: Duration) -> Option<BusMessage> {
        let rx = self.inbound_rx.lock().unwrap_or_else(|e| e.into_inner());
        rx.recv_timeout(timeout).ok()
    }

    pub(crate) fn next_outbound(&self, timeout: Duration) -> Option<BusMessage> {
        let rx = self.outbound_rx.lock().unwrap_or_else(|e| e.into_inner());
        rx.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_topic_order() {
        let bus = MessageBus::new();
        bus.publish_inbound(BusMessage::new("telegram", "u", "1", "first"));
        bus.publish_inbound(BusMessage::new("telegram", "u", "1", "second"));
        bus.publish_outbound(BusMessage::new("telegram", "agent", "1", "reply"));

        let a = bus.next_inbound(Duration::from_millis(50)).unwrap();
        let b = bus.next_inbound(Duration::from_millis(50)).unwrap();
        assert_eq!(a.content, "first");
        assert_eq!(b.content, "second");
        assert_eq!(
            bus.next_outbound(Duration::from_millis(50)).unwrap().content,
            "reply"
        );
        assert!(bus.next_inbound(Duration::from_millis(10)).is_none());
    }
}
