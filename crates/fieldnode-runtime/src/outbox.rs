use flume::{Receiver, Sender};

use tracing::warn;

use fieldnode::message::Message;

/// The queue of messages waiting to be sent to the server.
///
/// Clones share the same queue.
#[derive(Debug, Clone)]
pub struct Outbox {
    sender: Sender<Message<'static>>,
}

impl Outbox {
    /// Creates an [`Outbox`] and the receiver draining it.
    #[must_use]
    pub fn new() -> (Self, Receiver<Message<'static>>) {
        let (sender, receiver) = flume::unbounded();
        (Self { sender }, receiver)
    }

    /// Queues a message.
    ///
    /// A message is dropped when nobody drains the queue anymore.
    pub fn send(&self, message: Message<'_>) {
        let kind = message.kind();
        if self.sender.send(message.into_owned()).is_err() {
            warn!("Dropped a `{kind}` message: the outbox is closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use fieldnode::message::Message;
    use fieldnode::response::ErrorMessage;

    use super::Outbox;

    #[test]
    fn closed_outbox_drops_messages() {
        let (outbox, receiver) = Outbox::new();
        outbox.send(Message::Error(ErrorMessage::new("Node", "first")));
        assert_eq!(receiver.len(), 1);

        drop(receiver);
        outbox.send(Message::Error(ErrorMessage::new("Node", "second")));
    }
}
