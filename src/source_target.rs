//! Source/target interface stubs (SPEC_FULL §6.1): minimal trait seams plus an in-memory
//! pair so this crate's own integration tests can exercise a full
//! source → runner chain → target flow without any concrete connector, which is out of
//! scope per spec §1.

use crate::message::Message;
use std::collections::VecDeque;

/// Producer of messages. Concrete connectors (MQTT, NATS, Kafka, Redis, ...) are external
/// collaborators, specified only at this interface level.
pub trait MessageSource {
    fn next(&mut self) -> Option<Message>;
}

/// Consumer of the final message after it has passed through a runner chain.
pub trait MessageTarget {
    fn send(&mut self, msg: Message) -> anyhow::Result<()>;
}

/// In-memory source backed by a fixed queue of messages. Test scaffolding only.
pub struct VecSource {
    queue: VecDeque<Message>,
}

impl VecSource {
    pub fn new(messages: Vec<Message>) -> Self {
        VecSource { queue: messages.into() }
    }
}

impl MessageSource for VecSource {
    fn next(&mut self) -> Option<Message> {
        self.queue.pop_front()
    }
}

/// In-memory target that collects every message it receives. Test scaffolding only.
#[derive(Default)]
pub struct VecTarget {
    pub received: Vec<Message>,
}

impl VecTarget {
    pub fn new() -> Self {
        VecTarget::default()
    }
}

impl MessageTarget for VecTarget {
    fn send(&mut self, msg: Message) -> anyhow::Result<()> {
        self.received.push(msg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_source_yields_in_order_then_none() {
        let mut source = VecSource::new(vec![Message::new(b"a".to_vec()), Message::new(b"b".to_vec())]);
        assert_eq!(source.next().unwrap().id(), b"a");
        assert_eq!(source.next().unwrap().id(), b"b");
        assert!(source.next().is_none());
    }

    #[test]
    fn vec_target_collects_sent_messages() {
        let mut target = VecTarget::new();
        target.send(Message::new(b"1".to_vec())).unwrap();
        target.send(Message::new(b"2".to_vec())).unwrap();
        assert_eq!(target.received.len(), 2);
    }
}
