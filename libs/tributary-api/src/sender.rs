use std::sync::Arc;

use crate::error::Error;
use crate::message::{MessageRef, OutgoingMessage, ProducerRecord};
use crate::serdes::TopicSerdes;

/// Collects the outgoing messages emitted while one incoming message is
/// processed.
///
/// `send` only serializes and buffers; nothing is transmitted until the
/// partition processor flushes the buffer after `process` returns. The
/// buffer is flushed once per incoming message and then dropped.
pub struct Sender {
    serdes: Arc<TopicSerdes>,
    source: MessageRef,
    records: Vec<ProducerRecord>,
}

impl Sender {
    pub fn new(serdes: Arc<TopicSerdes>, source: MessageRef) -> Self {
        Self {
            serdes,
            source,
            records: Vec::new(),
        }
    }

    /// Serialize `message` with its topic's serde and append it to the buffer.
    ///
    /// Sending to a topic without a registered serde is a Config error.
    pub fn send(&mut self, message: OutgoingMessage) -> Result<(), Error> {
        let serde = self.serdes.get(&message.topic).ok_or_else(|| {
            Error::config(format!("no serde registered for topic '{}'", message.topic))
        })?;
        let ctx = || format!("topic '{}'", message.topic);
        let key = serde
            .key
            .serialize(&message.key)
            .map_err(|e| e.with_context(format!("{} key", ctx())))?;
        let value = serde
            .value
            .serialize(&message.value)
            .map_err(|e| e.with_context(format!("{} value", ctx())))?;

        self.records.push(ProducerRecord {
            topic: message.topic,
            partition: message.partition,
            key,
            value,
            metadata: self.source.clone(),
        });
        Ok(())
    }

    /// The incoming message this sender is bound to.
    pub fn source(&self) -> &MessageRef {
        &self.source
    }

    pub fn records(&self) -> &[ProducerRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drain the buffer, in call order.
    pub fn into_records(self) -> Vec<ProducerRecord> {
        self.records
    }
}
