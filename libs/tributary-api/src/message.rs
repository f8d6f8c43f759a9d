use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Position of a message within one partition's log.
pub type Offset = i64;

/// Name of an ordered, partitioned, append-only log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Topic {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for Topic {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Index into a topic's ordered sub-logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Partition(pub i32);

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for Partition {
    fn from(p: i32) -> Self {
        Self(p)
    }
}

/// Identifies one execution unit (process) among a fixed pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(pub i32);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for ContainerId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

/// Identity of a delivered message: (topic, partition, offset).
///
/// Attached to producer records so a successful send can be correlated with
/// the offset that triggered it. Holds no reference to the message itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub topic: Topic,
    pub partition: Partition,
    pub offset: Offset,
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.topic, self.partition, self.offset)
    }
}

/// Undecoded message as returned by a fetch cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub topic: Topic,
    pub partition: Partition,
    pub offset: Offset,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    /// Broker timestamp in milliseconds, when the broker provides one.
    pub timestamp_ms: Option<i64>,
}

/// Message handed to processing logic. Key and value are already decoded
/// with the topic's serde; a missing key or value decodes to `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub topic: Topic,
    pub partition: Partition,
    pub offset: Offset,
    pub key: Value,
    pub value: Value,
    pub timestamp_ms: Option<i64>,
}

impl IncomingMessage {
    pub fn reference(&self) -> MessageRef {
        MessageRef {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
        }
    }
}

/// Message emitted by processing logic through a `Sender`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub topic: Topic,
    /// `None` lets the broker choose.
    pub partition: Option<Partition>,
    pub key: Value,
    pub value: Value,
}

impl OutgoingMessage {
    pub fn new(topic: impl Into<Topic>, key: Value, value: Value) -> Self {
        Self {
            topic: topic.into(),
            partition: None,
            key,
            value,
        }
    }

    pub fn with_partition(mut self, partition: impl Into<Partition>) -> Self {
        self.partition = Some(partition.into());
        self
    }
}

/// Serialized outgoing record, ready for the broker producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerRecord {
    pub topic: Topic,
    pub partition: Option<Partition>,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// The incoming message whose processing produced this record.
    pub metadata: MessageRef,
}

/// Broker acknowledgement for one accepted producer record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: Topic,
    pub partition: Partition,
    pub offset: Offset,
    pub metadata: MessageRef,
}
