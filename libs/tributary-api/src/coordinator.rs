use std::collections::HashMap;

use crate::message::{IncomingMessage, Offset, Partition, Topic};

/// Offset-commit policy of a topic processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPolicy {
    /// A timer commits whatever has been fully processed.
    Automatic,
    /// Only offsets marked through `Coordinator::commit` are committed.
    Manual,
}

/// Commit-protocol handle given to processing logic, one per partition.
///
/// Marks are high-water marks: marking offset K of a topic declares every
/// offset up to and including K safe to commit.
#[derive(Debug)]
pub struct Coordinator {
    partition: Partition,
    policy: CommitPolicy,
    marks: HashMap<Topic, Offset>,
}

impl Coordinator {
    pub fn new(partition: Partition, policy: CommitPolicy) -> Self {
        Self {
            partition,
            policy,
            marks: HashMap::new(),
        }
    }

    /// Mark `message` as safe to commit.
    ///
    /// Under the automatic policy this is accepted and ignored. Marks never
    /// move backwards.
    pub fn commit(&mut self, message: &IncomingMessage) {
        if message.partition != self.partition {
            tracing::warn!(
                partition = %self.partition,
                message_partition = %message.partition,
                topic = %message.topic,
                offset = message.offset,
                "ignoring commit mark for a message of another partition"
            );
            return;
        }
        if self.policy == CommitPolicy::Automatic {
            return;
        }
        let mark = self.marks.entry(message.topic.clone()).or_insert(message.offset);
        if *mark < message.offset {
            *mark = message.offset;
        }
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    pub fn policy(&self) -> CommitPolicy {
        self.policy
    }

    /// Highest marked offset of `topic` not yet taken.
    pub fn pending_mark(&self, topic: &str) -> Option<Offset> {
        self.marks.get(topic).copied()
    }

    /// Remove and return every pending mark. Called by the partition
    /// processor once the marked messages' sends are accepted.
    pub fn take_marks(&mut self) -> Vec<(Topic, Offset)> {
        self.marks.drain().collect()
    }
}
