use std::future::Future;
use std::pin::Pin;

use crate::error::Error;
use crate::message::{Delivery, Offset, Partition, ProducerRecord, RawMessage, Topic};

/// Where a fetch cursor starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOffset {
    /// Oldest retained message.
    Earliest,
    /// Only messages appended after the cursor is opened.
    Latest,
    At(Offset),
}

/// Resumable read position over one (topic, partition) log.
pub trait FetchCursor: Send {
    /// Wait for the next message. `Ok(None)` means the log was closed.
    ///
    /// Must be cancel-safe: a future dropped before completion never
    /// consumes a message.
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<RawMessage>, Error>> + Send + '_>>;
}

/// Consumer side of the broker client plus its offset-commit facility.
///
/// Committed offsets use the log-broker convention: the stored value is the
/// offset of the next message to consume.
pub trait Consumer: Send + Sync {
    /// Partitions the broker currently knows for `topic`.
    fn partitions<'a>(
        &'a self,
        topic: &'a Topic,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Partition>, Error>> + Send + 'a>>;

    /// Persisted resume point for `group`, if any.
    fn committed_offset<'a>(
        &'a self,
        group: &'a str,
        topic: &'a Topic,
        partition: Partition,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Offset>, Error>> + Send + 'a>>;

    fn open<'a>(
        &'a self,
        topic: &'a Topic,
        partition: Partition,
        start: StartOffset,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn FetchCursor>, Error>> + Send + 'a>>;

    /// Persist `next_offset` as the resume point for (group, topic, partition).
    fn commit<'a>(
        &'a self,
        group: &'a str,
        topic: &'a Topic,
        partition: Partition,
        next_offset: Offset,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;
}

/// Producer side of the broker client. Safe to share across partitions.
pub trait Producer: Send + Sync {
    /// Send a batch. Either every record is accepted (one `Delivery` per
    /// record, in input order) or the call fails. Retrying is the client's
    /// business; an error returned here is final.
    fn send(
        &self,
        records: Vec<ProducerRecord>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Delivery>, Error>> + Send + '_>>;
}
