use std::future::Future;
use std::pin::Pin;

use crate::coordinator::Coordinator;
use crate::error::Error;
use crate::message::{IncomingMessage, Partition};
use crate::sender::Sender;

/// User processing logic: the only code the engine calls per message.
///
/// `process` runs to completion before the next message of the same
/// partition is taken. It may await store round trips and call
/// `sender.send` any number of times; the buffered records are flushed to
/// the broker after it returns. Returning an error stops the partition
/// without committing the message.
pub trait MessageProcessor: Send {
    fn process<'a>(
        &'a mut self,
        message: &'a IncomingMessage,
        sender: &'a mut Sender,
        coordinator: &'a mut Coordinator,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;
}

/// Builds one `MessageProcessor` per owned partition.
///
/// Instances share nothing unless the factory hands them a shared resource
/// (typically an `Arc<dyn Store>`).
pub trait ProcessorFactory: Send + Sync {
    fn create(&self, partition: Partition) -> Box<dyn MessageProcessor>;
}

impl<F> ProcessorFactory for F
where
    F: Fn(Partition) -> Box<dyn MessageProcessor> + Send + Sync,
{
    fn create(&self, partition: Partition) -> Box<dyn MessageProcessor> {
        self(partition)
    }
}
