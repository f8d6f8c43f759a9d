pub mod broker;
pub mod coordinator;
pub mod error;
pub mod message;
pub mod processor;
pub mod sender;
pub mod serdes;
pub mod store;

pub use broker::{Consumer, FetchCursor, Producer, StartOffset};
pub use coordinator::{CommitPolicy, Coordinator};
pub use error::{Error, ErrorKind};
pub use message::{
    ContainerId, Delivery, IncomingMessage, MessageRef, Offset, OutgoingMessage, Partition,
    ProducerRecord, RawMessage, Topic,
};
pub use processor::{MessageProcessor, ProcessorFactory};
pub use sender::Sender;
pub use serdes::{Int64Serde, JsonSerde, Serde, SerdeKind, StringSerde, TopicSerde, TopicSerdes};
pub use store::Store;
