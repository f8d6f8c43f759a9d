pub mod config;
pub mod error;
pub mod memory_broker;
mod offsets;
mod partition;
pub mod topic_processor;

pub use config::{InitialOffset, TopicProcessorConfig, TopicProcessorSettings, TopicSerdeSettings};
pub use error::{EngineError, PartitionError};
pub use memory_broker::MemoryBroker;
pub use partition::PartitionReport;
pub use topic_processor::{PartitionFailure, TopicProcessor, TopicProcessorHandle};
