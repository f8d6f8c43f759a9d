use tributary_api::{Error, MessageRef, Offset, Partition, Topic};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Api(#[from] Error),

    #[error("partition {partition} of topic '{topic}' is not assigned to any container")]
    UnassignedPartition { topic: Topic, partition: Partition },

    #[error("input topic '{0}' has no partitions on the broker")]
    UnknownTopic(Topic),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Add context to the error.
    ///
    /// For `Api` variant, context is added to the inner `Error`.
    /// For `Config`, context is prepended to the message.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            EngineError::Api(e) => EngineError::Api(e.with_context(ctx)),
            EngineError::Config(msg) => EngineError::Config(format!("{ctx}: {msg}")),
            other => other,
        }
    }
}

/// Failure that stops one partition unit. Siblings keep running.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PartitionError {
    #[error("fetch {topic}/{partition}: {source}")]
    Fetch {
        topic: Topic,
        partition: Partition,
        source: Error,
    },

    #[error("decode {message}: {source}")]
    Decode { message: MessageRef, source: Error },

    #[error("process {message}: {source}")]
    Process { message: MessageRef, source: Error },

    #[error("send output of {message}: {source}")]
    Send { message: MessageRef, source: Error },

    #[error("commit {topic}/{partition} at {offset}: {source}")]
    Commit {
        topic: Topic,
        partition: Partition,
        offset: Offset,
        source: Error,
    },

    #[error("partition {partition} task aborted: {reason}")]
    Aborted { partition: Partition, reason: String },
}
