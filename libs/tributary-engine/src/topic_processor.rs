use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tributary_api::{
    Consumer, ContainerId, Partition, ProcessorFactory, Producer, StartOffset, Topic,
};

use crate::config::TopicProcessorConfig;
use crate::error::{EngineError, PartitionError};
use crate::partition::{Input, PartitionProcessor, PartitionReport};

/// A partition unit stopped with an error. Sibling units keep running.
#[derive(Debug, Clone)]
pub struct PartitionFailure {
    pub partition: Partition,
    pub error: PartitionError,
}

/// Join handle of one spawned partition unit.
struct PartitionSlot {
    partition: Partition,
    handle: JoinHandle<Result<PartitionReport, PartitionError>>,
}

/// Runs the partitions of one topic processor owned by this container.
pub struct TopicProcessor {
    config: TopicProcessorConfig,
    factory: Arc<dyn ProcessorFactory>,
    container_id: ContainerId,
    consumer: Arc<dyn Consumer>,
    producer: Arc<dyn Producer>,
}

impl std::fmt::Debug for TopicProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicProcessor")
            .field("name", &self.config.name)
            .field("container_id", &self.container_id)
            .finish()
    }
}

impl TopicProcessor {
    /// Validate `config` and bind it to this container.
    pub fn new(
        config: TopicProcessorConfig,
        factory: Arc<dyn ProcessorFactory>,
        container_id: ContainerId,
        consumer: Arc<dyn Consumer>,
        producer: Arc<dyn Producer>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        if container_id.0 < 0 || container_id.0 >= config.container_count {
            return Err(EngineError::Config(format!(
                "processor '{}': container id {container_id} outside 0..{}",
                config.name, config.container_count
            )));
        }
        Ok(Self {
            config,
            factory,
            container_id,
            consumer,
            producer,
        })
    }

    pub fn config(&self) -> &TopicProcessorConfig {
        &self.config
    }

    pub fn container_id(&self) -> ContainerId {
        self.container_id
    }

    /// Partitions this container owns, ascending.
    pub fn partitions(&self) -> Vec<Partition> {
        self.config.partitions_for_container(self.container_id)
    }

    /// Spawn one unit per owned partition and return without waiting for
    /// any message.
    ///
    /// Every partition the broker reports for an input topic must be
    /// assigned; otherwise nothing is spawned.
    pub async fn start(self) -> Result<TopicProcessorHandle, EngineError> {
        let config = &self.config;

        // --- 1. Totality check ---
        let mut layout: Vec<(Topic, Vec<Partition>)> = Vec::new();
        for topic in &config.input_topics {
            let partitions = self
                .consumer
                .partitions(topic)
                .await
                .map_err(|e| EngineError::Api(e.with_context(format!("input topic '{topic}'"))))?;
            if partitions.is_empty() {
                return Err(EngineError::UnknownTopic(topic.clone()));
            }
            if let Some(partition) = partitions
                .iter()
                .find(|p| !config.partition_assignment.contains_key(*p))
            {
                return Err(EngineError::UnassignedPartition {
                    topic: topic.clone(),
                    partition: *partition,
                });
            }
            layout.push((topic.clone(), partitions));
        }

        // --- 2. Build units ---
        let owned = self.partitions();
        let group = config.consumer_group();
        let serdes = Arc::new(config.topic_serdes.clone());
        tracing::info!(
            processor = %config.name,
            container = %self.container_id,
            group = %group,
            client_id = %config.producer_client_id(self.container_id),
            partitions = ?owned,
            policy = ?config.commit_policy(),
            "starting topic processor"
        );
        if owned.is_empty() {
            tracing::info!(processor = %config.name, container = %self.container_id, "no partitions assigned, container is idle");
        }

        let mut units = Vec::with_capacity(owned.len());
        for partition in owned {
            let mut inputs = Vec::new();
            for (topic, partitions) in &layout {
                if !partitions.contains(&partition) {
                    continue;
                }
                let ctx = format!("topic '{topic}' partition {partition}");
                let start = match self
                    .consumer
                    .committed_offset(&group, topic, partition)
                    .await
                    .map_err(|e| EngineError::Api(e.with_context(&ctx)))?
                {
                    Some(offset) => StartOffset::At(offset),
                    None => config.initial_offset.start_offset(),
                };
                let cursor = self
                    .consumer
                    .open(topic, partition, start)
                    .await
                    .map_err(|e| EngineError::Api(e.with_context(&ctx)))?;
                tracing::debug!(processor = %config.name, topic = %topic, partition = %partition, start = ?start, "opened cursor");
                inputs.push(Input {
                    topic: topic.clone(),
                    cursor,
                });
            }
            if inputs.is_empty() {
                tracing::warn!(
                    processor = %config.name,
                    partition = %partition,
                    "owned partition exists in no input topic, skipping"
                );
                continue;
            }
            units.push(PartitionProcessor::new(
                config.name.clone(),
                group.clone(),
                partition,
                inputs,
                serdes.clone(),
                self.factory.create(partition),
                self.consumer.clone(),
                self.producer.clone(),
                config.auto_mark_interval(),
            ));
        }

        // --- 3. Spawn ---
        let token = CancellationToken::new();
        let (failure_tx, failures) = mpsc::unbounded_channel();
        let mut slots = Vec::with_capacity(units.len());
        for unit in units {
            let partition = unit.partition();
            let token = token.child_token();
            let failure_tx = failure_tx.clone();
            let handle = tokio::spawn(async move {
                let result = unit.run(token).await;
                if let Err(error) = &result {
                    let _ = failure_tx.send(PartitionFailure {
                        partition,
                        error: error.clone(),
                    });
                }
                result
            });
            slots.push(PartitionSlot { partition, handle });
        }

        Ok(TopicProcessorHandle {
            name: self.config.name,
            token,
            slots,
            failures,
        })
    }
}

/// Handle to a started topic processor.
pub struct TopicProcessorHandle {
    name: String,
    token: CancellationToken,
    slots: Vec<PartitionSlot>,
    failures: mpsc::UnboundedReceiver<PartitionFailure>,
}

impl std::fmt::Debug for TopicProcessorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicProcessorHandle")
            .field("name", &self.name)
            .field("partitions", &self.partitions())
            .finish()
    }
}

impl TopicProcessorHandle {
    /// Partitions with a running (or finished) unit, ascending.
    pub fn partitions(&self) -> Vec<Partition> {
        self.slots.iter().map(|s| s.partition).collect()
    }

    /// Wait for the next partition failure. Returns `None` once every unit
    /// has finished.
    pub async fn next_failure(&mut self) -> Option<PartitionFailure> {
        self.failures.recv().await
    }

    /// Stop every unit after its in-flight message and collect the results.
    pub async fn shutdown(self) -> Vec<(Partition, Result<PartitionReport, PartitionError>)> {
        tracing::info!(processor = %self.name, "shutting down topic processor");
        self.token.cancel();

        let mut results = Vec::with_capacity(self.slots.len());
        for slot in self.slots {
            let result = match slot.handle.await {
                Ok(result) => result,
                Err(join_err) => {
                    tracing::error!(processor = %self.name, partition = %slot.partition, error = %join_err, "partition task aborted");
                    Err(PartitionError::Aborted {
                        partition: slot.partition,
                        reason: join_err.to_string(),
                    })
                }
            };
            results.push((slot.partition, result));
        }
        tracing::info!(processor = %self.name, "topic processor stopped");
        results
    }
}
