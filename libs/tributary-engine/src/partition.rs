use std::sync::Arc;
use std::time::Duration;

use futures::future::select_all;
use serde_json::Value;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use tributary_api::{
    CommitPolicy, Consumer, Coordinator, Error, FetchCursor, IncomingMessage, MessageProcessor,
    MessageRef, Offset, Partition, Producer, RawMessage, Sender, Topic, TopicSerdes,
};

use crate::error::PartitionError;
use crate::offsets::OffsetTracker;

/// Outcome of a partition unit that stopped cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionReport {
    pub partition: Partition,
    /// Messages whose process-send cycle completed.
    pub processed: u64,
    /// Last committed next-offset per input topic, sorted by topic.
    pub committed: Vec<(Topic, Offset)>,
}

/// Fetch cursor for one input topic of the partition.
pub(crate) struct Input {
    pub(crate) topic: Topic,
    pub(crate) cursor: Box<dyn FetchCursor>,
}

enum Step {
    Stop,
    Tick,
    Fetched(usize, Result<Option<RawMessage>, Error>),
}

/// Sequential consume-process-send-commit loop for one partition.
pub(crate) struct PartitionProcessor {
    name: String,
    group: String,
    partition: Partition,
    inputs: Vec<Input>,
    input_topics: Vec<Topic>,
    serdes: Arc<TopicSerdes>,
    processor: Box<dyn MessageProcessor>,
    coordinator: Coordinator,
    consumer: Arc<dyn Consumer>,
    producer: Arc<dyn Producer>,
    tracker: OffsetTracker,
    auto_interval: Option<Duration>,
    processed: u64,
    /// Input polled first on the next fetch.
    next_input: usize,
}

impl PartitionProcessor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        group: String,
        partition: Partition,
        inputs: Vec<Input>,
        serdes: Arc<TopicSerdes>,
        processor: Box<dyn MessageProcessor>,
        consumer: Arc<dyn Consumer>,
        producer: Arc<dyn Producer>,
        auto_interval: Option<Duration>,
    ) -> Self {
        let policy = if auto_interval.is_some() {
            CommitPolicy::Automatic
        } else {
            CommitPolicy::Manual
        };
        let input_topics = inputs.iter().map(|i| i.topic.clone()).collect();
        Self {
            name,
            group,
            partition,
            inputs,
            input_topics,
            serdes,
            processor,
            coordinator: Coordinator::new(partition, policy),
            consumer,
            producer,
            tracker: OffsetTracker::new(),
            auto_interval,
            processed: 0,
            next_input: 0,
        }
    }

    pub(crate) fn partition(&self) -> Partition {
        self.partition
    }

    /// Run until `token` is cancelled, every input closes, or a message fails.
    ///
    /// Cancellation is only observed between messages. Outstanding commits
    /// are flushed on the way out, including after a failure: only offsets
    /// that completed their cycle are ever eligible.
    pub(crate) async fn run(mut self, token: CancellationToken) -> Result<PartitionReport, PartitionError> {
        let mut ticker = self.auto_interval.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        tracing::info!(
            processor = %self.name,
            partition = %self.partition,
            topics = ?self.input_topics,
            policy = ?self.coordinator.policy(),
            "partition started"
        );

        let outcome = self.consume(&token, &mut ticker).await;
        let final_commit = self.commit_pending().await;

        match (outcome, final_commit) {
            (Err(e), commit) => {
                if let Err(commit_err) = commit {
                    tracing::warn!(
                        processor = %self.name,
                        partition = %self.partition,
                        error = %commit_err,
                        "final commit after failure did not succeed"
                    );
                }
                tracing::error!(
                    processor = %self.name,
                    partition = %self.partition,
                    error = %e,
                    "partition failed"
                );
                Err(e)
            }
            (Ok(()), Err(e)) => {
                tracing::error!(
                    processor = %self.name,
                    partition = %self.partition,
                    error = %e,
                    "final commit failed"
                );
                Err(e)
            }
            (Ok(()), Ok(())) => {
                tracing::info!(
                    processor = %self.name,
                    partition = %self.partition,
                    processed = self.processed,
                    "partition stopped"
                );
                Ok(PartitionReport {
                    partition: self.partition,
                    processed: self.processed,
                    committed: self.tracker.committed(),
                })
            }
        }
    }

    async fn consume(
        &mut self,
        token: &CancellationToken,
        ticker: &mut Option<Interval>,
    ) -> Result<(), PartitionError> {
        while !self.inputs.is_empty() {
            // select_all favours the first ready future, so the poll order
            // rotates past the input that delivered last.
            let count = self.inputs.len();
            let start = self.next_input % count;
            let step = {
                let (head, tail) = self.inputs.split_at_mut(start);
                let fetch = select_all(
                    tail.iter_mut()
                        .chain(head.iter_mut())
                        .map(|input| input.cursor.next()),
                );
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Step::Stop,
                    _ = tick(ticker) => Step::Tick,
                    (result, index, _) = fetch => Step::Fetched((start + index) % count, result),
                }
            };
            if let Step::Fetched(index, _) = &step {
                self.next_input = index + 1;
            }

            match step {
                Step::Stop => break,
                Step::Tick => self.commit_pending().await?,
                Step::Fetched(_, Ok(Some(raw))) => self.handle(raw).await?,
                Step::Fetched(index, Ok(None)) => {
                    let input = self.inputs.remove(index);
                    self.next_input = index;
                    tracing::info!(
                        processor = %self.name,
                        partition = %self.partition,
                        topic = %input.topic,
                        "input closed"
                    );
                }
                Step::Fetched(index, Err(source)) => {
                    return Err(PartitionError::Fetch {
                        topic: self.inputs[index].topic.clone(),
                        partition: self.partition,
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// One full cycle: decode, process, flush, bookkeeping.
    async fn handle(&mut self, raw: RawMessage) -> Result<(), PartitionError> {
        let message = self.decode(raw)?;
        let source = message.reference();
        tracing::debug!(processor = %self.name, message = %source, "processing");

        let mut sender = Sender::new(self.serdes.clone(), source.clone());
        self.processor
            .process(&message, &mut sender, &mut self.coordinator)
            .await
            .map_err(|e| PartitionError::Process {
                message: source.clone(),
                source: e,
            })?;

        if !sender.is_empty() {
            let deliveries = self
                .producer
                .send(sender.into_records())
                .await
                .map_err(|e| PartitionError::Send {
                    message: source.clone(),
                    source: e,
                })?;
            tracing::debug!(
                processor = %self.name,
                message = %source,
                records = deliveries.len(),
                "output accepted"
            );
        }
        self.processed += 1;

        match self.coordinator.policy() {
            CommitPolicy::Automatic => self.tracker.advance(&message.topic, message.offset),
            CommitPolicy::Manual => {
                for (topic, offset) in self.coordinator.take_marks() {
                    if self.input_topics.contains(&topic) {
                        self.tracker.advance(&topic, offset);
                    } else {
                        tracing::warn!(
                            processor = %self.name,
                            partition = %self.partition,
                            topic = %topic,
                            offset,
                            "ignoring commit mark for a topic this partition does not consume"
                        );
                    }
                }
                self.commit_pending().await?;
            }
        }
        Ok(())
    }

    fn decode(&self, raw: RawMessage) -> Result<IncomingMessage, PartitionError> {
        let reference = MessageRef {
            topic: raw.topic.clone(),
            partition: raw.partition,
            offset: raw.offset,
        };
        let serde = self.serdes.get(&raw.topic).ok_or_else(|| PartitionError::Decode {
            message: reference.clone(),
            source: Error::config(format!("no serde registered for topic '{}'", raw.topic)),
        })?;

        let key = match &raw.key {
            Some(bytes) => serde.key.deserialize(bytes).map_err(|e| PartitionError::Decode {
                message: reference.clone(),
                source: e.with_context("key"),
            })?,
            None => Value::Null,
        };
        let value = match &raw.value {
            Some(bytes) => serde.value.deserialize(bytes).map_err(|e| PartitionError::Decode {
                message: reference.clone(),
                source: e.with_context("value"),
            })?,
            None => Value::Null,
        };

        Ok(IncomingMessage {
            topic: raw.topic,
            partition: raw.partition,
            offset: raw.offset,
            key,
            value,
            timestamp_ms: raw.timestamp_ms,
        })
    }

    async fn commit_pending(&mut self) -> Result<(), PartitionError> {
        for (topic, next_offset) in self.tracker.pending() {
            self.consumer
                .commit(&self.group, &topic, self.partition, next_offset)
                .await
                .map_err(|source| PartitionError::Commit {
                    topic: topic.clone(),
                    partition: self.partition,
                    offset: next_offset,
                    source,
                })?;
            tracing::debug!(
                processor = %self.name,
                topic = %topic,
                partition = %self.partition,
                offset = next_offset,
                "committed"
            );
            self.tracker.record_commit(topic, next_offset);
        }
        Ok(())
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
