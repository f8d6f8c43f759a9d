use std::collections::HashMap;
use std::future::Future;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Notify;

use tributary_api::{
    Consumer, Delivery, Error, FetchCursor, Offset, Partition, Producer, ProducerRecord,
    RawMessage, StartOffset, Topic,
};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn read_lock<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("{what} read lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn write_lock<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("{what} write lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

#[derive(Debug, Clone)]
struct StoredRecord {
    key: Option<Vec<u8>>,
    value: Option<Vec<u8>>,
    timestamp_ms: i64,
}

/// One append-only partition log with a wake-up signal for waiting cursors.
#[derive(Debug, Default)]
struct PartitionLog {
    records: RwLock<Vec<StoredRecord>>,
    notify: Notify,
    closed: AtomicBool,
}

impl PartitionLog {
    fn len(&self) -> Offset {
        read_lock(&self.records, "partition log").len() as Offset
    }

    fn append(&self, record: StoredRecord) -> Offset {
        let offset = {
            let mut records = write_lock(&self.records, "partition log");
            records.push(record);
            records.len() as Offset - 1
        };
        self.notify.notify_waiters();
        offset
    }

    fn read(&self, topic: &Topic, partition: Partition, offset: Offset) -> Option<RawMessage> {
        let index = usize::try_from(offset).ok()?;
        let records = read_lock(&self.records, "partition log");
        records.get(index).map(|r| RawMessage {
            topic: topic.clone(),
            partition,
            offset,
            key: r.key.clone(),
            value: r.value.clone(),
            timestamp_ms: Some(r.timestamp_ms),
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// In-process broker: partitioned logs, consumer-group offsets and a
/// producer, behind the same traits a networked broker client implements.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    topics: RwLock<HashMap<Topic, Vec<Arc<PartitionLog>>>>,
    offsets: RwLock<HashMap<(String, Topic, Partition), Offset>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `topic` with `partitions` empty logs. Existing topics are kept.
    pub fn create_topic(&self, topic: impl Into<Topic>, partitions: i32) {
        let topic = topic.into();
        let mut topics = write_lock(&self.topics, "broker topics");
        topics.entry(topic).or_insert_with(|| {
            (0..partitions.max(0))
                .map(|_| Arc::new(PartitionLog::default()))
                .collect()
        });
    }

    fn log(&self, topic: &Topic, partition: Partition) -> Result<Arc<PartitionLog>, Error> {
        let topics = read_lock(&self.topics, "broker topics");
        let logs = topics
            .get(topic)
            .ok_or_else(|| Error::io(format!("unknown topic '{topic}'")))?;
        usize::try_from(partition.0)
            .ok()
            .and_then(|i| logs.get(i))
            .cloned()
            .ok_or_else(|| Error::io(format!("topic '{topic}' has no partition {partition}")))
    }

    /// Append one message and return its offset.
    pub fn append(
        &self,
        topic: &Topic,
        partition: Partition,
        key: Option<Vec<u8>>,
        value: Option<Vec<u8>>,
    ) -> Result<Offset, Error> {
        let log = self.log(topic, partition)?;
        Ok(log.append(StoredRecord {
            key,
            value,
            timestamp_ms: now_ms(),
        }))
    }

    /// Every message of one partition, in offset order.
    pub fn records(&self, topic: &Topic, partition: Partition) -> Result<Vec<RawMessage>, Error> {
        let log = self.log(topic, partition)?;
        Ok((0..log.len())
            .filter_map(|offset| log.read(topic, partition, offset))
            .collect())
    }

    /// Committed next-offset for (group, topic, partition).
    pub fn committed(&self, group: &str, topic: &Topic, partition: Partition) -> Option<Offset> {
        read_lock(&self.offsets, "broker offsets")
            .get(&(group.to_string(), topic.clone(), partition))
            .copied()
    }

    /// Close every log: waiting cursors return `None`.
    pub fn close(&self) {
        let topics = read_lock(&self.topics, "broker topics");
        for log in topics.values().flatten() {
            log.close();
        }
    }

    fn partition_for_key(&self, topic: &Topic, key: &[u8]) -> Result<Partition, Error> {
        let count = read_lock(&self.topics, "broker topics")
            .get(topic)
            .map(|logs| logs.len())
            .ok_or_else(|| Error::io(format!("unknown topic '{topic}'")))?;
        if count == 0 {
            return Err(Error::io(format!("topic '{topic}' has no partitions")));
        }
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        Ok(Partition((hasher.finish() % count as u64) as i32))
    }
}

impl Consumer for MemoryBroker {
    fn partitions<'a>(
        &'a self,
        topic: &'a Topic,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Partition>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let topics = read_lock(&self.topics, "broker topics");
            let logs = topics
                .get(topic)
                .ok_or_else(|| Error::io(format!("unknown topic '{topic}'")))?;
            Ok((0..logs.len() as i32).map(Partition).collect())
        })
    }

    fn committed_offset<'a>(
        &'a self,
        group: &'a str,
        topic: &'a Topic,
        partition: Partition,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Offset>, Error>> + Send + 'a>> {
        Box::pin(async move { Ok(self.committed(group, topic, partition)) })
    }

    fn open<'a>(
        &'a self,
        topic: &'a Topic,
        partition: Partition,
        start: StartOffset,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn FetchCursor>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let log = self.log(topic, partition)?;
            let offset = match start {
                StartOffset::Earliest => 0,
                StartOffset::Latest => log.len(),
                StartOffset::At(offset) => offset.max(0),
            };
            Ok(Box::new(MemoryCursor {
                topic: topic.clone(),
                partition,
                log,
                offset,
            }) as Box<dyn FetchCursor>)
        })
    }

    fn commit<'a>(
        &'a self,
        group: &'a str,
        topic: &'a Topic,
        partition: Partition,
        next_offset: Offset,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
        Box::pin(async move {
            self.log(topic, partition)?;
            write_lock(&self.offsets, "broker offsets")
                .insert((group.to_string(), topic.clone(), partition), next_offset);
            Ok(())
        })
    }
}

impl Producer for MemoryBroker {
    fn send(
        &self,
        records: Vec<ProducerRecord>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Delivery>, Error>> + Send + '_>> {
        Box::pin(async move {
            // Resolve every target first so a bad record rejects the whole batch.
            let mut targets = Vec::with_capacity(records.len());
            for record in &records {
                let partition = match record.partition {
                    Some(p) => p,
                    None => self.partition_for_key(&record.topic, &record.key)?,
                };
                targets.push((partition, self.log(&record.topic, partition)?));
            }

            let mut deliveries = Vec::with_capacity(records.len());
            for (record, (partition, log)) in records.into_iter().zip(targets) {
                let offset = log.append(StoredRecord {
                    key: Some(record.key),
                    value: Some(record.value),
                    timestamp_ms: now_ms(),
                });
                deliveries.push(Delivery {
                    topic: record.topic,
                    partition,
                    offset,
                    metadata: record.metadata,
                });
            }
            Ok(deliveries)
        })
    }
}

struct MemoryCursor {
    topic: Topic,
    partition: Partition,
    log: Arc<PartitionLog>,
    offset: Offset,
}

impl FetchCursor for MemoryCursor {
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<RawMessage>, Error>> + Send + '_>> {
        Box::pin(async move {
            loop {
                // Register for wake-ups before checking, so an append between
                // the check and the await is not missed.
                let notified = self.log.notify.notified();
                if let Some(message) = self.log.read(&self.topic, self.partition, self.offset) {
                    self.offset += 1;
                    return Ok(Some(message));
                }
                if self.log.is_closed() {
                    return Ok(None);
                }
                notified.await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tributary_api::MessageRef;

    fn source() -> MessageRef {
        MessageRef {
            topic: Topic::from("in"),
            partition: Partition(0),
            offset: 0,
        }
    }

    fn record(topic: &str, partition: Option<i32>, key: &[u8]) -> ProducerRecord {
        ProducerRecord {
            topic: Topic::from(topic),
            partition: partition.map(Partition),
            key: key.to_vec(),
            value: b"v".to_vec(),
            metadata: source(),
        }
    }

    #[tokio::test]
    async fn cursor_reads_in_offset_order() {
        let broker = MemoryBroker::new();
        broker.create_topic("hello", 1);
        let topic = Topic::from("hello");
        for i in 0..3u8 {
            broker.append(&topic, Partition(0), None, Some(vec![i])).unwrap();
        }

        let mut cursor = broker.open(&topic, Partition(0), StartOffset::At(1)).await.unwrap();
        let first = cursor.next().await.unwrap().unwrap();
        let second = cursor.next().await.unwrap().unwrap();
        assert_eq!((first.offset, first.value), (1, Some(vec![1])));
        assert_eq!((second.offset, second.value), (2, Some(vec![2])));
    }

    #[tokio::test]
    async fn cursor_waits_for_append() {
        let broker = Arc::new(MemoryBroker::new());
        broker.create_topic("hello", 1);
        let topic = Topic::from("hello");
        let mut cursor = broker.open(&topic, Partition(0), StartOffset::Latest).await.unwrap();

        let writer = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer
                .append(&Topic::from("hello"), Partition(0), Some(b"k".to_vec()), Some(b"v".to_vec()))
                .unwrap();
        });

        let message = tokio::time::timeout(Duration::from_secs(5), cursor.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(message.offset, 0);
        assert_eq!(message.key, Some(b"k".to_vec()));
    }

    #[tokio::test]
    async fn dropped_fetch_loses_nothing() {
        let broker = MemoryBroker::new();
        broker.create_topic("hello", 1);
        let topic = Topic::from("hello");
        let mut cursor = broker.open(&topic, Partition(0), StartOffset::Earliest).await.unwrap();

        let timed_out = tokio::time::timeout(Duration::from_millis(10), cursor.next()).await;
        assert!(timed_out.is_err());

        broker.append(&topic, Partition(0), None, Some(b"x".to_vec())).unwrap();
        let message = cursor.next().await.unwrap().unwrap();
        assert_eq!(message.offset, 0);
    }

    #[tokio::test]
    async fn close_ends_cursors() {
        let broker = MemoryBroker::new();
        broker.create_topic("hello", 1);
        let mut cursor = broker
            .open(&Topic::from("hello"), Partition(0), StartOffset::Earliest)
            .await
            .unwrap();
        broker.close();
        assert!(cursor.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn send_assigns_offsets_and_keeps_metadata() {
        let broker = MemoryBroker::new();
        broker.create_topic("out", 2);
        let deliveries = broker
            .send(vec![record("out", Some(1), b"a"), record("out", Some(1), b"b")])
            .await
            .unwrap();
        assert_eq!(deliveries.len(), 2);
        assert_eq!((deliveries[0].partition, deliveries[0].offset), (Partition(1), 0));
        assert_eq!((deliveries[1].partition, deliveries[1].offset), (Partition(1), 1));
        assert_eq!(deliveries[1].metadata, source());
    }

    #[tokio::test]
    async fn send_without_partition_is_stable_per_key() {
        let broker = MemoryBroker::new();
        broker.create_topic("out", 4);
        let first = broker.send(vec![record("out", None, b"falkor")]).await.unwrap();
        let second = broker.send(vec![record("out", None, b"falkor")]).await.unwrap();
        assert_eq!(first[0].partition, second[0].partition);
        assert_eq!(second[0].offset, 1);
    }

    #[tokio::test]
    async fn send_rejects_whole_batch_on_unknown_topic() {
        let broker = MemoryBroker::new();
        broker.create_topic("out", 1);
        let err = broker
            .send(vec![record("out", Some(0), b"a"), record("missing", Some(0), b"b")])
            .await
            .unwrap_err();
        assert!(err.message().contains("missing"));
        assert!(broker.records(&Topic::from("out"), Partition(0)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_and_read_back() {
        let broker = MemoryBroker::new();
        broker.create_topic("hello", 2);
        let topic = Topic::from("hello");
        assert_eq!(broker.committed_offset("g", &topic, Partition(1)).await.unwrap(), None);
        broker.commit("g", &topic, Partition(1), 42).await.unwrap();
        assert_eq!(broker.committed_offset("g", &topic, Partition(1)).await.unwrap(), Some(42));
        assert_eq!(broker.committed("other", &topic, Partition(1)), None);
        assert!(broker.commit("g", &topic, Partition(9), 1).await.is_err());
    }
}
