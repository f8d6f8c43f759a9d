mod processor;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;

use tributary_api::{
    Consumer, ContainerId, MessageProcessor, Partition, ProcessorFactory, Producer, Store,
    StartOffset, Topic,
};
use tributary_engine::{
    EngineError, InitialOffset, MemoryBroker, TopicProcessor, TopicProcessorConfig,
    TopicProcessorSettings, TopicSerdeSettings,
};
use tributary_store_memory::MemoryStore;

use crate::processor::HelloWorldProcessor;

#[derive(Parser)]
#[command(name = "tributary-hello-world", about = "Hello-world topic processor over an in-process broker")]
struct Cli {
    /// Path to TOML settings. Built-in hello-world settings when absent.
    #[arg(long, env = "TRIBUTARY_CONFIG")]
    config: Option<String>,

    /// Container this process runs as.
    #[arg(long, default_value_t = 0, env = "TRIBUTARY_CONTAINER_ID")]
    container_id: i32,

    /// Messages appended to every input topic before starting.
    #[arg(long, default_value_t = 5)]
    seed: usize,
}

fn default_settings() -> TopicProcessorSettings {
    TopicProcessorSettings {
        name: "hello-world".into(),
        brokers: vec!["localhost:9092".into()],
        input_topics: vec!["hello".into()],
        topics: vec![TopicSerdeSettings {
            name: "hello".into(),
            key: tributary_api::SerdeKind::String,
            value: tributary_api::SerdeKind::String,
        }],
        container_count: 1,
        partition_assignment: BTreeMap::from([("0".to_string(), 0)]),
        auto_mark_offsets_interval_ms: 5000,
        initial_offset: InitialOffset::Earliest,
    }
}

fn load_config(cli: &Cli) -> Result<TopicProcessorConfig, EngineError> {
    let settings = match &cli.config {
        Some(path) => {
            tracing::info!(config = %path, "loading settings");
            TopicProcessorSettings::load(path)?
        }
        None => default_settings(),
    };
    settings.into_config()
}

/// Create every input topic with as many partitions as the assignment
/// names, then append `count` string messages to each.
fn seed_broker(broker: &MemoryBroker, config: &TopicProcessorConfig, count: usize) -> Result<(), EngineError> {
    let partitions = config
        .partition_assignment
        .keys()
        .map(|p| p.0 + 1)
        .max()
        .unwrap_or(1);

    for topic in &config.input_topics {
        broker.create_topic(topic.clone(), partitions);
        let serde = config
            .topic_serdes
            .get(topic)
            .ok_or_else(|| EngineError::Config(format!("no serde for input topic '{topic}'")))?;
        for i in 0..count {
            let partition = Partition(i as i32 % partitions);
            let key = serde.key.serialize(&json!(format!("key-{i}")))?;
            let value = serde.value.serialize(&json!(format!("hello {i}")))?;
            broker.append(topic, partition, Some(key), Some(value))?;
        }
        tracing::info!(topic = %topic, partitions, messages = count, "seeded topic");
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let broker = Arc::new(MemoryBroker::new());
    if let Err(e) = seed_broker(&broker, &config, cli.seed) {
        tracing::error!(error = %e, "failed to seed broker");
        std::process::exit(1);
    }

    let store = Arc::new(MemoryStore::new());
    let shared: Arc<dyn Store> = store.clone();
    let factory: Arc<dyn ProcessorFactory> = Arc::new(move |_partition: Partition| -> Box<dyn MessageProcessor> {
        Box::new(HelloWorldProcessor::new(shared.clone()))
    });

    let input_topics: Vec<Topic> = config.input_topics.clone();
    let group = config.consumer_group();
    let processor = match TopicProcessor::new(
        config,
        factory,
        ContainerId(cli.container_id),
        broker.clone() as Arc<dyn Consumer>,
        broker.clone() as Arc<dyn Producer>,
    ) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "invalid topic processor config");
            std::process::exit(1);
        }
    };

    let mut handle = match processor.start().await {
        Ok(h) => h,
        Err(e) => {
            tracing::error!(error = %e, "failed to start topic processor");
            std::process::exit(1);
        }
    };
    tracing::info!(partitions = ?handle.partitions(), "running, press Ctrl+C to stop");

    let mut heartbeat = tokio::time::interval(Duration::from_secs(2));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down...");
                break;
            }
            Some(failure) = handle.next_failure() => {
                tracing::error!(partition = %failure.partition, error = %failure.error, "partition stopped");
            }
            _ = heartbeat.tick() => {
                tracing::info!(entries = store.len().await, "...");
            }
        }
    }

    for (partition, result) in handle.shutdown().await {
        match result {
            Ok(report) => tracing::info!(
                partition = %partition,
                processed = report.processed,
                committed = ?report.committed,
                "partition report"
            ),
            Err(e) => tracing::error!(partition = %partition, error = %e, "partition failed"),
        }
    }
    broker.close();

    for topic in &input_topics {
        match broker.partitions(topic).await {
            Ok(partitions) => {
                for partition in partitions {
                    let resume = broker
                        .committed(&group, topic, partition)
                        .map(StartOffset::At)
                        .unwrap_or(StartOffset::Earliest);
                    tracing::info!(topic = %topic, partition = %partition, resume = ?resume, "resume point");
                }
            }
            Err(e) => tracing::warn!(topic = %topic, error = %e, "cannot list partitions"),
        }
    }
}
