use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use tributary_api::{
    CommitPolicy, ContainerId, Partition, SerdeKind, StartOffset, Topic, TopicSerde, TopicSerdes,
};

use crate::error::EngineError;

/// Resume point for a (group, topic, partition) that has never committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialOffset {
    #[default]
    Earliest,
    Latest,
}

impl InitialOffset {
    pub fn start_offset(self) -> StartOffset {
        match self {
            InitialOffset::Earliest => StartOffset::Earliest,
            InitialOffset::Latest => StartOffset::Latest,
        }
    }
}

/// Immutable configuration of one topic processor.
#[derive(Debug, Clone)]
pub struct TopicProcessorConfig {
    pub name: String,
    pub brokers: Vec<String>,
    pub input_topics: Vec<Topic>,
    /// Serdes for input topics and every topic the processor sends to.
    pub topic_serdes: TopicSerdes,
    pub container_count: i32,
    /// Static partition → container map. Every partition of every input
    /// topic must appear here.
    pub partition_assignment: BTreeMap<Partition, ContainerId>,
    /// A value <= 0 disables automatic marking: offsets are committed only
    /// when processing logic marks them through the coordinator.
    pub auto_mark_offsets_interval_ms: i64,
    pub initial_offset: InitialOffset,
}

impl TopicProcessorConfig {
    /// Partitions owned by `container_id`, ascending.
    pub fn partitions_for_container(&self, container_id: ContainerId) -> Vec<Partition> {
        self.partition_assignment
            .iter()
            .filter(|(_, cid)| **cid == container_id)
            .map(|(partition, _)| *partition)
            .collect()
    }

    pub fn consumer_group(&self) -> String {
        format!("tributary-topic-processor-{}", self.name)
    }

    pub fn producer_client_id(&self, container_id: ContainerId) -> String {
        format!("tributary-topic-processor-{}-{}", self.name, container_id)
    }

    pub fn mark_offsets_automatically(&self) -> bool {
        self.auto_mark_offsets_interval_ms > 0
    }

    pub fn mark_offsets_manually(&self) -> bool {
        self.auto_mark_offsets_interval_ms <= 0
    }

    pub fn commit_policy(&self) -> CommitPolicy {
        if self.mark_offsets_automatically() {
            CommitPolicy::Automatic
        } else {
            CommitPolicy::Manual
        }
    }

    pub fn auto_mark_interval(&self) -> Option<Duration> {
        u64::try_from(self.auto_mark_offsets_interval_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Check the configuration before any partition unit is started.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Config("processor name must not be empty".into()));
        }
        if self.input_topics.is_empty() {
            return Err(EngineError::Config(format!(
                "processor '{}': no input topics",
                self.name
            )));
        }
        for topic in &self.input_topics {
            if !self.topic_serdes.contains_key(topic) {
                return Err(EngineError::Config(format!(
                    "processor '{}': no serde registered for input topic '{topic}'",
                    self.name
                )));
            }
        }
        if self.container_count <= 0 {
            return Err(EngineError::Config(format!(
                "processor '{}': container_count must be positive, got {}",
                self.name, self.container_count
            )));
        }
        for (partition, cid) in &self.partition_assignment {
            if cid.0 < 0 || cid.0 >= self.container_count {
                return Err(EngineError::Config(format!(
                    "processor '{}': partition {partition} assigned to container {cid}, \
                     but container_count is {}",
                    self.name, self.container_count
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Settings file
// ---------------------------------------------------------------------------

/// Topic processor settings, parsed from TOML.
///
/// ```toml
/// name = "hello-world"
/// brokers = ["localhost:9092"]
/// input_topics = ["hello"]
/// container_count = 1
/// auto_mark_offsets_interval_ms = 5000
///
/// [partition_assignment]
/// "0" = 0
///
/// [[topics]]
/// name = "hello"
/// key = "string"
/// value = "json"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct TopicProcessorSettings {
    pub name: String,

    #[serde(default)]
    pub brokers: Vec<String>,

    pub input_topics: Vec<String>,

    /// Serde registrations.
    #[serde(default)]
    pub topics: Vec<TopicSerdeSettings>,

    #[serde(default = "default_container_count")]
    pub container_count: i32,

    /// Partition (as a string key) → container id.
    #[serde(default)]
    pub partition_assignment: BTreeMap<String, i32>,

    #[serde(default)]
    pub auto_mark_offsets_interval_ms: i64,

    #[serde(default)]
    pub initial_offset: InitialOffset,
}

fn default_container_count() -> i32 {
    1
}

fn default_serde_kind() -> SerdeKind {
    SerdeKind::String
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicSerdeSettings {
    pub name: String,
    #[serde(default = "default_serde_kind")]
    pub key: SerdeKind,
    #[serde(default = "default_serde_kind")]
    pub value: SerdeKind,
}

impl TopicProcessorSettings {
    /// Load settings from a TOML file.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::Config(format!("{path}: {e}")))?;
        Self::parse(&content)
    }

    /// Parse settings from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Resolve serde names and partition keys, then validate.
    pub fn into_config(self) -> Result<TopicProcessorConfig, EngineError> {
        let mut partition_assignment = BTreeMap::new();
        for (key, cid) in &self.partition_assignment {
            let partition: i32 = key.trim().parse().map_err(|_| {
                EngineError::Config(format!("partition_assignment: '{key}' is not a partition number"))
            })?;
            partition_assignment.insert(Partition(partition), ContainerId(*cid));
        }

        let mut topic_serdes = TopicSerdes::new();
        for topic in &self.topics {
            let serde = TopicSerde::new(topic.key.build(), topic.value.build());
            if topic_serdes.insert(Topic::from(topic.name.as_str()), serde).is_some() {
                return Err(EngineError::Config(format!(
                    "topic '{}' registered more than once",
                    topic.name
                )));
            }
        }

        let config = TopicProcessorConfig {
            name: self.name,
            brokers: self.brokers,
            input_topics: self.input_topics.into_iter().map(Topic::from).collect(),
            topic_serdes,
            container_count: self.container_count,
            partition_assignment,
            auto_mark_offsets_interval_ms: self.auto_mark_offsets_interval_ms,
            initial_offset: self.initial_offset,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config(assignment: &[(i32, i32)], interval_ms: i64) -> TopicProcessorConfig {
        let mut topic_serdes = TopicSerdes::new();
        topic_serdes.insert(Topic::from("hello"), TopicSerde::strings());
        TopicProcessorConfig {
            name: "test".into(),
            brokers: vec!["localhost:9092".into()],
            input_topics: vec![Topic::from("hello")],
            topic_serdes,
            container_count: 2,
            partition_assignment: assignment
                .iter()
                .map(|(p, c)| (Partition(*p), ContainerId(*c)))
                .collect(),
            auto_mark_offsets_interval_ms: interval_ms,
            initial_offset: InitialOffset::Earliest,
        }
    }

    #[test]
    fn partitions_for_container_filters_assignment() {
        let cfg = config(&[(0, 0), (1, 1), (2, 0), (3, 1)], 0);
        assert_eq!(cfg.partitions_for_container(ContainerId(0)), vec![Partition(0), Partition(2)]);
        assert_eq!(cfg.partitions_for_container(ContainerId(1)), vec![Partition(1), Partition(3)]);
    }

    #[test]
    fn container_without_partitions_owns_nothing() {
        let cfg = config(&[(0, 0)], 0);
        assert!(cfg.partitions_for_container(ContainerId(1)).is_empty());
    }

    #[test]
    fn zero_interval_means_manual_marking() {
        let cfg = config(&[(0, 0)], 0);
        assert!(cfg.mark_offsets_manually());
        assert!(!cfg.mark_offsets_automatically());
        assert_eq!(cfg.commit_policy(), CommitPolicy::Manual);
        assert_eq!(cfg.auto_mark_interval(), None);

        let negative = config(&[(0, 0)], -5);
        assert!(negative.mark_offsets_manually());
    }

    #[test]
    fn positive_interval_means_automatic_marking() {
        let cfg = config(&[(0, 0)], 5000);
        assert!(cfg.mark_offsets_automatically());
        assert!(!cfg.mark_offsets_manually());
        assert_eq!(cfg.auto_mark_interval(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn derived_client_names() {
        let cfg = config(&[(0, 0)], 0);
        assert_eq!(cfg.consumer_group(), "tributary-topic-processor-test");
        assert_eq!(cfg.producer_client_id(ContainerId(3)), "tributary-topic-processor-test-3");
    }

    #[test]
    fn validate_rejects_out_of_range_container() {
        let cfg = config(&[(0, 0), (1, 2)], 0);
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn validate_rejects_input_topic_without_serde() {
        let mut cfg = config(&[(0, 0)], 0);
        cfg.input_topics.push(Topic::from("unregistered"));
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("unregistered"));
    }

    #[test]
    fn validate_rejects_empty_name() {
        let mut cfg = config(&[(0, 0)], 0);
        cfg.name = " ".into();
        assert!(cfg.validate().is_err());
    }

    const SETTINGS: &str = r#"
        name = "hello-world"
        brokers = ["localhost:9092"]
        input_topics = ["hello"]
        container_count = 2
        auto_mark_offsets_interval_ms = 5000
        initial_offset = "latest"

        [partition_assignment]
        "0" = 0
        "1" = 1

        [[topics]]
        name = "hello"
        value = "json"
    "#;

    #[test]
    fn settings_into_config() {
        let cfg = TopicProcessorSettings::parse(SETTINGS).unwrap().into_config().unwrap();
        assert_eq!(cfg.name, "hello-world");
        assert_eq!(cfg.input_topics, vec![Topic::from("hello")]);
        assert_eq!(cfg.partition_assignment.get(&Partition(1)), Some(&ContainerId(1)));
        assert_eq!(cfg.initial_offset, InitialOffset::Latest);
        assert!(cfg.mark_offsets_automatically());

        let serde = cfg.topic_serdes.get("hello").unwrap();
        let bytes = serde.value.serialize(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(bytes, br#"{"a":1}"#);
    }

    #[test]
    fn settings_reject_bad_partition_key() {
        let raw = SETTINGS.replace("\"1\" = 1", "\"one\" = 1");
        let err = TopicProcessorSettings::parse(&raw).unwrap().into_config().unwrap_err();
        assert!(err.to_string().contains("'one'"));
    }

    #[test]
    fn settings_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SETTINGS.as_bytes()).unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let settings = TopicProcessorSettings::load(&path).unwrap();
        assert_eq!(settings.container_count, 2);
        assert_eq!(settings.topics[0].key, SerdeKind::String);
    }

    #[test]
    fn missing_settings_file_is_config_error() {
        let err = TopicProcessorSettings::load("/nonexistent/tributary.toml").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
