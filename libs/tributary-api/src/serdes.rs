use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::error::Error;
use crate::message::Topic;

/// Bidirectional mapping between a decoded value and its wire bytes.
pub trait Serde: Send + Sync {
    fn serialize(&self, value: &Value) -> Result<Vec<u8>, Error>;
    fn deserialize(&self, bytes: &[u8]) -> Result<Value, Error>;
}

/// Key and value serdes registered for one topic.
#[derive(Clone)]
pub struct TopicSerde {
    pub key: Arc<dyn Serde>,
    pub value: Arc<dyn Serde>,
}

impl TopicSerde {
    pub fn new(key: Arc<dyn Serde>, value: Arc<dyn Serde>) -> Self {
        Self { key, value }
    }

    /// String keys and string values.
    pub fn strings() -> Self {
        Self::new(Arc::new(StringSerde), Arc::new(StringSerde))
    }
}

impl std::fmt::Debug for TopicSerde {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicSerde").finish_non_exhaustive()
    }
}

pub type TopicSerdes = HashMap<Topic, TopicSerde>;

/// UTF-8 text. Only `Value::String` can be serialized.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerde;

impl Serde for StringSerde {
    fn serialize(&self, value: &Value) -> Result<Vec<u8>, Error> {
        match value {
            Value::String(s) => Ok(s.as_bytes().to_vec()),
            other => Err(Error::format(format!("string serde cannot encode {other}"))),
        }
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value, Error> {
        Ok(Value::String(std::str::from_utf8(bytes)?.to_string()))
    }
}

/// JSON documents of any shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerde;

impl Serde for JsonSerde {
    fn serialize(&self, value: &Value) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(value)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value, Error> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Signed 64-bit integers, 8 bytes big-endian.
#[derive(Debug, Clone, Copy, Default)]
pub struct Int64Serde;

impl Serde for Int64Serde {
    fn serialize(&self, value: &Value) -> Result<Vec<u8>, Error> {
        value
            .as_i64()
            .map(|n| n.to_be_bytes().to_vec())
            .ok_or_else(|| Error::format(format!("int64 serde cannot encode {value}")))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value, Error> {
        let buf: [u8; 8] = bytes
            .try_into()
            .map_err(|_| Error::format(format!("int64 serde expects 8 bytes, got {}", bytes.len())))?;
        Ok(Value::from(i64::from_be_bytes(buf)))
    }
}

/// Serde name as written in settings files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerdeKind {
    String,
    Json,
    Int64,
}

impl SerdeKind {
    pub fn build(self) -> Arc<dyn Serde> {
        match self {
            SerdeKind::String => Arc::new(StringSerde),
            SerdeKind::Json => Arc::new(JsonSerde),
            SerdeKind::Int64 => Arc::new(Int64Serde),
        }
    }
}
