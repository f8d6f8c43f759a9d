use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use tributary_api::{Coordinator, Error, IncomingMessage, MessageProcessor, Sender, Store};

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Store key holding the number of messages seen on one partition.
pub fn count_key(message: &IncomingMessage) -> String {
    format!("count:{}:{}", message.topic, message.partition)
}

/// Logs every message and counts messages per partition in the store.
pub struct HelloWorldProcessor {
    store: Arc<dyn Store>,
}

impl HelloWorldProcessor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl MessageProcessor for HelloWorldProcessor {
    fn process<'a>(
        &'a mut self,
        message: &'a IncomingMessage,
        _sender: &'a mut Sender,
        coordinator: &'a mut Coordinator,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!(
                key = %text(&message.key),
                value = %text(&message.value),
                offset = message.offset,
                topic = %message.topic,
                partition = %message.partition,
                "got message"
            );

            let key = count_key(message);
            let count = match self.store.get(&key).await? {
                Some(bytes) => String::from_utf8(bytes)?
                    .parse::<u64>()
                    .map_err(|e| Error::format(format!("counter '{key}': {e}")))?,
                None => 0,
            };
            let next = (count + 1).to_string();
            self.store.put(&key, next.as_bytes()).await?;

            // No-op when offsets are marked automatically.
            coordinator.commit(message);
            Ok(())
        })
    }
}
