use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;

use tributary_api::{Error, Store};

use crate::query::QueryBuilder;
use crate::session::Session;

fn default_max_select_keys() -> usize {
    100
}

fn default_max_batch_size() -> usize {
    500
}

/// Backend statement limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ColumnStoreConfig {
    /// Keys per select statement in `get_all`.
    #[serde(default = "default_max_select_keys")]
    pub max_select_keys: usize,
    /// Statements per batched write in `put_all`.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for ColumnStoreConfig {
    fn default() -> Self {
        Self {
            max_select_keys: default_max_select_keys(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

/// Store over a column-store session, with chunked bulk operations.
///
/// `put_all` is atomic per chunk only: when a chunk fails its error is
/// returned and the chunks already written stay written.
pub struct ColumnStore<S, Q> {
    session: S,
    queries: Q,
    config: ColumnStoreConfig,
}

impl<S: Session, Q: QueryBuilder> ColumnStore<S, Q> {
    pub fn new(session: S, queries: Q) -> Self {
        Self::with_config(session, queries, ColumnStoreConfig::default())
    }

    pub fn with_config(session: S, queries: Q, config: ColumnStoreConfig) -> Self {
        Self {
            session,
            queries,
            config,
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn queries(&self) -> &Q {
        &self.queries
    }

    pub fn config(&self) -> ColumnStoreConfig {
        self.config
    }
}

impl<S: Session, Q: QueryBuilder> Store for ColumnStore<S, Q> {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let statement = self.queries.select(&[key.to_string()]);
            let rows = self
                .session
                .query(&statement)
                .await
                .map_err(|e| e.with_context(format!("get '{key}'")))?;
            Ok(rows.into_iter().find(|row| row.key == key).map(|row| row.value))
        })
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        value: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
        Box::pin(async move {
            let statement = self.queries.insert(key, value);
            self.session
                .execute(&statement)
                .await
                .map_err(|e| e.with_context(format!("put '{key}'")))
        })
    }

    fn delete<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
        Box::pin(async move {
            let statement = self.queries.delete(key);
            self.session
                .execute(&statement)
                .await
                .map_err(|e| e.with_context(format!("delete '{key}'")))
        })
    }

    fn get_all<'a>(
        &'a self,
        keys: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<HashMap<String, Vec<u8>>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let mut found = HashMap::new();
            let chunk_size = self.config.max_select_keys.max(1);
            for (index, chunk) in keys.chunks(chunk_size).enumerate() {
                let statement = self.queries.select(chunk);
                let rows = self
                    .session
                    .query(&statement)
                    .await
                    .map_err(|e| e.with_context(format!("get_all chunk {index}")))?;
                tracing::debug!(chunk = index, keys = chunk.len(), rows = rows.len(), "get_all chunk");
                for row in rows {
                    found.insert(row.key, row.value);
                }
            }
            Ok(found)
        })
    }

    fn put_all<'a>(
        &'a self,
        entries: &'a HashMap<String, Vec<u8>>,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
        Box::pin(async move {
            let mut sorted: Vec<(&String, &Vec<u8>)> = entries.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));

            let chunk_size = self.config.max_batch_size.max(1);
            for (index, chunk) in sorted.chunks(chunk_size).enumerate() {
                let statements: Vec<_> = chunk
                    .iter()
                    .map(|(key, value)| self.queries.insert(key, value))
                    .collect();
                self.session
                    .batch(&statements)
                    .await
                    .map_err(|e| e.with_context(format!("put_all chunk {index}")))?;
                tracing::debug!(chunk = index, entries = chunk.len(), "put_all chunk");
            }
            Ok(())
        })
    }
}
