use std::future::Future;
use std::pin::Pin;

use base64::Engine;
use serde::Deserialize;

use tributary_api::Error;

use crate::query::{Binding, QueryBuilder, Statement, placeholders};
use crate::session::{Row, Session};
use crate::store::{ColumnStore, ColumnStoreConfig};

const SQL_CREATE: &str = include_str!("../sql/create_kv.sql");

/// Store over a ClickHouse key/value table.
pub type ClickHouseStore = ColumnStore<ClickHouseSession, ClickHouseQueries>;

/// Escape a string value for safe use inside a ClickHouse single-quoted literal.
fn escape_ch_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

fn literal(binding: &Binding) -> String {
    match binding {
        Binding::Text(text) => format!("'{}'", escape_ch_string(text)),
        Binding::Blob(bytes) => format!(
            "base64Decode('{}')",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        ),
    }
}

/// Substitute each `?` outside a quoted literal with the next binding.
pub(crate) fn render(statement: &Statement) -> Result<String, Error> {
    let mut out = String::with_capacity(statement.text.len() + statement.bindings.len() * 16);
    let mut bindings = statement.bindings.iter();
    let mut quoted = false;
    let mut escaped = false;

    for c in statement.text.chars() {
        if quoted {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '\'' {
                quoted = false;
            }
            continue;
        }
        match c {
            '\'' => {
                quoted = true;
                out.push(c);
            }
            '?' => {
                let binding = bindings.next().ok_or_else(|| {
                    Error::logic(format!("statement has more placeholders than bindings: {}", statement.text))
                })?;
                out.push_str(&literal(binding));
            }
            _ => out.push(c),
        }
    }

    if bindings.next().is_some() {
        return Err(Error::logic(format!(
            "statement has more bindings than placeholders: {}",
            statement.text
        )));
    }
    Ok(out)
}

/// Merge single-row INSERTs that share one `INSERT ... VALUES` prefix into
/// a multi-row INSERT. `None` when the statements cannot be merged.
pub(crate) fn coalesce_inserts(statements: &[Statement]) -> Result<Option<String>, Error> {
    let Some(first) = statements.first() else {
        return Ok(None);
    };
    let Some((prefix, _)) = first.text.split_once(" VALUES ") else {
        return Ok(None);
    };
    if !prefix.trim_start().to_ascii_uppercase().starts_with("INSERT") || prefix.contains('?') {
        return Ok(None);
    }
    if statements.iter().any(|s| s.text != first.text) {
        return Ok(None);
    }

    let mut rows = Vec::with_capacity(statements.len());
    for statement in statements {
        let rendered = render(statement)?;
        match rendered.split_once(" VALUES ") {
            Some((_, row)) => rows.push(row.to_string()),
            None => return Ok(None),
        }
    }
    Ok(Some(format!("{prefix} VALUES {}", rows.join(", "))))
}

fn default_url() -> String {
    "http://localhost:8123".into()
}
fn default_user() -> String {
    "default".into()
}
fn default_database() -> String {
    "default".into()
}
fn default_table() -> String {
    "tributary_kv".into()
}

/// Connection settings of a ClickHouse store.
#[derive(Debug, Clone, Deserialize)]
pub struct ClickHouseConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(flatten)]
    pub limits: ColumnStoreConfig,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            user: default_user(),
            password: String::new(),
            database: default_database(),
            table: default_table(),
            accept_invalid_certs: false,
            limits: ColumnStoreConfig::default(),
        }
    }
}

/// ClickHouse session over the HTTP interface.
///
/// Bindings are rendered client-side as escaped literals. Select
/// statements are sent with `FORMAT JSONEachRow` and must return `value`
/// base64-encoded.
#[derive(Debug, Clone)]
pub struct ClickHouseSession {
    http: reqwest::Client,
    url: String,
    user: String,
    password: String,
    database: String,
}

impl ClickHouseSession {
    pub fn new(config: &ClickHouseConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| Error::config(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: config.url.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            database: config.database.clone(),
        })
    }

    async fn exec(&self, sql: String) -> Result<String, Error> {
        tracing::trace!(sql = %sql, "clickhouse request");
        let resp = self
            .http
            .post(&self.url)
            .query(&[
                ("user", self.user.as_str()),
                ("password", self.password.as_str()),
                ("database", self.database.as_str()),
            ])
            .body(sql)
            .send()
            .await
            .map_err(|e| Error::io(format!("CH request: {e}")))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::io(format!("CH read: {e}")))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(Error::io(format!("CH status {status}: {}", body.trim())))
        }
    }
}

#[derive(Deserialize)]
struct ChRow {
    key: String,
    value: String,
}

fn parse_rows(body: &str) -> Result<Vec<Row>, Error> {
    let mut rows = Vec::new();
    for line in body.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let row: ChRow =
            serde_json::from_str(line).map_err(|e| Error::format(format!("parse CH row: {e}")))?;
        let value = base64::engine::general_purpose::STANDARD
            .decode(&row.value)
            .map_err(|e| Error::format(format!("base64 decode of '{}': {e}", row.key)))?;
        rows.push(Row { key: row.key, value });
    }
    Ok(rows)
}

impl Session for ClickHouseSession {
    fn query<'a>(
        &'a self,
        statement: &'a Statement,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Row>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let sql = format!("{} FORMAT JSONEachRow", render(statement)?);
            let body = self.exec(sql).await?;
            parse_rows(&body)
        })
    }

    fn execute<'a>(
        &'a self,
        statement: &'a Statement,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
        Box::pin(async move {
            self.exec(render(statement)?).await?;
            Ok(())
        })
    }

    /// One multi-row INSERT when the statements allow it (one block,
    /// applied atomically). Anything else runs statement by statement.
    fn batch<'a>(
        &'a self,
        statements: &'a [Statement],
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
        Box::pin(async move {
            if statements.is_empty() {
                return Ok(());
            }
            if let Some(sql) = coalesce_inserts(statements)? {
                self.exec(sql).await?;
                return Ok(());
            }
            tracing::debug!(statements = statements.len(), "batch is not a single-table insert, running sequentially");
            for statement in statements {
                self.exec(render(statement)?).await?;
            }
            Ok(())
        })
    }
}

/// Statements over a `ReplacingMergeTree` key/value table.
///
/// Columns: key (sorting key), value (raw bytes), ts (version).
#[derive(Debug, Clone)]
pub struct ClickHouseQueries {
    table: String,
}

impl ClickHouseQueries {
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into() }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn create_table(&self) -> Statement {
        Statement::new(SQL_CREATE.replace("{table}", &self.table), Vec::new())
    }
}

impl QueryBuilder for ClickHouseQueries {
    fn select(&self, keys: &[String]) -> Statement {
        Statement::new(
            format!(
                "SELECT key, base64Encode(value) AS value FROM {} FINAL WHERE key IN ({})",
                self.table,
                placeholders(keys.len())
            ),
            keys.iter().cloned().map(Binding::Text).collect(),
        )
    }

    fn insert(&self, key: &str, value: &[u8]) -> Statement {
        Statement::new(
            format!("INSERT INTO {} (key, value) VALUES (?, ?)", self.table),
            vec![Binding::Text(key.to_string()), Binding::Blob(value.to_vec())],
        )
    }

    fn delete(&self, key: &str) -> Statement {
        Statement::new(
            format!("DELETE FROM {} WHERE key = ?", self.table),
            vec![Binding::Text(key.to_string())],
        )
    }
}

/// Connect, create the table if needed and wrap it in a store.
pub async fn open(config: &ClickHouseConfig) -> Result<ClickHouseStore, Error> {
    let session = ClickHouseSession::new(config)?;
    let queries = ClickHouseQueries::new(config.table.clone());
    session
        .execute(&queries.create_table())
        .await
        .map_err(|e| e.with_context(format!("create table '{}'", config.table)))?;
    tracing::info!(table = %config.table, database = %config.database, "clickhouse store ready");
    Ok(ColumnStore::with_config(session, queries, config.limits))
}
