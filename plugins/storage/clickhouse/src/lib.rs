pub mod clickhouse;
pub mod query;
pub mod session;
pub mod store;

pub use clickhouse::{ClickHouseConfig, ClickHouseQueries, ClickHouseSession, ClickHouseStore, open};
pub use query::{Binding, QueryBuilder, Statement, placeholders};
pub use session::{Row, Session};
pub use store::{ColumnStore, ColumnStoreConfig};
