use std::future::Future;
use std::pin::Pin;

use tributary_api::Error;

use crate::query::Statement;

/// One key/value row returned by a select statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub key: String,
    pub value: Vec<u8>,
}

/// Connection to the column-store backend, shared by every partition.
pub trait Session: Send + Sync {
    fn query<'a>(
        &'a self,
        statement: &'a Statement,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Row>, Error>> + Send + 'a>>;

    fn execute<'a>(
        &'a self,
        statement: &'a Statement,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;

    /// Apply `statements` as one batched write. A failed batch applies nothing.
    fn batch<'a>(
        &'a self,
        statements: &'a [Statement],
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;
}
