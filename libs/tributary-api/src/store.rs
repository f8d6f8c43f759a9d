use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::error::Error;

/// Keyed byte-blob store shared by all partitions of a container.
///
/// Implementations must tolerate concurrent use from every partition task.
/// The engine never caches entries: every read goes to the backend.
///
/// Contract, uniform across implementations:
/// - `get` of an absent key is `Ok(None)`.
/// - `put` is an idempotent upsert.
/// - `delete` of an absent key succeeds.
/// - `get_all` returns only the keys that exist.
/// - `put_all` is atomic per key, not necessarily across the whole call.
pub trait Store: Send + Sync {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, Error>> + Send + 'a>>;

    fn put<'a>(
        &'a self,
        key: &'a str,
        value: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;

    fn delete<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;

    fn get_all<'a>(
        &'a self,
        keys: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<HashMap<String, Vec<u8>>, Error>> + Send + 'a>>;

    fn put_all<'a>(
        &'a self,
        entries: &'a HashMap<String, Vec<u8>>,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;
}
