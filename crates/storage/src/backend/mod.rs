//! Cache storage traits and implementations.
//!
//! [`CacheStorage`] is the origin-wide registry of named stores (think
//! `caches` in a service worker) and [`CacheStore`] is one opened store
//! holding request/response pairs in insertion order.
//!
//! Every operation is asynchronous and takes `&self`, so a store can be
//! shared by any number of in-flight fetches. There is no locking across
//! operations: two concurrent [`put()`](CacheStore::put) calls for the same
//! key race, and the last write wins.

mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::local::LocalStorage;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockStorage;
use crate::error::Result;
use crate::models::{CachedResponse, RequestKey};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;
use std::sync::Arc;

/// Stream of stored keys, oldest insertion first.
pub type KeyStream<'a> = Pin<Box<dyn Stream<Item = Result<RequestKey>> + Send + 'a>>;

/// Shared handle to an opened store.
pub type StoreHandle = Arc<dyn CacheStore>;

/// Origin-wide registry of named cache stores.
///
/// # Examples
///
/// ```
/// use swkit_storage::{CacheStorage, RequestKey, CachedResponse, error::Result};
///
/// async fn remember(storage: &dyn CacheStorage) -> Result<()> {
///     let store = storage.open("shop-static-v1").await?;
///     let response = CachedResponse::new(200, vec![], b"body { }".to_vec());
///     store.put(&RequestKey::get("/app.css"), response).await?;
///     assert!(store.lookup(&RequestKey::get("/app.css")).await?.is_some());
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Name of the backend (used for logging only).
    fn name(&self) -> &str;

    /// Open a store, creating it if it does not exist yet.
    ///
    /// Returns [`InvalidStoreName`](crate::error::ErrorKind::InvalidStoreName)
    /// if the name fails [validation](crate::validate_store_name).
    async fn open(&self, store: &str) -> Result<StoreHandle>;

    /// Check if a store exists without creating it.
    async fn has(&self, store: &str) -> Result<bool>;

    /// Delete a store and everything in it.
    ///
    /// Returns `false` if there was no store by that name.
    async fn delete_store(&self, store: &str) -> Result<bool>;

    /// Names of every existing store, in creation order.
    async fn store_names(&self) -> Result<Vec<String>>;
}

/// One opened store of request/response pairs.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Name of the store this handle was opened for.
    fn name(&self) -> &str;

    /// Find the response stored for a request, if any.
    async fn lookup(&self, key: &RequestKey) -> Result<Option<CachedResponse>>;

    /// Store a response.
    ///
    /// Overwriting an existing key moves it to the end of the insertion
    /// order, exactly as if it had been deleted and inserted again.
    ///
    /// Returns [`QuotaExceeded`](crate::error::ErrorKind::QuotaExceeded) if
    /// the backend has run out of space; nothing is written in that case.
    async fn put(&self, key: &RequestKey, response: CachedResponse) -> Result<()>;

    /// Delete a stored response. Returns `false` if the key wasn't stored.
    async fn delete(&self, key: &RequestKey) -> Result<bool>;

    /// Stream every stored key, oldest insertion first.
    fn keys_stream(&self) -> KeyStream<'_>;

    /// Collect [`keys_stream()`](Self::keys_stream) into a [`Vec`].
    async fn keys(&self) -> Result<Vec<RequestKey>> {
        self.keys_stream().try_collect().await
    }

    /// Every stored pair, oldest insertion first.
    ///
    /// Keys that disappear between listing and reading (a concurrent delete)
    /// are skipped.
    async fn entries(&self) -> Result<Vec<(RequestKey, CachedResponse)>> {
        let mut entries = Vec::new();
        for key in self.keys().await? {
            if let Some(response) = self.lookup(&key).await? {
                entries.push((key, response));
            }
        }
        Ok(entries)
    }
}
