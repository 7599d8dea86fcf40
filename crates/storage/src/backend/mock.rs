//! In-memory cache storage for testing.

use super::{CacheStorage, CacheStore, KeyStream, StoreHandle};
use crate::error::{ErrorKind, Result};
use crate::models::{CachedResponse, RequestKey};
use crate::name::validate as validate_store_name;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock as SyncRwLock};
use tokio::sync::RwLock;

#[derive(Default)]
struct Shared {
    quota: Option<u64>,
    usage: AtomicU64,
    unavailable: SyncRwLock<HashSet<String>>,
}
impl Shared {
    fn check_available(&self, store: &str) -> Result<()> {
        let unavailable = self.unavailable.read().map(|set| set.contains(store)).unwrap_or(false);
        if unavailable {
            exn::bail!(ErrorKind::Unavailable(store.to_string()));
        }
        Ok(())
    }
}

/// In-memory cache storage for testing.
///
/// Stores live in a `Vec` behind a [`RwLock`] so creation order is
/// preserved, and every store keeps its entries in insertion order. An
/// optional byte quota (counting response bodies across all stores) lets
/// tests exercise [`QuotaExceeded`](ErrorKind::QuotaExceeded) handling, and
/// individual stores can be made [unavailable](Self::make_unavailable).
pub struct MockStorage {
    name: String,
    shared: Arc<Shared>,
    stores: RwLock<Vec<Arc<MockStore>>>,
}

impl MockStorage {
    /// Create mock storage with some empty stores already opened.
    ///
    /// Panics if any name fails validation. If test setup is wrong, then
    /// the test should not pass.
    pub fn with_stores(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let storage = Self::default();
        let shared = storage.shared.clone();
        let stores = names
            .into_iter()
            .map(|name| {
                let name = name.into();
                let Ok(validated) = validate_store_name(&name) else {
                    panic!("MockStorage::with_stores: invalid store name {name:?}");
                };
                Arc::new(MockStore::new(validated, shared.clone()))
            })
            .collect();
        Self { stores: RwLock::new(stores), ..storage }
    }

    /// Limit the total number of body bytes this storage will hold.
    pub fn with_quota(mut self, bytes: u64) -> Self {
        // Only valid before any handles have been given out.
        let shared = Arc::new(Shared { quota: Some(bytes), ..Shared::default() });
        self.stores = RwLock::new(
            self.stores
                .into_inner()
                .into_iter()
                .map(|store| Arc::new(MockStore::new(store.name.clone(), shared.clone())))
                .collect(),
        );
        self.shared = shared;
        self
    }

    /// Change the name of the mock storage.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make every operation on the named store fail with
    /// [`Unavailable`](ErrorKind::Unavailable).
    pub fn make_unavailable(&self, store: impl Into<String>) {
        if let Ok(mut set) = self.shared.unavailable.write() {
            set.insert(store.into());
        }
    }

    /// Body bytes currently held across all stores.
    pub fn usage(&self) -> u64 {
        self.shared.usage.load(Ordering::SeqCst)
    }
}
impl Default for MockStorage {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            shared: Arc::new(Shared::default()),
            stores: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CacheStorage for MockStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self, store: &str) -> Result<StoreHandle> {
        let store = validate_store_name(store)?;
        self.shared.check_available(&store)?;
        let mut guard = self.stores.write().await;
        if let Some(existing) = guard.iter().find(|s| s.name == store) {
            return Ok(existing.clone());
        }
        let created = Arc::new(MockStore::new(store, self.shared.clone()));
        guard.push(created.clone());
        Ok(created)
    }

    async fn has(&self, store: &str) -> Result<bool> {
        Ok(self.stores.read().await.iter().any(|s| s.name == store))
    }

    async fn delete_store(&self, store: &str) -> Result<bool> {
        self.shared.check_available(store)?;
        let mut guard = self.stores.write().await;
        let Some(position) = guard.iter().position(|s| s.name == store) else {
            return Ok(false);
        };
        guard.remove(position).detach().await;
        Ok(true)
    }

    async fn store_names(&self) -> Result<Vec<String>> {
        Ok(self.stores.read().await.iter().map(|s| s.name.clone()).collect())
    }
}

struct MockStore {
    name: String,
    shared: Arc<Shared>,
    detached: AtomicBool,
    entries: RwLock<Vec<(RequestKey, CachedResponse)>>,
}
impl MockStore {
    fn new(name: String, shared: Arc<Shared>) -> Self {
        Self { name, shared, detached: AtomicBool::new(false), entries: RwLock::new(Vec::new()) }
    }

    /// A deleted store keeps working for handles that are still around, but
    /// stops counting towards the quota.
    async fn detach(&self) {
        let bytes: u64 = self.entries.read().await.iter().map(|(_, r)| r.size()).sum();
        if !self.detached.swap(true, Ordering::SeqCst) {
            self.shared.usage.fetch_sub(bytes, Ordering::SeqCst);
        }
    }

    fn accounted(&self) -> bool {
        !self.detached.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStore for MockStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
        self.shared.check_available(&self.name)?;
        let guard = self.entries.read().await;
        Ok(guard.iter().find(|(k, _)| k == key).map(|(_, r)| r.clone()))
    }

    async fn put(&self, key: &RequestKey, response: CachedResponse) -> Result<()> {
        self.shared.check_available(&self.name)?;
        let mut guard = self.entries.write().await;
        let existing = guard.iter().position(|(k, _)| k == key);
        let replaced = existing.map(|i| guard[i].1.size()).unwrap_or(0);
        if self.accounted() {
            let usage = self.shared.usage.load(Ordering::SeqCst);
            let projected = usage.saturating_sub(replaced) + response.size();
            if let Some(quota) = self.shared.quota
                && projected > quota
            {
                exn::bail!(ErrorKind::QuotaExceeded(response.size()));
            }
            self.shared.usage.store(projected, Ordering::SeqCst);
        }
        if let Some(i) = existing {
            guard.remove(i);
        }
        guard.push((key.clone(), response));
        Ok(())
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        self.shared.check_available(&self.name)?;
        let mut guard = self.entries.write().await;
        let Some(i) = guard.iter().position(|(k, _)| k == key) else {
            return Ok(false);
        };
        let (_, removed) = guard.remove(i);
        if self.accounted() {
            self.shared.usage.fetch_sub(removed.size(), Ordering::SeqCst);
        }
        Ok(true)
    }

    fn keys_stream(&self) -> KeyStream<'_> {
        if let Err(e) = self.shared.check_available(&self.name) {
            return Box::pin(futures::stream::once(async { Err(e) }));
        }
        Box::pin(stream! {
            // Snapshot under the read lock, then drop it before yielding.
            let keys: Vec<RequestKey> = self.entries.read().await.iter().map(|(k, _)| k.clone()).collect();
            for key in keys {
                yield Ok(key);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &[u8]) -> CachedResponse {
        CachedResponse::new(200, vec![], body.to_vec())
    }

    #[tokio::test]
    async fn test_open_creates_once() {
        let storage = MockStorage::default();
        let a = storage.open("shop-static-v1").await.unwrap();
        a.put(&RequestKey::get("/a.css"), response(b"a")).await.unwrap();
        let b = storage.open("shop-static-v1").await.unwrap();
        assert!(b.lookup(&RequestKey::get("/a.css")).await.unwrap().is_some());
        assert_eq!(storage.store_names().await.unwrap(), vec!["shop-static-v1"]);
    }

    #[tokio::test]
    async fn test_has_does_not_create() {
        let storage = MockStorage::default();
        assert!(!storage.has("shop-api-v1").await.unwrap());
        assert!(storage.store_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keys_in_insertion_order() {
        let storage = MockStorage::default();
        let store = storage.open("s").await.unwrap();
        for url in ["/1", "/2", "/3"] {
            store.put(&RequestKey::get(url), response(b"x")).await.unwrap();
        }
        // Overwriting moves the key to the back.
        store.put(&RequestKey::get("/1"), response(b"y")).await.unwrap();
        let urls: Vec<_> = store.keys().await.unwrap().into_iter().map(|k| k.url).collect();
        assert_eq!(urls, vec!["/2", "/3", "/1"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let storage = MockStorage::default();
        let store = storage.open("s").await.unwrap();
        store.put(&RequestKey::get("/1"), response(b"x")).await.unwrap();
        assert!(store.delete(&RequestKey::get("/1")).await.unwrap());
        assert!(!store.delete(&RequestKey::get("/1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_store() {
        let storage = MockStorage::with_stores(["one", "two"]);
        assert!(storage.delete_store("one").await.unwrap());
        assert!(!storage.delete_store("one").await.unwrap());
        assert_eq!(storage.store_names().await.unwrap(), vec!["two"]);
    }

    #[tokio::test]
    async fn test_quota() {
        let storage = MockStorage::default().with_quota(4);
        let store = storage.open("s").await.unwrap();
        store.put(&RequestKey::get("/1"), response(b"abc")).await.unwrap();
        let err = store.put(&RequestKey::get("/2"), response(b"de")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::QuotaExceeded(2)));
        // Replacing an entry only counts the difference.
        store.put(&RequestKey::get("/1"), response(b"abcd")).await.unwrap();
        assert_eq!(storage.usage(), 4);
        store.delete(&RequestKey::get("/1")).await.unwrap();
        assert_eq!(storage.usage(), 0);
    }

    #[tokio::test]
    async fn test_deleted_store_releases_quota() {
        let storage = MockStorage::default().with_quota(3);
        let store = storage.open("s").await.unwrap();
        store.put(&RequestKey::get("/1"), response(b"abc")).await.unwrap();
        storage.delete_store("s").await.unwrap();
        assert_eq!(storage.usage(), 0);
        let fresh = storage.open("s").await.unwrap();
        fresh.put(&RequestKey::get("/1"), response(b"abc")).await.unwrap();
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let storage = MockStorage::with_stores(["broken"]);
        let store = storage.open("broken").await.unwrap();
        storage.make_unavailable("broken");
        let err = store.keys().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unavailable(_)));
        assert!(storage.open("broken").await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_name_rejected() {
        let storage = MockStorage::default();
        let err = storage.open("../escape").await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::InvalidStoreName(_)));
    }

    #[test]
    #[should_panic(expected = "invalid store name")]
    fn test_with_stores_panics_on_bad_name() {
        MockStorage::with_stores(["bad/name"]);
    }
}
