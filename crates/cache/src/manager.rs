//! Partition lifecycle over versioned cache stores.
//!
//! Every partition lives in a store named `<prefix>-<partition>-<version>`.
//! A new deployment (new version) simply starts writing to new stores; the
//! old ones are only removed by an explicit [`clean_old_caches()`]
//! pass, so a page mid-session never sees a store vanish under it.
//!
//! [`clean_old_caches()`]: CacheManager::clean_old_caches

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use swkit_config::{Partition, SwConfig};
use swkit_storage::{CachedResponse, RequestKey, StorageHandle, StoreHandle, now_ms};
use tracing::instrument;

/// Owns the partition definitions and is the only writer of store contents.
#[derive(Clone)]
pub struct CacheManager {
    storage: StorageHandle,
    config: Arc<SwConfig>,
}

impl CacheManager {
    pub fn new(storage: StorageHandle, config: Arc<SwConfig>) -> Self {
        Self { storage, config }
    }

    pub fn config(&self) -> &SwConfig {
        &self.config
    }

    async fn open(&self, partition: Partition) -> Result<StoreHandle> {
        let name = self.config.store_name(partition);
        self.storage.open(&name).await.or_raise(|| ErrorKind::Storage(name))
    }

    /// Open the partition's store only if it already exists.
    async fn open_existing(&self, partition: Partition) -> Result<Option<StoreHandle>> {
        let name = self.config.store_name(partition);
        if !self.storage.has(&name).await.or_raise(|| ErrorKind::Storage(name.clone()))? {
            return Ok(None);
        }
        self.open(partition).await.map(Some)
    }

    /// Make sure every partition's current store exists.
    pub async fn open_all(&self) -> Result<()> {
        for partition in Partition::ALL {
            self.open(partition).await?;
        }
        Ok(())
    }

    /// Delete every store carrying this product's prefix that doesn't belong
    /// to the current version. Returns the names of the deleted stores.
    ///
    /// Deletions run concurrently; one failing is logged and does not stop
    /// the others. Running it twice without a version change deletes nothing
    /// the second time.
    #[instrument(skip(self), fields(version = %self.config.version))]
    pub async fn clean_old_caches(&self) -> Result<Vec<String>> {
        let current = self.config.current_store_names();
        let names = self.storage.store_names().await.or_raise(|| ErrorKind::Storage(self.storage.name().to_string()))?;
        let stale: Vec<String> =
            names.into_iter().filter(|name| self.config.owns_store(name) && !current.contains(name)).collect();

        let results = join_all(stale.iter().map(|name| self.storage.delete_store(name))).await;
        let mut deleted = Vec::new();
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(true) => {
                    tracing::info!(store = %name, "Deleted old cache store");
                    deleted.push(name);
                },
                // Someone else (another tab) got there first.
                Ok(false) => {},
                Err(e) => tracing::warn!(store = %name, error = ?e, "Failed to delete old cache store"),
            }
        }
        Ok(deleted)
    }

    /// Total body bytes held by each partition.
    ///
    /// Every partition is present in the result. A partition whose store
    /// doesn't exist, or can't be read, counts as `0`.
    pub async fn cache_size(&self) -> BTreeMap<Partition, u64> {
        let mut sizes = BTreeMap::new();
        for partition in Partition::ALL {
            let size = match self.partition_size(partition).await {
                Ok(size) => size,
                Err(e) => {
                    tracing::warn!(%partition, error = ?e, "Could not size cache partition");
                    0
                },
            };
            sizes.insert(partition, size);
        }
        sizes
    }

    async fn partition_size(&self, partition: Partition) -> Result<u64> {
        let Some(store) = self.open_existing(partition).await? else {
            return Ok(0);
        };
        let entries = store.entries().await.or_raise(|| ErrorKind::Storage(store.name().to_string()))?;
        Ok(entries.iter().map(|(_, response)| response.size()).sum())
    }

    /// Evict the oldest-inserted entries until at most `max_entries` remain.
    /// Returns the evicted keys, oldest first.
    pub async fn limit_cache_entries(&self, partition: Partition, max_entries: usize) -> Result<Vec<RequestKey>> {
        let Some(store) = self.open_existing(partition).await? else {
            return Ok(Vec::new());
        };
        let keys = store.keys().await.or_raise(|| ErrorKind::Storage(store.name().to_string()))?;
        let excess = keys.len().saturating_sub(max_entries);
        let mut evicted = Vec::with_capacity(excess);
        for key in keys.into_iter().take(excess) {
            store.delete(&key).await.or_raise(|| ErrorKind::Storage(store.name().to_string()))?;
            evicted.push(key);
        }
        if !evicted.is_empty() {
            tracing::debug!(%partition, evicted = evicted.len(), max_entries, "Evicted oldest cache entries");
        }
        Ok(evicted)
    }

    /// Apply every partition's configured `max_entries`. Returns the total
    /// number of evicted entries; failing partitions are logged and skipped.
    pub async fn enforce_limits(&self) -> usize {
        let mut total = 0;
        for partition in Partition::ALL {
            let max_entries = self.config.policy(partition).max_entries;
            match self.limit_cache_entries(partition, max_entries).await {
                Ok(evicted) => total += evicted.len(),
                Err(e) => tracing::warn!(%partition, error = ?e, "Could not enforce cache entry limit"),
            }
        }
        total
    }

    /// Delete entries older than the partition's `max_age_ms`. Returns how
    /// many were deleted.
    pub async fn prune_expired(&self, partition: Partition) -> Result<usize> {
        let Some(store) = self.open_existing(partition).await? else {
            return Ok(0);
        };
        let max_age = self.config.policy(partition).max_age_ms;
        let now = now_ms();
        let entries = store.entries().await.or_raise(|| ErrorKind::Storage(store.name().to_string()))?;
        let mut pruned = 0;
        for (key, response) in entries {
            if response.age_ms(now) > max_age {
                store.delete(&key).await.or_raise(|| ErrorKind::Storage(store.name().to_string()))?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    /// Delete a partition's current store. Returns `false` if it didn't exist.
    pub async fn clear_cache(&self, partition: Partition) -> Result<bool> {
        let name = self.config.store_name(partition);
        self.storage.delete_store(&name).await.or_raise(|| ErrorKind::Storage(name))
    }

    /// Delete every store this product owns, whatever its version. Returns
    /// the number of stores deleted.
    pub async fn clear_all_caches(&self) -> Result<usize> {
        let names = self.storage.store_names().await.or_raise(|| ErrorKind::Storage(self.storage.name().to_string()))?;
        let mut deleted = 0;
        for name in names.into_iter().filter(|name| self.config.owns_store(name)) {
            if self.storage.delete_store(&name).await.or_raise(|| ErrorKind::Storage(name.clone()))? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Find a fresh cached response. Entries older than the partition's
    /// `max_age_ms` count as missing. Storage failures count as missing too.
    pub async fn lookup(&self, partition: Partition, key: &RequestKey) -> Option<CachedResponse> {
        let found = match self.open(partition).await {
            Ok(store) => store.lookup(key).await.or_raise(|| ErrorKind::Storage(store.name().to_string())),
            Err(e) => Err(e),
        };
        match found {
            Ok(Some(response)) if response.age_ms(now_ms()) <= self.config.policy(partition).max_age_ms => Some(response),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(%partition, %key, error = ?e, "Cache lookup failed; treating as a miss");
                None
            },
        }
    }

    /// Best-effort write. If the storage quota is exhausted, the partition's
    /// oldest entry is evicted and the write retried once; if that fails too
    /// the write is dropped. Returns whether the response was stored.
    pub async fn store(&self, partition: Partition, key: &RequestKey, response: CachedResponse) -> bool {
        let store = match self.open(partition).await {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(%partition, %key, error = ?e, "Cache store unavailable; dropping write");
                return false;
            },
        };
        let err = match store.put(key, response.clone()).await {
            Ok(()) => return true,
            Err(e) => e,
        };
        if !err.is_quota() {
            tracing::warn!(%partition, %key, error = ?err, "Cache write failed; dropping write");
            return false;
        }
        let oldest = store.keys().await.ok().and_then(|keys| keys.into_iter().find(|k| k != key));
        let Some(oldest) = oldest else {
            tracing::warn!(%partition, %key, "Storage quota exceeded with nothing to evict; dropping write");
            return false;
        };
        if let Err(e) = store.delete(&oldest).await {
            tracing::warn!(%partition, %key, error = ?e, "Could not evict to make room; dropping write");
            return false;
        }
        tracing::debug!(%partition, evicted = %oldest, "Evicted oldest entry after quota error");
        match store.put(key, response).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%partition, %key, error = ?e, "Cache write failed after eviction; dropping write");
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use swkit_storage::{CacheStorage, MockStorage};

    fn config(version: &str) -> Arc<SwConfig> {
        Arc::new(SwConfig { version: version.to_string(), ..SwConfig::default() })
    }

    fn manager(storage: &Arc<MockStorage>, version: &str) -> CacheManager {
        CacheManager::new(storage.clone(), config(version))
    }

    fn response(body: &[u8]) -> CachedResponse {
        CachedResponse::new(200, vec![], body.to_vec())
    }

    #[tokio::test]
    async fn test_version_bump_deletes_old_stores_only() {
        let storage = Arc::new(MockStorage::with_stores([
            "storefront-static-v1",
            "storefront-dynamic-v1",
            "someone-elses-cache",
        ]));
        let deleted = manager(&storage, "v2").clean_old_caches().await.unwrap();
        assert_eq!(deleted, vec!["storefront-static-v1", "storefront-dynamic-v1"]);
        // Pure cleanup: the v2 stores are not created.
        assert_eq!(storage.store_names().await.unwrap(), vec!["someone-elses-cache"]);
    }

    #[tokio::test]
    async fn test_clean_old_caches_is_idempotent() {
        let storage = Arc::new(MockStorage::with_stores(["storefront-static-v1", "storefront-static-v2"]));
        let manager = manager(&storage, "v2");
        assert_eq!(manager.clean_old_caches().await.unwrap(), vec!["storefront-static-v1"]);
        assert!(manager.clean_old_caches().await.unwrap().is_empty());
        assert_eq!(storage.store_names().await.unwrap(), vec!["storefront-static-v2"]);
    }

    #[tokio::test]
    async fn test_clean_old_caches_continues_past_failures() {
        let storage = Arc::new(MockStorage::with_stores(["storefront-static-v1", "storefront-api-v1"]));
        storage.make_unavailable("storefront-static-v1");
        let deleted = manager(&storage, "v2").clean_old_caches().await.unwrap();
        assert_eq!(deleted, vec!["storefront-api-v1"]);
    }

    #[tokio::test]
    async fn test_cache_size_empty() {
        let storage = Arc::new(MockStorage::default());
        let sizes = manager(&storage, "v1").cache_size().await;
        assert_eq!(sizes.len(), Partition::ALL.len());
        assert!(sizes.values().all(|size| *size == 0));
    }

    #[tokio::test]
    async fn test_cache_size_partial_results() {
        let storage = Arc::new(MockStorage::default());
        let manager = manager(&storage, "v1");
        manager.store(Partition::Static, &RequestKey::get("/app.js"), response(b"12345")).await;
        manager.store(Partition::Images, &RequestKey::get("/a.png"), response(b"123")).await;
        storage.make_unavailable("storefront-images-v1");
        let sizes = manager.cache_size().await;
        assert_eq!(sizes[&Partition::Static], 5);
        assert_eq!(sizes[&Partition::Images], 0);
        assert_eq!(sizes[&Partition::Api], 0);
    }

    #[rstest]
    #[case(0, 3, 0)]
    #[case(3, 3, 0)]
    #[case(4, 3, 1)]
    #[case(10, 1, 9)]
    #[tokio::test]
    async fn test_limit_cache_entries_counts(#[case] stored: usize, #[case] max: usize, #[case] evicted: usize) {
        let storage = Arc::new(MockStorage::default());
        let manager = manager(&storage, "v1");
        for i in 0..stored {
            manager.store(Partition::Dynamic, &RequestKey::get(format!("/page/{i}")), response(b"x")).await;
        }
        assert_eq!(manager.limit_cache_entries(Partition::Dynamic, max).await.unwrap().len(), evicted);
    }

    #[tokio::test]
    async fn test_limit_cache_entries_evicts_oldest() {
        let storage = Arc::new(MockStorage::default());
        let manager = manager(&storage, "v1");
        for i in 0..5 {
            manager.store(Partition::Api, &RequestKey::get(format!("/api/{i}")), response(b"x")).await;
        }
        let evicted = manager.limit_cache_entries(Partition::Api, 2).await.unwrap();
        let evicted: Vec<_> = evicted.into_iter().map(|k| k.url).collect();
        assert_eq!(evicted, vec!["/api/0", "/api/1", "/api/2"]);
        let store = storage.open("storefront-api-v1").await.unwrap();
        let left: Vec<_> = store.keys().await.unwrap().into_iter().map(|k| k.url).collect();
        assert_eq!(left, vec!["/api/3", "/api/4"]);
        // Already within limits.
        assert!(manager.limit_cache_entries(Partition::Api, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enforce_limits_uses_config() {
        let storage = Arc::new(MockStorage::default());
        let mut config = SwConfig::default();
        config.partitions.get_mut(&Partition::Images).unwrap().max_entries = 1;
        let manager = CacheManager::new(storage.clone(), Arc::new(config));
        for url in ["/a.png", "/b.png", "/c.png"] {
            manager.store(Partition::Images, &RequestKey::get(url), response(b"x")).await;
        }
        assert_eq!(manager.enforce_limits().await, 2);
    }

    #[tokio::test]
    async fn test_lookup_honours_max_age() {
        let storage = Arc::new(MockStorage::default());
        let manager = manager(&storage, "v1");
        let key = RequestKey::get("/api/products");
        let max_age = manager.config().policy(Partition::Api).max_age_ms as i64;
        let stale = response(b"old").with_stored_at(now_ms() - max_age - 1_000);
        manager.store(Partition::Api, &key, stale).await;
        assert!(manager.lookup(Partition::Api, &key).await.is_none());
        assert_eq!(manager.prune_expired(Partition::Api).await.unwrap(), 1);
        manager.store(Partition::Api, &key, response(b"new")).await;
        assert_eq!(manager.lookup(Partition::Api, &key).await.unwrap().body, b"new");
        assert_eq!(manager.prune_expired(Partition::Api).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_evicts_on_quota() {
        let storage = Arc::new(MockStorage::default().with_quota(6));
        let manager = manager(&storage, "v1");
        assert!(manager.store(Partition::Static, &RequestKey::get("/a.css"), response(b"aaa")).await);
        assert!(manager.store(Partition::Static, &RequestKey::get("/b.css"), response(b"bbb")).await);
        assert!(manager.store(Partition::Static, &RequestKey::get("/c.css"), response(b"ccc")).await);
        let store = storage.open("storefront-static-v1").await.unwrap();
        let urls: Vec<_> = store.keys().await.unwrap().into_iter().map(|k| k.url).collect();
        assert_eq!(urls, vec!["/b.css", "/c.css"]);
    }

    #[tokio::test]
    async fn test_store_drops_write_that_can_never_fit() {
        let storage = Arc::new(MockStorage::default().with_quota(2));
        let manager = manager(&storage, "v1");
        assert!(!manager.store(Partition::Static, &RequestKey::get("/huge.js"), response(b"0123456789")).await);
    }

    #[tokio::test]
    async fn test_clear_cache_and_clear_all() {
        let storage = Arc::new(MockStorage::with_stores(["storefront-static-v0", "unrelated"]));
        let manager = manager(&storage, "v1");
        manager.open_all().await.unwrap();
        assert!(manager.clear_cache(Partition::Dynamic).await.unwrap());
        assert!(!manager.clear_cache(Partition::Dynamic).await.unwrap());
        assert_eq!(manager.clear_all_caches().await.unwrap(), 4);
        assert_eq!(storage.store_names().await.unwrap(), vec!["unrelated"]);
    }
}
