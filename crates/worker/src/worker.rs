//! The worker lifecycle and the platform capabilities it runs on.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::Serialize;
use std::sync::Arc;
use swkit_cache::{CacheManager, FetchHandler, Handled, Metrics, PerformanceMonitor, Source};
use swkit_config::{Partition, SwConfig};
use swkit_fetch::{NetworkHandle, Request};
use swkit_hints::{DocumentHandle, HintScheduler, InitReport};
use swkit_storage::{DurableHandle, StorageHandle};
use swkit_sync::{PushHandle, PushManager, RegistrarHandle, SyncQueue, SyncReport};
use tracing::instrument;

/// Everything the host platform provides.
#[derive(Clone)]
pub struct Platform {
    pub storage: StorageHandle,
    pub durable: DurableHandle,
    pub network: NetworkHandle,
    pub registrar: RegistrarHandle,
    pub push: PushHandle,
    /// `None` when running outside a page (no hint elements possible)
    pub document: Option<DocumentHandle>,
}

/// Outcome of [`ServiceWorker::maintenance()`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub expired: usize,
    pub evicted: usize,
}

/// The offline layer, wired together.
///
/// Construct one per worker; there is no global instance.
pub struct ServiceWorker {
    config: Arc<SwConfig>,
    network: NetworkHandle,
    registrar: RegistrarHandle,
    monitor: Arc<PerformanceMonitor>,
    cache: CacheManager,
    handler: FetchHandler,
    queue: Arc<SyncQueue>,
    hints: Arc<HintScheduler>,
    push: PushManager,
}

impl ServiceWorker {
    /// Validate the configuration and build every component, restoring the
    /// persisted sync queue.
    pub async fn new(config: SwConfig, platform: Platform) -> Result<Self> {
        config.validate().or_raise(|| ErrorKind::Config)?;
        let config = Arc::new(config);
        let monitor = Arc::new(PerformanceMonitor::default());
        let cache = CacheManager::new(platform.storage, config.clone());
        let handler = FetchHandler::new(cache.clone(), platform.network.clone(), monitor.clone());
        let queue =
            SyncQueue::restore(platform.durable, platform.network.clone(), config.sync.clone(), monitor.clone()).await;
        let hints = match platform.document {
            Some(document) => HintScheduler::new(document, &config.hints.origin).or_raise(|| ErrorKind::Config)?,
            None => HintScheduler::detached(),
        };
        let push = PushManager::new(platform.push, config.push.application_server_key.clone());
        Ok(Self {
            config,
            network: platform.network,
            registrar: platform.registrar,
            monitor,
            cache,
            handler,
            queue: Arc::new(queue),
            hints: Arc::new(hints),
            push,
        })
    }

    /// Create the current version's stores and fill the static partition
    /// with the precache list. Returns how many URLs were precached;
    /// individual failures are logged and skipped.
    #[instrument(skip(self), fields(version = %self.config.version))]
    pub async fn install(&self) -> usize {
        if let Err(e) = self.cache.open_all().await {
            tracing::warn!(error = ?e, "Could not open every cache store");
        }
        let mut cached = 0;
        for url in &self.config.precache {
            let request = Request::get(url.as_str());
            self.monitor.record_network_request();
            let response = match self.network.fetch(&request).await {
                Ok(response) if response.is_success() => response,
                Ok(response) => {
                    tracing::warn!(%url, status = response.status, "Precache request rejected");
                    continue;
                },
                Err(e) => {
                    tracing::warn!(%url, error = ?e, "Precache request failed");
                    continue;
                },
            };
            if self.cache.store(Partition::Static, &request.key(), response.to_cached()).await {
                cached += 1;
            }
        }
        tracing::info!(cached, total = self.config.precache.len(), "Installed");
        cached
    }

    /// Remove stores left behind by previous versions. Returns their names.
    pub async fn activate(&self) -> Vec<String> {
        match self.cache.clean_old_caches().await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::warn!(error = ?e, "Could not clean old caches");
                Vec::new()
            },
        }
    }

    /// Answer a request from the cache or the network.
    ///
    /// A request that can't be cached (anything but `GET`/`HEAD`) and can't
    /// reach the network is queued for background sync and reported as
    /// [`ErrorKind::Queued`].
    pub async fn fetch(&self, request: &Request) -> Result<Handled> {
        let err = match self.handler.handle(request).await {
            Ok(handled) => return Ok(handled),
            Err(e) => e,
        };
        if request.method().is_cacheable() {
            if let Some(handled) = self.precached(request).await {
                return Ok(handled);
            }
            return Err::<Handled, _>(err).or_raise(|| ErrorKind::NoResponse(request.url.clone()));
        }
        self.queue.enqueue(request.url.clone(), request.options.clone()).await;
        self.queue.register_sync(self.registrar.as_ref()).await;
        Err::<Handled, _>(err).or_raise(|| ErrorKind::Queued(request.url.clone()))
    }

    /// Last resort for a request nothing else could answer: the copy put in
    /// the static partition at install time, whichever partition the URL
    /// normally routes to.
    ///
    /// The handler has already counted this request's cache lookup, so the
    /// fallback is not counted again.
    async fn precached(&self, request: &Request) -> Option<Handled> {
        let cached = self.cache.lookup(Partition::Static, &request.key()).await?;
        tracing::debug!(url = %request.url, "Serving precached copy");
        Some(Handled { response: cached.into(), source: Source::Cache, revalidation: None })
    }

    /// Handle a platform sync event. Returns `None` for tags this worker
    /// didn't register.
    pub async fn sync(&self, tag: &str) -> Option<SyncReport> {
        if tag != self.queue.tag() {
            tracing::debug!(%tag, "Ignoring sync event for unknown tag");
            return None;
        }
        Some(self.queue.process_sync_queue().await)
    }

    /// Drop expired entries, then trim every partition to its entry limit.
    #[instrument(skip(self))]
    pub async fn maintenance(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();
        for partition in Partition::ALL {
            match self.cache.prune_expired(partition).await {
                Ok(pruned) => report.expired += pruned,
                Err(e) => tracing::warn!(%partition, error = ?e, "Could not prune expired entries"),
            }
        }
        report.evicted = self.cache.enforce_limits().await;
        tracing::info!(expired = report.expired, evicted = report.evicted, "Maintenance complete");
        report
    }

    /// Run the startup hint sequence against the configured hints.
    pub async fn initialize_hints(&self) -> swkit_hints::error::Result<InitReport> {
        self.hints.initialize(&self.config.hints).await
    }

    pub fn config(&self) -> &SwConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn queue(&self) -> &Arc<SyncQueue> {
        &self.queue
    }

    pub fn hints(&self) -> &Arc<HintScheduler> {
        &self.hints
    }

    pub fn push(&self) -> &PushManager {
        &self.push
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn metrics(&self) -> Metrics {
        self.monitor.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swkit_fetch::{Method, MockNetwork, RequestOptions, Response};
    use swkit_hints::{HintKind, MockDocument};
    use swkit_storage::{CacheStorage, LocalDurableStore, LocalStorage, MockDurableStore, MockStorage};
    use swkit_sync::{MockPushService, MockRegistrar};

    struct Fixture {
        storage: Arc<MockStorage>,
        network: Arc<MockNetwork>,
        registrar: Arc<MockRegistrar>,
        document: Arc<MockDocument>,
        worker: ServiceWorker,
    }

    async fn fixture(config: SwConfig) -> Fixture {
        let storage = Arc::new(MockStorage::default());
        let network = Arc::new(MockNetwork::default());
        for url in &config.precache {
            network.respond(url.as_str(), Response::ok(format!("precached {url}").into_bytes())).await;
        }
        let registrar = Arc::new(MockRegistrar::default());
        let document = Arc::new(MockDocument::default());
        let platform = Platform {
            storage: storage.clone(),
            durable: Arc::new(MockDurableStore::default()),
            network: network.clone(),
            registrar: registrar.clone(),
            push: Arc::new(MockPushService::default()),
            document: Some(document.clone()),
        };
        let worker = ServiceWorker::new(config, platform).await.unwrap();
        Fixture { storage, network, registrar, document, worker }
    }

    fn order() -> Request {
        Request::new("/api/orders", RequestOptions::new(Method::Post).with_body(br#"{"sku":"A1"}"#.to_vec()))
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let f = fixture(SwConfig::default()).await;
        let config = SwConfig { prefix: String::new(), ..SwConfig::default() };
        let platform = Platform {
            storage: f.storage.clone(),
            durable: Arc::new(MockDurableStore::default()),
            network: f.network.clone(),
            registrar: f.registrar.clone(),
            push: Arc::new(MockPushService::default()),
            document: None,
        };
        let err = ServiceWorker::new(config, platform).await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::Config));
    }

    #[tokio::test]
    async fn test_install_precaches_static_assets() {
        let f = fixture(SwConfig::default()).await;
        f.network.fail("/manifest.webmanifest").await;

        assert_eq!(f.worker.install().await, 2);
        assert_eq!(
            f.storage.store_names().await.unwrap(),
            vec!["storefront-static-v1", "storefront-dynamic-v1", "storefront-images-v1", "storefront-api-v1"]
        );

        f.network.set_offline(true);
        let handled = f.worker.fetch(&Request::get("/offline.html")).await.unwrap();
        assert_eq!(handled.source, Source::Cache);
        assert_eq!(handled.response.body, b"precached /offline.html");
        assert!(f.worker.fetch(&Request::get("/manifest.webmanifest")).await.is_err());
    }

    #[tokio::test]
    async fn test_precached_fallback_counts_one_lookup() {
        let f = fixture(SwConfig::default()).await;
        f.worker.install().await;
        f.worker.monitor().reset();

        f.network.set_offline(true);
        f.worker.fetch(&Request::get("/offline.html")).await.unwrap();
        let metrics = f.worker.metrics();
        assert_eq!(metrics.cache_hits + metrics.cache_misses, 1);
    }

    #[tokio::test]
    async fn test_activate_removes_previous_version() {
        let f = fixture(SwConfig::default()).await;
        f.worker.install().await;

        let config = SwConfig { version: "v2".to_string(), ..SwConfig::default() };
        let platform = Platform {
            storage: f.storage.clone(),
            durable: Arc::new(MockDurableStore::default()),
            network: f.network.clone(),
            registrar: f.registrar.clone(),
            push: Arc::new(MockPushService::default()),
            document: None,
        };
        let next = ServiceWorker::new(config, platform).await.unwrap();
        next.install().await;
        let mut deleted = next.activate().await;
        deleted.sort();
        assert_eq!(
            deleted,
            vec!["storefront-api-v1", "storefront-dynamic-v1", "storefront-images-v1", "storefront-static-v1"]
        );
        assert!(next.activate().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_mutation_is_queued_and_replayed() {
        let f = fixture(SwConfig::default()).await;
        f.network.set_offline(true);

        let err = f.worker.fetch(&order()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Queued(url) if url == "/api/orders"));
        assert_eq!(f.worker.queue().len().await, 1);
        assert_eq!(f.registrar.tags().await, vec!["background-sync"]);

        f.network.set_offline(false);
        f.network.respond("/api/orders", Response::new(201, Vec::new())).await;
        assert_eq!(f.worker.sync("periodic-refresh").await, None);
        let report = f.worker.sync("background-sync").await.unwrap();
        assert_eq!(report.replayed, 1);
        assert!(f.worker.queue().is_empty().await);
        assert_eq!(f.worker.metrics().background_syncs, 1);
    }

    #[tokio::test]
    async fn test_failed_get_is_not_queued() {
        let f = fixture(SwConfig::default()).await;
        f.network.set_offline(true);
        let err = f.worker.fetch(&Request::get("/api/products")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NoResponse(_)));
        assert!(f.worker.queue().is_empty().await);
    }

    #[tokio::test]
    async fn test_maintenance_enforces_limits() {
        let mut config = SwConfig::default();
        config.partitions.get_mut(&Partition::Api).unwrap().max_entries = 2;
        let f = fixture(config).await;
        for id in 0..5 {
            let url = format!("/api/products/{id}");
            f.network.respond(url.as_str(), Response::ok(Vec::new())).await;
            f.worker.fetch(&Request::get(url)).await.unwrap();
        }
        let report = f.worker.maintenance().await;
        assert_eq!(report, MaintenanceReport { expired: 0, evicted: 3 });
        assert!(f.worker.cache().limit_cache_entries(Partition::Api, 2).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hints_and_push_are_wired() {
        let f = fixture(SwConfig::default()).await;
        let report = f.worker.initialize_hints().await.unwrap();
        assert_eq!(report.deferred.len(), 3);
        assert_eq!(f.document.elements().iter().filter(|h| h.kind == HintKind::Prefetch).count(), 3);
        assert!(f.worker.push().subscribe().await.is_ok());
    }

    #[tokio::test]
    async fn test_queue_survives_restart_on_disk() {
        let temp_dir = tempfile::tempdir().unwrap();
        let network = Arc::new(MockNetwork::default());
        let platform = || Platform {
            storage: Arc::new(LocalStorage::new("local", temp_dir.path().join("caches")).unwrap()),
            durable: Arc::new(LocalDurableStore::new(temp_dir.path().join("durable")).unwrap()),
            network: network.clone(),
            registrar: Arc::new(MockRegistrar::unsupported()),
            push: Arc::new(MockPushService::unsupported()),
            document: None,
        };

        let worker = ServiceWorker::new(SwConfig::default(), platform()).await.unwrap();
        network.set_offline(true);
        assert!(worker.fetch(&order()).await.is_err());
        drop(worker);

        network.set_offline(false);
        network.respond("/api/orders", Response::new(201, Vec::new())).await;
        let restarted = ServiceWorker::new(SwConfig::default(), platform()).await.unwrap();
        assert_eq!(restarted.queue().len().await, 1);
        assert_eq!(restarted.sync("background-sync").await.unwrap().replayed, 1);
        assert_eq!(network.called_urls().await, vec!["/api/orders", "/api/orders"]);
    }
}
