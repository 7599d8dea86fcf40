//! Answering requests according to each partition's strategy.

use crate::error::{ErrorKind, Result};
use crate::manager::CacheManager;
use crate::metrics::PerformanceMonitor;
use exn::ResultExt;
use std::sync::Arc;
use swkit_config::{Partition, Strategy};
use swkit_fetch::{NetworkHandle, Request, Response};
use tokio::task::JoinHandle;

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Network,
}

#[derive(Debug)]
pub struct Handled {
    pub response: Response,
    pub source: Source,
    /// Background refresh started by stale-while-revalidate.
    pub revalidation: Option<JoinHandle<()>>,
}
impl Handled {
    fn cached(response: Response) -> Self {
        Self { response, source: Source::Cache, revalidation: None }
    }

    fn network(response: Response) -> Self {
        Self { response, source: Source::Network, revalidation: None }
    }
}

/// Routes requests to partitions and applies the partition's
/// [`Strategy`], keeping the [`PerformanceMonitor`] up to date.
///
/// Only `GET`/`HEAD` requests are cached. Anything else goes straight to
/// the network, and a transport failure comes back as an error so the
/// caller can queue it for background sync.
#[derive(Clone)]
pub struct FetchHandler {
    cache: CacheManager,
    network: NetworkHandle,
    monitor: Arc<PerformanceMonitor>,
}

impl FetchHandler {
    pub fn new(cache: CacheManager, network: NetworkHandle, monitor: Arc<PerformanceMonitor>) -> Self {
        Self { cache, network, monitor }
    }

    pub async fn handle(&self, request: &Request) -> Result<Handled> {
        if !request.method().is_cacheable() {
            return self.fetch(request).await.map(Handled::network);
        }
        let partition = self.cache.config().classify(&request.url);
        let strategy = self.cache.config().policy(partition).strategy;
        tracing::trace!(url = %request.url, %partition, %strategy, "Handling request");
        match strategy {
            Strategy::CacheFirst => self.cache_first(partition, request).await,
            Strategy::NetworkFirst => self.network_first(partition, request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(partition, request).await,
        }
    }

    async fn fetch(&self, request: &Request) -> Result<Response> {
        self.monitor.record_network_request();
        self.network.fetch(request).await.or_raise(|| ErrorKind::NoResponse(request.url.clone()))
    }

    /// Fetch, and keep a copy of successful responses.
    async fn fetch_and_store(&self, partition: Partition, request: &Request) -> Result<Response> {
        let response = self.fetch(request).await?;
        if response.is_success() {
            self.cache.store(partition, &request.key(), response.to_cached()).await;
        }
        Ok(response)
    }

    async fn cached(&self, partition: Partition, request: &Request) -> Option<Response> {
        let found = self.cache.lookup(partition, &request.key()).await;
        match found {
            Some(_) => self.monitor.record_cache_hit(),
            None => self.monitor.record_cache_miss(),
        }
        found.map(Response::from)
    }

    async fn cache_first(&self, partition: Partition, request: &Request) -> Result<Handled> {
        if let Some(response) = self.cached(partition, request).await {
            return Ok(Handled::cached(response));
        }
        self.fetch_and_store(partition, request).await.map(Handled::network)
    }

    async fn network_first(&self, partition: Partition, request: &Request) -> Result<Handled> {
        let err = match self.fetch_and_store(partition, request).await {
            Ok(response) => return Ok(Handled::network(response)),
            Err(e) => e,
        };
        tracing::debug!(url = %request.url, error = ?err, "Network failed; falling back to cache");
        match self.cached(partition, request).await {
            Some(response) => Ok(Handled::cached(response)),
            None => Err(err),
        }
    }

    async fn stale_while_revalidate(&self, partition: Partition, request: &Request) -> Result<Handled> {
        let Some(response) = self.cached(partition, request).await else {
            return self.fetch_and_store(partition, request).await.map(Handled::network);
        };
        let handler = self.clone();
        let request = request.clone();
        let revalidation = tokio::spawn(async move {
            if let Err(e) = handler.fetch_and_store(partition, &request).await {
                tracing::debug!(url = %request.url, error = ?e, "Background revalidation failed");
            }
        });
        Ok(Handled { response, source: Source::Cache, revalidation: Some(revalidation) })
    }
}
