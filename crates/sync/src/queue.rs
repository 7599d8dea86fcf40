//! Durable FIFO of requests waiting to be replayed.

use crate::registrar::SyncRegistrar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use swkit_cache::PerformanceMonitor;
use swkit_config::SyncConfig;
use swkit_fetch::{NetworkHandle, Request, RequestOptions};
use swkit_storage::{DurableHandle, now_ms};
use tokio::sync::Mutex;

/// A request that failed and is waiting for connectivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncItem {
    pub url: String,
    pub options: RequestOptions,
    pub enqueued_at_ms: i64,
    /// Failed replays so far
    #[serde(default)]
    pub attempts: u32,
    /// Earliest time the next replay may happen
    #[serde(default)]
    pub next_attempt_at_ms: i64,
}
impl SyncItem {
    fn new(url: String, options: RequestOptions) -> Self {
        let now = now_ms();
        Self { url, options, enqueued_at_ms: now, attempts: 0, next_attempt_at_ms: now }
    }

    fn request(&self) -> Request {
        Request::new(self.url.clone(), self.options.clone())
    }
}

/// Outcome of one [`process_sync_queue()`](SyncQueue::process_sync_queue) pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Replayed successfully and removed
    pub replayed: usize,
    /// Replayed unsuccessfully and kept
    pub failed: usize,
    /// Kept without a replay because their backoff hasn't elapsed
    pub deferred: usize,
    /// Removed after exhausting their attempts
    pub dropped: usize,
    /// Queue length once the pass finished
    pub remaining: usize,
}

/// Background sync queue.
///
/// Items are replayed strictly in the order they were enqueued, one at a
/// time. An item leaves the queue when its replay gets a `2xx` answer, or
/// when it runs out of attempts; everything else stays, in order. The
/// whole queue is written to the durable store after every change so it
/// survives a reload.
pub struct SyncQueue {
    durable: DurableHandle,
    network: NetworkHandle,
    policy: SyncConfig,
    monitor: Arc<PerformanceMonitor>,
    items: Mutex<Vec<SyncItem>>,
    /// Held for the duration of a pass so two passes never interleave.
    pass: Mutex<()>,
}

impl SyncQueue {
    /// Reload whatever was persisted under the policy's storage key.
    ///
    /// An unreadable or corrupt queue is logged and replaced with an empty
    /// one.
    pub async fn restore(
        durable: DurableHandle,
        network: NetworkHandle,
        policy: SyncConfig,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        let items = match durable.load(&policy.storage_key).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(key = %policy.storage_key, error = %e, "Discarding corrupt sync queue");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(key = %policy.storage_key, error = ?e, "Could not load sync queue");
                Vec::new()
            },
        };
        tracing::debug!(items = items.len(), "Restored sync queue");
        Self { durable, network, policy, monitor, items: Mutex::new(items), pass: Mutex::new(()) }
    }

    pub fn tag(&self) -> &str {
        &self.policy.tag
    }

    /// Append a request and persist the queue.
    ///
    /// The item is queued in memory even if persisting fails.
    pub async fn enqueue(&self, url: impl Into<String>, options: RequestOptions) -> SyncItem {
        let item = SyncItem::new(url.into(), options);
        let mut items = self.items.lock().await;
        items.push(item.clone());
        tracing::debug!(url = %item.url, method = %item.options.method, queued = items.len(), "Queued request for background sync");
        self.persist(&items).await;
        item
    }

    /// Ask the platform to fire a sync event for this queue's tag.
    ///
    /// Returns `false`, with a warning, when the platform can't; the queue
    /// then only drains when [`process_sync_queue()`](Self::process_sync_queue)
    /// is called directly.
    pub async fn register_sync(&self, registrar: &dyn SyncRegistrar) -> bool {
        if !registrar.is_supported() {
            tracing::warn!(tag = %self.policy.tag, "Background sync not supported; queue will only drain manually");
            return false;
        }
        match registrar.register(&self.policy.tag).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(tag = %self.policy.tag, error = ?e, "Background sync registration failed");
                false
            },
        }
    }

    /// Replay every due item, in order, one at a time.
    ///
    /// Items enqueued while the pass is running are kept after the items the
    /// pass retained and are not replayed until the next pass.
    #[tracing::instrument(skip(self), fields(tag = %self.policy.tag))]
    pub async fn process_sync_queue(&self) -> SyncReport {
        let _pass = self.pass.lock().await;
        let snapshot = self.items.lock().await.clone();
        let now = now_ms();
        let mut report = SyncReport::default();
        let mut retained = Vec::with_capacity(snapshot.len());
        for mut item in snapshot.iter().cloned() {
            if item.next_attempt_at_ms > now {
                report.deferred += 1;
                retained.push(item);
                continue;
            }
            if self.replay(&item).await {
                report.replayed += 1;
                self.monitor.record_background_sync();
                continue;
            }
            item.attempts += 1;
            if let Some(max) = self.policy.max_attempts
                && item.attempts >= max
            {
                tracing::warn!(url = %item.url, attempts = item.attempts, "Dropping request after too many failed replays");
                report.dropped += 1;
                continue;
            }
            item.next_attempt_at_ms = now.saturating_add(self.backoff_ms(item.attempts));
            report.failed += 1;
            retained.push(item);
        }

        let mut items = self.items.lock().await;
        let seen = snapshot.len().min(items.len());
        let arrived = items.split_off(seen);
        retained.extend(arrived);
        *items = retained;
        report.remaining = items.len();
        self.persist(&items).await;
        tracing::info!(
            replayed = report.replayed,
            failed = report.failed,
            deferred = report.deferred,
            dropped = report.dropped,
            remaining = report.remaining,
            "Sync pass complete"
        );
        report
    }

    /// Current queue contents, in replay order.
    pub async fn items(&self) -> Vec<SyncItem> {
        self.items.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    async fn replay(&self, item: &SyncItem) -> bool {
        match self.network.fetch(&item.request()).await {
            Ok(response) if response.is_success() => true,
            Ok(response) => {
                tracing::debug!(url = %item.url, status = response.status, "Replay rejected");
                false
            },
            Err(e) => {
                tracing::debug!(url = %item.url, error = ?e, "Replay failed");
                false
            },
        }
    }

    /// Delay after the `attempts`-th failure: the base delay, doubled for
    /// every failure after the first.
    fn backoff_ms(&self, attempts: u32) -> i64 {
        let factor = 1u64 << attempts.saturating_sub(1).min(32);
        i64::try_from(self.policy.backoff_base_ms.saturating_mul(factor)).unwrap_or(i64::MAX)
    }

    async fn persist(&self, items: &[SyncItem]) {
        let bytes = match serde_json::to_vec(items) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "Could not encode sync queue");
                return;
            },
        };
        if let Err(e) = self.durable.save(&self.policy.storage_key, &bytes).await {
            tracing::warn!(key = %self.policy.storage_key, error = ?e, "Could not persist sync queue");
        }
    }
}
