//! Storefront offline layer.
//!
//! [`ServiceWorker`] wires the partition caches ([`swkit_cache`]), the
//! background sync queue and push ([`swkit_sync`]) and the resource hint
//! scheduler ([`swkit_hints`]) to the capabilities the host [`Platform`]
//! provides, and drives the worker lifecycle:
//!
//! 1. [`install()`](ServiceWorker::install): open the current version's
//!    stores and precache the static assets.
//! 2. [`activate()`](ServiceWorker::activate): delete stores from older
//!    versions.
//! 3. [`fetch()`](ServiceWorker::fetch): answer requests; failed mutations
//!    are queued for background sync.
//! 4. [`sync()`](ServiceWorker::sync): replay the queue when the platform
//!    says connectivity is back.
//!
//! Configuration comes from [`SwConfig::load()`].

pub mod error;
mod worker;

pub use crate::worker::{MaintenanceReport, Platform, ServiceWorker};
pub use swkit_cache::{CacheManager, Handled, Metrics, PerformanceMonitor, Source};
pub use swkit_config::{Partition, SwConfig};
pub use swkit_fetch::{Method, Request, RequestOptions, Response};
pub use swkit_hints::{HintHandle, HintKind, HintScheduler, ResourceHint};
pub use swkit_sync::{PushManager, SyncItem, SyncQueue, SyncReport};
