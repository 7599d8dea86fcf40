//! Versioned partition caches for the storefront's offline layer.
//!
//! # Architecture
//! - [`CacheManager`] owns the partitions (`static`, `dynamic`, `images`,
//!   `api`) and their versioned stores: cleanup of old versions, size
//!   reporting, entry limits, expiry and best-effort writes.
//! - [`FetchHandler`] answers requests with each partition's strategy
//!   (cache-first, network-first, stale-while-revalidate).
//! - [`PerformanceMonitor`] counts hits, misses, network requests and
//!   background syncs.

pub mod error;
mod handler;
mod manager;
mod metrics;

pub use crate::handler::{FetchHandler, Handled, Source};
pub use crate::manager::CacheManager;
pub use crate::metrics::{Metrics, PerformanceMonitor};
