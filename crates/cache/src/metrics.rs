//! Cache and network counters for observability dashboards.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the [`PerformanceMonitor`] counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metrics {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub network_requests: u64,
    pub background_syncs: u64,
}
impl Metrics {
    /// Hits over lookups, `0.0` before the first lookup.
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 { 0.0 } else { self.cache_hits as f64 / lookups as f64 }
    }
}

/// Monotonic counters shared by everything that touches the cache or the
/// network. Cheap to update from any task.
#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    network_requests: AtomicU64,
    background_syncs: AtomicU64,
}
impl PerformanceMonitor {
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_network_request(&self) {
        self.network_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_background_sync(&self) {
        self.background_syncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn metrics(&self) -> Metrics {
        Metrics {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            network_requests: self.network_requests.load(Ordering::Relaxed),
            background_syncs: self.background_syncs.load(Ordering::Relaxed),
        }
    }

    pub fn cache_hit_ratio(&self) -> f64 {
        self.metrics().hit_ratio()
    }

    pub fn reset(&self) {
        for counter in [&self.cache_hits, &self.cache_misses, &self.network_requests, &self.background_syncs] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_without_lookups() {
        assert_eq!(PerformanceMonitor::default().cache_hit_ratio(), 0.0);
    }

    #[test]
    fn test_counters_and_ratio() {
        let monitor = PerformanceMonitor::default();
        for _ in 0..3 {
            monitor.record_cache_hit();
        }
        monitor.record_cache_miss();
        monitor.record_network_request();
        monitor.record_background_sync();
        assert_eq!(
            monitor.metrics(),
            Metrics { cache_hits: 3, cache_misses: 1, network_requests: 1, background_syncs: 1 }
        );
        assert_eq!(monitor.cache_hit_ratio(), 0.75);
    }

    #[test]
    fn test_reset() {
        let monitor = PerformanceMonitor::default();
        monitor.record_cache_hit();
        monitor.record_background_sync();
        monitor.reset();
        assert_eq!(monitor.metrics(), Metrics::default());
    }

    #[test]
    fn test_metrics_serialize_for_dashboards() {
        let metrics = Metrics { cache_hits: 1, ..Metrics::default() };
        let json = serde_json::to_string(&metrics).unwrap();
        assert_eq!(json, r#"{"cache_hits":1,"cache_misses":0,"network_requests":0,"background_syncs":0}"#);
    }
}
