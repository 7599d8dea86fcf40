//! Cache partitions, their strategies, and request routing.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// A named logical cache bucket with its own eviction policy.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    #[display("static")]
    Static,
    #[display("dynamic")]
    Dynamic,
    #[display("images")]
    Images,
    #[display("api")]
    Api,
}
impl Partition {
    pub const ALL: [Partition; 4] = [Self::Static, Self::Dynamic, Self::Images, Self::Api];
}

/// How a partition answers requests.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Serve from cache; only go to the network on a miss.
    #[display("cache-first")]
    CacheFirst,
    /// Try the network; fall back to the cache when it fails.
    #[display("network-first")]
    NetworkFirst,
    /// Serve from cache immediately and refresh the entry in the background.
    #[display("stale-while-revalidate")]
    StaleWhileRevalidate,
}

/// Per-partition caching policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionPolicy {
    pub strategy: Strategy,
    /// Entries older than this are treated as missing
    pub max_age_ms: u64,
    /// Oldest-inserted entries beyond this count are evicted
    pub max_entries: usize,
}
impl PartitionPolicy {
    pub fn new(strategy: Strategy, max_age_ms: u64, max_entries: usize) -> Self {
        Self { strategy, max_age_ms, max_entries }
    }
}

const MINUTE: u64 = 60 * 1000;
const DAY: u64 = 24 * 60 * MINUTE;

pub(crate) fn default_policies() -> BTreeMap<Partition, PartitionPolicy> {
    BTreeMap::from([
        (Partition::Static, PartitionPolicy::new(Strategy::CacheFirst, 30 * DAY, 100)),
        (Partition::Dynamic, PartitionPolicy::new(Strategy::NetworkFirst, DAY, 50)),
        (Partition::Images, PartitionPolicy::new(Strategy::CacheFirst, 7 * DAY, 60)),
        (Partition::Api, PartitionPolicy::new(Strategy::NetworkFirst, 5 * MINUTE, 50)),
    ])
}

/// Rules deciding which partition a request URL belongs to.
///
/// Checked in order: API prefixes, image extensions, static extensions.
/// Everything else is [`Dynamic`](Partition::Dynamic).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Routes {
    pub api_prefixes: Vec<String>,
    pub image_extensions: Vec<String>,
    pub static_extensions: Vec<String>,
}
impl Default for Routes {
    fn default() -> Self {
        let strings = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            api_prefixes: strings(&["/api/"]),
            image_extensions: strings(&["png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico"]),
            static_extensions: strings(&["js", "mjs", "css", "woff", "woff2", "ttf", "otf", "webmanifest"]),
        }
    }
}
impl Routes {
    /// Classify a URL (absolute, or path-relative to the origin).
    pub fn classify(&self, url: &str) -> Partition {
        let path = match Url::parse(url) {
            Ok(parsed) => parsed.path().to_string(),
            // Relative URLs: drop query and fragment by hand.
            Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
        };
        if self.api_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str())) {
            return Partition::Api;
        }
        let extension = path
            .rsplit('/')
            .next()
            .and_then(|file| file.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match extension {
            Some(ext) if self.image_extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) => Partition::Images,
            Some(ext) if self.static_extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) => Partition::Static,
            _ => Partition::Dynamic,
        }
    }
}
