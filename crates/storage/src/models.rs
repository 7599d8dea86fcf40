//! Storage models.
//!
//! A cache entry is a request identity ([`RequestKey`]) mapped to a snapshot
//! of the response that answered it ([`CachedResponse`]).

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::UtcDateTime;

/// Milliseconds since the unix epoch, the timestamp unit used for cache
/// entries and sync queue items.
pub fn now_ms() -> i64 {
    to_ms(UtcDateTime::now())
}

pub fn to_ms(at: UtcDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

/// HTTP request method.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    #[display("GET")]
    Get,
    #[display("HEAD")]
    Head,
    #[display("POST")]
    Post,
    #[display("PUT")]
    Put,
    #[display("PATCH")]
    Patch,
    #[display("DELETE")]
    Delete,
}
impl Method {
    /// Only responses to safe methods are ever written to a cache store.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::Get | Self::Head)
    }
}
impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            other => return Err(other.to_string()),
        })
    }
}

/// Identity of a cached request.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[display("{method} {url}")]
pub struct RequestKey {
    pub method: Method,
    pub url: String,
}
impl RequestKey {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self { method, url: url.into() }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Stable content address of this key, used by backends that can't key
    /// on arbitrary strings (file names).
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.method.to_string().as_bytes());
        hasher.update(b" ");
        hasher.update(self.url.as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

/// Snapshot of a response as held in a cache store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Insertion timestamp (unix milliseconds)
    pub stored_at: i64,
}
impl CachedResponse {
    /// Snapshot stamped with the current time.
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Vec<u8>>) -> Self {
        Self { status, headers, body: body.into(), stored_at: now_ms() }
    }

    pub fn with_stored_at(mut self, stored_at: i64) -> Self {
        self.stored_at = stored_at;
        self
    }

    pub fn size(&self) -> u64 {
        self.body.len() as u64
    }

    /// Age in milliseconds relative to `now` (never negative).
    pub fn age_ms(&self, now: i64) -> u64 {
        now.saturating_sub(self.stored_at).max(0) as u64
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }
}
