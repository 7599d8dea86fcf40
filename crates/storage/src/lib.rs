//! Storage capabilities for the swkit offline layer.
//!
//! - [`CacheStorage`]/[`CacheStore`]: named response caches keyed by request
//!   identity, with local-filesystem and in-memory (`mock` feature) backends.
//! - [`DurableStore`]: small keyed blobs that must survive a reload.

pub mod backend;
pub mod durable;
pub mod error;
mod models;
mod name;

#[cfg(any(test, feature = "mock"))]
pub use crate::backend::MockStorage;
pub use crate::backend::{CacheStorage, CacheStore, KeyStream, LocalStorage, StoreHandle};
#[cfg(any(test, feature = "mock"))]
pub use crate::durable::MockDurableStore;
pub use crate::durable::{DurableHandle, DurableStore, LocalDurableStore};
pub use crate::models::{CachedResponse, Method, RequestKey, now_ms, to_ms};
pub use crate::name::validate as validate_store_name;
use std::sync::Arc;

pub type StorageHandle = Arc<dyn CacheStorage>;
