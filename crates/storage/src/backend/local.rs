//! Local filesystem cache storage.
//!
//! Each store is a directory under the configured root, and each entry is a
//! JSON record named after the [digest](RequestKey::digest) of its key. All
//! I/O goes through `tokio::fs`.

use super::{CacheStorage, CacheStore, KeyStream, StoreHandle};
use crate::error::{ErrorKind, Result};
use crate::models::{CachedResponse, RequestKey};
use crate::name::validate as validate_store_name;
use async_stream::stream;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::sync::Mutex;

/// Marker file written into every store directory; holds the store's
/// creation sequence.
const STORE_MARKER: &str = "store.meta";
const RECORD_EXTENSION: &str = "json";
/// Files being written; renamed over the real file once complete.
const STAGING_EXTENSION: &str = "partial";

#[derive(Serialize, Deserialize)]
struct StoreMeta {
    sequence: u64,
}

#[derive(Serialize, Deserialize)]
struct Record {
    sequence: u64,
    key: RequestKey,
    response: CachedResponse,
}

/// The listing fields of a [`Record`]; the response is skipped while
/// parsing.
#[derive(Deserialize)]
struct RecordHead {
    sequence: u64,
    key: RequestKey,
}

fn map_io_error(e: std::io::Error, store: &str, bytes: u64) -> ErrorKind {
    match e.kind() {
        std::io::ErrorKind::StorageFull => ErrorKind::QuotaExceeded(bytes),
        std::io::ErrorKind::NotFound => ErrorKind::StoreNotFound(store.to_string()),
        std::io::ErrorKind::PermissionDenied => ErrorKind::Unavailable(store.to_string()),
        _ => ErrorKind::Io(e),
    }
}

/// Write through a staging file so readers only ever see complete files.
async fn write_staged(path: &Path, staging: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::write(staging, bytes).await?;
    fs::rename(staging, path).await
}

async fn read_json<T: DeserializeOwned>(path: &Path, store: &str) -> Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => exn::bail!(map_io_error(e, store, 0)),
    };
    let value = serde_json::from_slice(&bytes)
        .map_err(|e| ErrorKind::CorruptRecord(format!("{}: {e}", path.display())))?;
    Ok(Some(value))
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().is_some_and(|ext| ext == extension)
}

/// Local filesystem cache storage.
///
/// Insertion order (and store creation order) come from sequence numbers
/// kept in the files themselves, never from the clock. Handles for the same
/// store share one counter, so open stores through a single `LocalStorage`
/// (or its clones).
///
/// # Examples
///
/// ```
/// use swkit_storage::{CacheStorage, LocalStorage, RequestKey, CachedResponse};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dir = tempfile::tempdir()?;
/// let storage = LocalStorage::new("disk", dir.path())?;
/// let store = storage.open("shop-static-v1").await?;
/// store.put(&RequestKey::get("/app.js"), CachedResponse::new(200, vec![], b"0".to_vec())).await?;
/// assert_eq!(store.keys().await?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalStorage {
    name: String,
    /// Directory holding one sub-directory per store
    root: PathBuf,
    opened: Arc<Mutex<HashMap<String, Arc<LocalStore>>>>,
}
impl LocalStorage {
    /// Create local cache storage rooted at an absolute directory, creating
    /// the directory if needed.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() || (root.exists() && !root.is_dir()) {
            exn::bail!(ErrorKind::Unavailable(root.display().to_string()));
        }
        // Use non-async here; it only happens once on startup.
        sync_create_dir(&root).map_err(ErrorKind::Io)?;
        Ok(Self { name: name.into(), root, opened: Arc::new(Mutex::new(HashMap::new())) })
    }

    fn store_dir(&self, store: &str) -> Result<PathBuf> {
        Ok(self.root.join(validate_store_name(store)?))
    }

    /// Every store with a readable marker, in creation order.
    async fn stores(&self) -> Result<Vec<(u64, String)>> {
        let mut entries = fs::read_dir(&self.root).await.map_err(ErrorKind::Io)?;
        let mut stores = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(ErrorKind::Io)? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            // Anything without a marker isn't ours (or is half-deleted).
            if let Ok(Some(meta)) = read_json::<StoreMeta>(&entry.path().join(STORE_MARKER), &name).await {
                stores.push((meta.sequence, name));
            }
        }
        stores.sort();
        Ok(stores)
    }
}

#[async_trait]
impl CacheStorage for LocalStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self, store: &str) -> Result<StoreHandle> {
        let dir = self.store_dir(store)?;
        let marker = dir.join(STORE_MARKER);
        let mut opened = self.opened.lock().await;
        let exists = fs::try_exists(&marker).await.map_err(|e| map_io_error(e, store, 0))?;
        if exists && let Some(handle) = opened.get(store) {
            return Ok(handle.clone());
        }
        if !exists {
            let sequence = self.stores().await?.last().map_or(0, |(sequence, _)| sequence + 1);
            fs::create_dir_all(&dir).await.map_err(|e| map_io_error(e, store, 0))?;
            let bytes = serde_json::to_vec(&StoreMeta { sequence }).map_err(|e| ErrorKind::CorruptRecord(e.to_string()))?;
            write_staged(&marker, &marker.with_extension(STAGING_EXTENSION), &bytes)
                .await
                .map_err(|e| map_io_error(e, store, 0))?;
            tracing::debug!(backend = %self.name, store, sequence, "Created cache store");
        }
        let handle = Arc::new(LocalStore::open(store, dir).await?);
        opened.insert(store.to_string(), handle.clone());
        Ok(handle)
    }

    async fn has(&self, store: &str) -> Result<bool> {
        let dir = self.store_dir(store)?;
        Ok(fs::try_exists(dir.join(STORE_MARKER)).await.map_err(|e| map_io_error(e, store, 0))?)
    }

    async fn delete_store(&self, store: &str) -> Result<bool> {
        let dir = self.store_dir(store)?;
        let mut opened = self.opened.lock().await;
        opened.remove(store);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(map_io_error(e, store, 0).into()),
        }
    }

    async fn store_names(&self) -> Result<Vec<String>> {
        Ok(self.stores().await?.into_iter().map(|(_, name)| name).collect())
    }
}

struct LocalStore {
    name: String,
    dir: PathBuf,
    next_sequence: AtomicU64,
}
impl LocalStore {
    /// Clear out interrupted writes and continue numbering after the newest
    /// record.
    async fn open(name: &str, dir: PathBuf) -> Result<Self> {
        let store = Self { name: name.to_string(), dir, next_sequence: AtomicU64::new(0) };
        let mut entries = fs::read_dir(&store.dir).await.map_err(|e| map_io_error(e, name, 0))?;
        while let Some(entry) = entries.next_entry().await.map_err(ErrorKind::Io)? {
            let path = entry.path();
            if has_extension(&path, STAGING_EXTENSION) {
                match fs::remove_file(&path).await {
                    Err(e) if e.kind() != std::io::ErrorKind::NotFound => exn::bail!(map_io_error(e, name, 0)),
                    _ => tracing::debug!(store = name, path = %path.display(), "Removed interrupted write"),
                }
            }
        }
        let heads = store.scan::<RecordHead>(|head| head.sequence).await?;
        let next = heads.last().map_or(0, |head| head.sequence + 1);
        store.next_sequence.store(next, Ordering::SeqCst);
        Ok(store)
    }

    fn record_path(&self, key: &RequestKey) -> PathBuf {
        self.dir.join(key.digest()).with_extension(RECORD_EXTENSION)
    }

    /// Read every record in the store, ordered by `sequence`. Records that
    /// cannot be decoded are logged and skipped.
    async fn scan<T: DeserializeOwned>(&self, sequence: impl Fn(&T) -> u64) -> Result<Vec<T>> {
        let mut dir = fs::read_dir(&self.dir).await.map_err(|e| map_io_error(e, &self.name, 0))?;
        let mut found = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(ErrorKind::Io)? {
            let path = entry.path();
            if !has_extension(&path, RECORD_EXTENSION) {
                continue;
            }
            match read_json::<T>(&path, &self.name).await {
                Ok(Some(record)) => found.push(record),
                // Deleted since listing.
                Ok(None) => {},
                Err(e) if matches!(&*e, ErrorKind::CorruptRecord(_)) => {
                    tracing::warn!(store = %self.name, error = ?e, "Skipping unreadable cache record");
                },
                Err(e) => return Err(e),
            }
        }
        found.sort_by_key(&sequence);
        Ok(found)
    }
}

#[async_trait]
impl CacheStore for LocalStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
        let record = read_json::<Record>(&self.record_path(key), &self.name).await?;
        // Digest collisions are theoretical, but compare the key anyway.
        Ok(record.filter(|r| &r.key == key).map(|r| r.response))
    }

    async fn put(&self, key: &RequestKey, response: CachedResponse) -> Result<()> {
        let size = response.size();
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let record = Record { sequence, key: key.clone(), response };
        let bytes = serde_json::to_vec(&record).map_err(|e| ErrorKind::CorruptRecord(e.to_string()))?;
        let path = self.record_path(key);
        // Unique per write, so concurrent puts of one key never share a file.
        let staging = path.with_extension(format!("{sequence}.{STAGING_EXTENSION}"));
        Ok(write_staged(&path, &staging, &bytes).await.map_err(|e| map_io_error(e, &self.name, size))?)
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        match fs::remove_file(self.record_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(map_io_error(e, &self.name, 0).into()),
        }
    }

    fn keys_stream(&self) -> KeyStream<'_> {
        Box::pin(stream! {
            match self.scan::<RecordHead>(|head| head.sequence).await {
                Ok(heads) => {
                    for head in heads {
                        yield Ok(head.key);
                    }
                },
                Err(e) => yield Err(e),
            }
        })
    }

    async fn entries(&self) -> Result<Vec<(RequestKey, CachedResponse)>> {
        let records = self.scan::<Record>(|record| record.sequence).await?;
        Ok(records.into_iter().map(|record| (record.key, record.response)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &[u8]) -> CachedResponse {
        CachedResponse::new(200, vec![("content-type".into(), "text/plain".into())], body.to_vec())
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalStorage::new("disk", temp_dir.path()).is_ok());
        assert!(LocalStorage::new("disk", "relative/path").is_err());
    }

    #[tokio::test]
    async fn test_put_and_lookup() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new("disk", temp_dir.path()).unwrap();
        let store = storage.open("shop-static-v1").await.unwrap();
        store.put(&RequestKey::get("/app.css"), response(b"body{}")).await.unwrap();
        let found = store.lookup(&RequestKey::get("/app.css")).await.unwrap().unwrap();
        assert_eq!(found.body, b"body{}");
        assert_eq!(found.header("Content-Type"), Some("text/plain"));
        assert!(store.lookup(&RequestKey::get("/missing.css")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keys_in_insertion_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new("disk", temp_dir.path()).unwrap();
        let store = storage.open("s").await.unwrap();
        for url in ["/c", "/a", "/b"] {
            store.put(&RequestKey::get(url), response(b"x")).await.unwrap();
        }
        let urls: Vec<_> = store.keys().await.unwrap().into_iter().map(|k| k.url).collect();
        assert_eq!(urls, vec!["/c", "/a", "/b"]);
    }

    #[tokio::test]
    async fn test_order_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        {
            let storage = LocalStorage::new("disk", temp_dir.path()).unwrap();
            let store = storage.open("s").await.unwrap();
            store.put(&RequestKey::get("/a"), response(b"1")).await.unwrap();
            store.put(&RequestKey::get("/b"), response(b"2")).await.unwrap();
        }
        let storage = LocalStorage::new("disk", temp_dir.path()).unwrap();
        let store = storage.open("s").await.unwrap();
        store.put(&RequestKey::get("/c"), response(b"3")).await.unwrap();
        // Overwriting moves the key to the end.
        store.put(&RequestKey::get("/a"), response(b"4")).await.unwrap();
        let urls: Vec<_> = store.keys().await.unwrap().into_iter().map(|k| k.url).collect();
        assert_eq!(urls, vec!["/b", "/c", "/a"]);
        let entries = store.entries().await.unwrap();
        assert_eq!(entries.last().unwrap().1.body, b"4");
    }

    #[tokio::test]
    async fn test_handles_share_ordering() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new("disk", temp_dir.path()).unwrap();
        let first = storage.open("s").await.unwrap();
        let second = storage.clone().open("s").await.unwrap();
        for url in ["/1", "/2", "/3", "/4"] {
            let handle = if url == "/2" || url == "/4" { &second } else { &first };
            handle.put(&RequestKey::get(url), response(b"x")).await.unwrap();
        }
        let urls: Vec<_> = first.keys().await.unwrap().into_iter().map(|k| k.url).collect();
        assert_eq!(urls, vec!["/1", "/2", "/3", "/4"]);
    }

    #[tokio::test]
    async fn test_unreadable_record_is_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new("disk", temp_dir.path()).unwrap();
        let store = storage.open("s").await.unwrap();
        for url in ["/a", "/b", "/c"] {
            store.put(&RequestKey::get(url), response(b"x")).await.unwrap();
        }
        std::fs::write(temp_dir.path().join("s").join("deadbeef.json"), br#"{"sequence":1,"key":"#).unwrap();

        let urls: Vec<_> = store.keys().await.unwrap().into_iter().map(|k| k.url).collect();
        assert_eq!(urls, vec!["/a", "/b", "/c"]);
        assert_eq!(store.entries().await.unwrap().len(), 3);
        // Reopening after a restart still works.
        let reopened = LocalStorage::new("disk", temp_dir.path()).unwrap().open("s").await.unwrap();
        assert_eq!(reopened.keys().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_interrupted_writes_are_cleared_on_open() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new("disk", temp_dir.path()).unwrap();
        let store = storage.open("s").await.unwrap();
        store.put(&RequestKey::get("/a"), response(b"x")).await.unwrap();
        let leftover = temp_dir.path().join("s").join("0123.7.partial");
        std::fs::write(&leftover, b"{\"seq").unwrap();

        let reopened = LocalStorage::new("disk", temp_dir.path()).unwrap().open("s").await.unwrap();
        assert!(!leftover.exists());
        assert_eq!(reopened.keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_puts_of_one_key() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new("disk", temp_dir.path()).unwrap();
        let store = storage.open("s").await.unwrap();
        let key = RequestKey::get("/race");
        let (a, b) = tokio::join!(store.put(&key, response(b"first")), store.put(&key, response(b"second")));
        a.unwrap();
        b.unwrap();
        let found = store.lookup(&key).await.unwrap().unwrap();
        assert!(found.body == b"first" || found.body == b"second");
        assert_eq!(store.keys().await.unwrap(), vec![key]);
    }

    #[tokio::test]
    async fn test_delete() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new("disk", temp_dir.path()).unwrap();
        let store = storage.open("s").await.unwrap();
        store.put(&RequestKey::get("/1"), response(b"x")).await.unwrap();
        assert!(store.delete(&RequestKey::get("/1")).await.unwrap());
        assert!(!store.delete(&RequestKey::get("/1")).await.unwrap());
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_lifecycle() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new("disk", temp_dir.path()).unwrap();
        assert!(!storage.has("one").await.unwrap());
        storage.open("one").await.unwrap();
        storage.open("two").await.unwrap();
        assert!(storage.has("one").await.unwrap());
        assert_eq!(storage.store_names().await.unwrap(), vec!["one", "two"]);
        assert!(storage.delete_store("one").await.unwrap());
        assert!(!storage.delete_store("one").await.unwrap());
        assert_eq!(storage.store_names().await.unwrap(), vec!["two"]);
    }

    #[tokio::test]
    async fn test_store_names_ignore_foreign_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(temp_dir.path().join("not-a-store")).unwrap();
        let storage = LocalStorage::new("disk", temp_dir.path()).unwrap();
        storage.open("real").await.unwrap();
        assert_eq!(storage.store_names().await.unwrap(), vec!["real"]);
    }

    #[tokio::test]
    async fn test_invalid_store_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new("disk", temp_dir.path()).unwrap();
        assert!(storage.open("../escape").await.is_err());
        assert!(storage.delete_store("..").await.is_err());
    }
}
