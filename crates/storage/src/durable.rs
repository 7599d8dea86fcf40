//! Durable small-object storage.
//!
//! A keyed blob store for state that must survive a reload (the background
//! sync queue), as opposed to the response caches in [`backend`](crate::backend).

use crate::error::{ErrorKind, Result};
use crate::name::validate as validate_key;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// Shared handle to a durable store.
pub type DurableHandle = Arc<dyn DurableStore>;

/// Keyed durable storage for small values.
///
/// Keys follow the same rules as [store names](crate::validate_store_name).
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Load a value. Returns `None` if nothing has been saved under `key`.
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Save (replace) a value.
    async fn save(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove a value. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Durable storage backed by one file per key in a local directory.
#[derive(Clone)]
pub struct LocalDurableStore {
    root: PathBuf,
}
impl LocalDurableStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::Unavailable(root.display().to_string()));
        }
        std::fs::create_dir_all(&root).map_err(ErrorKind::Io)?;
        Ok(Self { root })
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.root.join(validate_key(key)?))
    }
}

#[async_trait]
impl DurableStore for LocalDurableStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path(key)?).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ErrorKind::Io(e).into()),
        }
    }

    async fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path(key)?;
        // Write-then-rename so a crash never leaves a truncated value behind.
        let staging = path.with_extension("partial");
        fs::write(&staging, value).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::StorageFull => ErrorKind::QuotaExceeded(value.len() as u64),
            _ => ErrorKind::Io(e),
        })?;
        Ok(fs::rename(&staging, &path).await.map_err(ErrorKind::Io)?)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path(key)?).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(ErrorKind::Io(e).into()),
            _ => Ok(()),
        }
    }
}

#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockDurableStore;

#[cfg(any(test, feature = "mock"))]
mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::RwLock;

    /// In-memory durable storage for testing.
    ///
    /// Writes can be made to fail with [`fail_writes()`](Self::fail_writes)
    /// to simulate a full or broken persistent store.
    #[derive(Default)]
    pub struct MockDurableStore {
        values: RwLock<HashMap<String, Vec<u8>>>,
        failing: AtomicBool,
    }
    impl MockDurableStore {
        pub fn fail_writes(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl DurableStore for MockDurableStore {
        async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.values.read().await.get(key).cloned())
        }

        async fn save(&self, key: &str, value: &[u8]) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                exn::bail!(ErrorKind::QuotaExceeded(value.len() as u64));
            }
            self.values.write().await.insert(validate_key(key)?, value.to_vec());
            Ok(())
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.values.write().await.remove(key);
            Ok(())
        }
    }
}
