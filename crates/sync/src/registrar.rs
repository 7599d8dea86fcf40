//! The platform's deferred-retry capability.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Shared handle to a sync registrar.
pub type RegistrarHandle = Arc<dyn SyncRegistrar>;

/// Asks the platform to wake the worker with a sync event once connectivity
/// comes back.
#[async_trait]
pub trait SyncRegistrar: Send + Sync {
    fn is_supported(&self) -> bool;

    /// Register interest in a sync event for `tag`. Registering the same tag
    /// twice is not an error.
    async fn register(&self, tag: &str) -> Result<()>;
}

#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockRegistrar;

#[cfg(any(test, feature = "mock"))]
mod mock {
    use super::*;
    use crate::error::ErrorKind;
    use tokio::sync::RwLock;

    /// Records registered tags.
    pub struct MockRegistrar {
        supported: bool,
        tags: RwLock<Vec<String>>,
    }
    impl Default for MockRegistrar {
        fn default() -> Self {
            Self { supported: true, tags: RwLock::default() }
        }
    }
    impl MockRegistrar {
        /// A platform without background sync.
        pub fn unsupported() -> Self {
            Self { supported: false, ..Self::default() }
        }

        pub async fn tags(&self) -> Vec<String> {
            self.tags.read().await.clone()
        }
    }

    #[async_trait]
    impl SyncRegistrar for MockRegistrar {
        fn is_supported(&self) -> bool {
            self.supported
        }

        async fn register(&self, tag: &str) -> Result<()> {
            if !self.supported {
                exn::bail!(ErrorKind::Unsupported);
            }
            let mut tags = self.tags.write().await;
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
            Ok(())
        }
    }
}
