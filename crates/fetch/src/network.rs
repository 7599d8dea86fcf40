//! The network capability.

use crate::error::Result;
use crate::models::{Request, Response};
use async_trait::async_trait;
use std::sync::Arc;

/// Shared handle to the network.
pub type NetworkHandle = Arc<dyn Network>;

/// Whatever actually puts requests on the wire.
///
/// Only transport failures are errors; any response the server gives back,
/// whatever its status, is `Ok`.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockNetwork;

#[cfg(any(test, feature = "mock"))]
mod mock {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::RwLock;

    /// Scripted network for testing.
    ///
    /// URLs answer with whatever was registered through
    /// [`respond()`](Self::respond) (or a `404` if nothing was), unless they
    /// have been told to [`fail()`](Self::fail) or the whole network is
    /// [offline](Self::set_offline). Every request is recorded.
    #[derive(Default)]
    pub struct MockNetwork {
        routes: RwLock<HashMap<String, Response>>,
        failing: RwLock<HashSet<String>>,
        offline: AtomicBool,
        calls: RwLock<Vec<Request>>,
    }
    impl MockNetwork {
        pub async fn respond(&self, url: impl Into<String>, response: Response) {
            self.routes.write().await.insert(url.into(), response);
        }

        pub async fn fail(&self, url: impl Into<String>) {
            self.failing.write().await.insert(url.into());
        }

        pub async fn recover(&self, url: &str) {
            self.failing.write().await.remove(url);
        }

        pub fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        /// Every request seen so far, in order.
        pub async fn calls(&self) -> Vec<Request> {
            self.calls.read().await.clone()
        }

        /// URLs of every request seen so far, in order.
        pub async fn called_urls(&self) -> Vec<String> {
            self.calls.read().await.iter().map(|r| r.url.clone()).collect()
        }
    }

    #[async_trait]
    impl Network for MockNetwork {
        async fn fetch(&self, request: &Request) -> Result<Response> {
            self.calls.write().await.push(request.clone());
            if self.offline.load(Ordering::SeqCst) {
                exn::bail!(ErrorKind::Offline);
            }
            if self.failing.read().await.contains(&request.url) {
                exn::bail!(ErrorKind::Network(request.url.clone()));
            }
            let response = self.routes.read().await.get(&request.url).cloned();
            Ok(response.unwrap_or_else(|| Response::new(404, Vec::new())))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_routes_and_failures() {
            let network = MockNetwork::default();
            network.respond("/a", Response::ok(b"a".to_vec())).await;
            network.fail("/b").await;
            assert_eq!(network.fetch(&Request::get("/a")).await.unwrap().body, b"a");
            assert_eq!(network.fetch(&Request::get("/missing")).await.unwrap().status, 404);
            let err = network.fetch(&Request::get("/b")).await.unwrap_err();
            assert!(matches!(&*err, ErrorKind::Network(_)));
            network.recover("/b").await;
            assert_eq!(network.fetch(&Request::get("/b")).await.unwrap().status, 404);
            assert_eq!(network.called_urls().await, vec!["/a", "/missing", "/b", "/b"]);
        }

        #[tokio::test]
        async fn test_offline() {
            let network = MockNetwork::default();
            network.respond("/a", Response::ok(Vec::new())).await;
            network.set_offline(true);
            let err = network.fetch(&Request::get("/a")).await.unwrap_err();
            assert_eq!(*err, ErrorKind::Offline);
        }
    }
}
