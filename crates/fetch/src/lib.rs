//! Request/response models and the [`Network`] capability.
//!
//! The actual HTTP stack belongs to the host platform; this crate only
//! describes what the offline layer needs from it.

pub mod error;
mod models;
mod network;

pub use crate::models::{Request, RequestOptions, Response};
#[cfg(any(test, feature = "mock"))]
pub use crate::network::MockNetwork;
pub use crate::network::{Network, NetworkHandle};
pub use swkit_storage::Method;
