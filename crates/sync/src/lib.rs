//! Background sync and push for the swkit offline layer.
//!
//! [`SyncQueue`] keeps requests that failed while offline and replays them,
//! in order, when the platform signals connectivity through a
//! [`SyncRegistrar`]. [`PushManager`] handles push subscriptions.

pub mod error;
mod push;
mod queue;
mod registrar;

#[cfg(any(test, feature = "mock"))]
pub use crate::push::MockPushService;
pub use crate::push::{Permission, PushHandle, PushManager, PushService, Subscription};
pub use crate::queue::{SyncItem, SyncQueue, SyncReport};
#[cfg(any(test, feature = "mock"))]
pub use crate::registrar::MockRegistrar;
pub use crate::registrar::{RegistrarHandle, SyncRegistrar};
