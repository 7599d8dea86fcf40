//! Resource hints (`preconnect`, `dns-prefetch`, `preload`, `prefetch`,
//! `modulepreload`) for the storefront.
//!
//! [`HintScheduler`] inserts hint elements into a [`Document`] and runs the
//! startup sequence: connections and critical assets immediately, likely
//! next pages after a delay.

mod document;
pub mod error;
mod models;
mod scheduler;

#[cfg(any(test, feature = "mock"))]
pub use crate::document::MockDocument;
pub use crate::document::{Document, DocumentHandle};
pub use crate::models::{HintHandle, HintKind, ResourceHint};
pub use crate::scheduler::{HintScheduler, InitReport};
