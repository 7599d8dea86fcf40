//! The host document hint elements are inserted into.

use crate::models::{HintHandle, ResourceHint};
use std::sync::Arc;

/// Shared handle to a document.
pub type DocumentHandle = Arc<dyn Document>;

/// Synchronous `<head>` mutation.
pub trait Document: Send + Sync {
    fn insert(&self, hint: &ResourceHint) -> HintHandle;

    /// Returns `false` if the element was already gone.
    fn remove(&self, handle: HintHandle) -> bool;
}

#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockDocument;

#[cfg(any(test, feature = "mock"))]
mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Records inserted elements in document order.
    #[derive(Default)]
    pub struct MockDocument {
        head: Mutex<Head>,
    }

    #[derive(Default)]
    struct Head {
        next: u64,
        elements: Vec<(HintHandle, ResourceHint)>,
    }

    impl MockDocument {
        fn head(&self) -> std::sync::MutexGuard<'_, Head> {
            self.head.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        pub fn elements(&self) -> Vec<ResourceHint> {
            self.head().elements.iter().map(|(_, hint)| hint.clone()).collect()
        }

        pub fn html(&self) -> Vec<String> {
            self.head().elements.iter().map(|(_, hint)| hint.to_html()).collect()
        }
    }

    impl Document for MockDocument {
        fn insert(&self, hint: &ResourceHint) -> HintHandle {
            let mut head = self.head();
            head.next += 1;
            let handle = HintHandle(head.next);
            head.elements.push((handle, hint.clone()));
            handle
        }

        fn remove(&self, handle: HintHandle) -> bool {
            let mut head = self.head();
            let before = head.elements.len();
            head.elements.retain(|(h, _)| *h != handle);
            head.elements.len() != before
        }
    }
}
