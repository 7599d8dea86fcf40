//! Issuing hints into the document, and the startup sequence.

use crate::document::DocumentHandle;
use crate::error::{ErrorKind, Result};
use crate::models::{HintHandle, HintKind, ResourceHint};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use swkit_config::HintsConfig;
use url::Url;

/// Handles issued by [`HintScheduler::initialize()`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitReport {
    /// Connections and critical preloads, issued straight away
    pub immediate: Vec<HintHandle>,
    /// Likely-next prefetches, issued after the delay
    pub deferred: Vec<HintHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Issued {
    kind: HintKind,
    href: String,
}

/// Inserts resource hints into a [`Document`](crate::Document).
///
/// Hrefs are resolved against the origin, and each `(kind, href)` pair is
/// only ever inserted once: asking again returns the handle of the element
/// already in the document. A scheduler built with
/// [`detached()`](Self::detached) has no document and rejects every call
/// with [`ErrorKind::NoDocument`].
pub struct HintScheduler {
    target: Option<(DocumentHandle, Url)>,
    issued: Mutex<HashMap<Issued, HintHandle>>,
}

impl HintScheduler {
    pub fn new(document: DocumentHandle, origin: &str) -> Result<Self> {
        let origin = Url::parse(origin).map_err(|_| ErrorKind::InvalidHref(origin.to_string()))?;
        Ok(Self { target: Some((document, origin)), issued: Mutex::default() })
    }

    /// A scheduler outside any document.
    pub fn detached() -> Self {
        Self { target: None, issued: Mutex::default() }
    }

    pub fn is_attached(&self) -> bool {
        self.target.is_some()
    }

    fn target(&self) -> Result<&(DocumentHandle, Url)> {
        Ok(self.target.as_ref().ok_or(ErrorKind::NoDocument)?)
    }

    fn issued(&self) -> MutexGuard<'_, HashMap<Issued, HintHandle>> {
        self.issued.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn resolve(origin: &Url, href: &str) -> Result<Url> {
        let url = origin.join(href).map_err(|_| ErrorKind::InvalidHref(href.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            exn::bail!(ErrorKind::InvalidHref(href.to_string()));
        }
        Ok(url)
    }

    /// Insert any hint.
    pub fn add_resource_hint(&self, mut hint: ResourceHint) -> Result<HintHandle> {
        let (document, origin) = self.target()?;
        let url = Self::resolve(origin, &hint.href)?;
        hint.href = match hint.kind {
            // Connection hints only ever name an origin.
            HintKind::Preconnect | HintKind::DnsPrefetch => url.origin().ascii_serialization(),
            _ => url.to_string(),
        };
        let key = Issued { kind: hint.kind, href: hint.href.clone() };
        let mut issued = self.issued();
        if let Some(existing) = issued.get(&key) {
            tracing::trace!(kind = %hint.kind, href = %hint.href, "Hint already issued");
            return Ok(*existing);
        }
        let handle = document.insert(&hint);
        tracing::debug!(kind = %hint.kind, href = %hint.href, %handle, "Issued resource hint");
        issued.insert(key, handle);
        Ok(handle)
    }

    pub fn add_preconnect(&self, href: &str, crossorigin: bool) -> Result<HintHandle> {
        let hint = ResourceHint::new(HintKind::Preconnect, href);
        self.add_resource_hint(if crossorigin { hint.anonymous() } else { hint })
    }

    pub fn add_dns_prefetch(&self, href: &str) -> Result<HintHandle> {
        self.add_resource_hint(ResourceHint::new(HintKind::DnsPrefetch, href))
    }

    /// Preload a resource for the current page; `destination` is its `as`.
    pub fn add_preload(&self, href: &str, destination: &str) -> Result<HintHandle> {
        self.add_resource_hint(ResourceHint::new(HintKind::Preload, href).with_as(destination))
    }

    pub fn add_prefetch(&self, href: &str) -> Result<HintHandle> {
        self.add_resource_hint(ResourceHint::new(HintKind::Prefetch, href))
    }

    pub fn add_module_preload(&self, href: &str) -> Result<HintHandle> {
        self.add_resource_hint(ResourceHint::new(HintKind::ModulePreload, href))
    }

    /// Take a hint element back out of the document. Returns `false` if it
    /// was already gone.
    pub fn remove_resource_hint(&self, handle: HintHandle) -> Result<bool> {
        let (document, _) = self.target()?;
        self.issued().retain(|_, issued| *issued != handle);
        Ok(document.remove(handle))
    }

    /// Insert a batch of hints, skipping (and logging) any that fail.
    ///
    /// Only the handles of hints that made it into the document are
    /// returned. Without a document the whole batch fails.
    pub fn add_resource_hints(&self, hints: impl IntoIterator<Item = ResourceHint>) -> Result<Vec<HintHandle>> {
        self.target()?;
        let handles = hints
            .into_iter()
            .filter_map(|hint| {
                let (kind, href) = (hint.kind, hint.href.clone());
                self.add_resource_hint(hint)
                    .inspect_err(|e| tracing::warn!(%kind, %href, error = ?e, "Skipping resource hint"))
                    .ok()
            })
            .collect();
        Ok(handles)
    }

    /// Startup sequence: connections to known origins and critical preloads
    /// now, likely-next documents once `prefetch_delay_ms` has passed so
    /// they don't compete with the initial render.
    #[tracing::instrument(skip_all, fields(delay_ms = config.prefetch_delay_ms))]
    pub async fn initialize(&self, config: &HintsConfig) -> Result<InitReport> {
        let connections = config.preconnect.iter().map(ResourceHint::from);
        let lookups = config.dns_prefetch.iter().map(|href| ResourceHint::new(HintKind::DnsPrefetch, href));
        let critical = config.critical.iter().map(ResourceHint::from);
        let immediate = self.add_resource_hints(connections.chain(lookups).chain(critical))?;

        tokio::time::sleep(Duration::from_millis(config.prefetch_delay_ms)).await;
        let likely_next = config.likely_next.iter().map(|href| ResourceHint::new(HintKind::Prefetch, href));
        let deferred = self.add_resource_hints(likely_next)?;
        tracing::info!(immediate = immediate.len(), deferred = deferred.len(), "Resource hints initialized");
        Ok(InitReport { immediate, deferred })
    }
}
