//! Resource hint elements and their markup.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use swkit_config::{ConnectTarget, PreloadTarget};

/// The `rel` of a hint element.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintKind {
    #[display("preconnect")]
    Preconnect,
    #[display("dns-prefetch")]
    #[serde(rename = "dns-prefetch")]
    DnsPrefetch,
    #[display("preload")]
    Preload,
    #[display("prefetch")]
    Prefetch,
    #[display("modulepreload")]
    ModulePreload,
}

/// Identifies an inserted hint element so it can be removed again.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[display("hint#{_0}")]
pub struct HintHandle(pub u64);

/// A `<link>` hint element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHint {
    pub kind: HintKind,
    pub href: String,
    #[serde(default, rename = "as", skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// `anonymous` or `use-credentials`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crossorigin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
}

impl ResourceHint {
    pub fn new(kind: HintKind, href: impl Into<String>) -> Self {
        Self {
            kind,
            href: href.into(),
            destination: None,
            mime_type: None,
            crossorigin: None,
            fetch_priority: None,
            media: None,
            integrity: None,
        }
    }

    pub fn with_as(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// `crossorigin="anonymous"`.
    pub fn anonymous(mut self) -> Self {
        self.crossorigin = Some("anonymous".to_string());
        self
    }

    pub fn with_fetch_priority(mut self, priority: impl Into<String>) -> Self {
        self.fetch_priority = Some(priority.into());
        self
    }

    pub fn with_media(mut self, media: impl Into<String>) -> Self {
        self.media = Some(media.into());
        self
    }

    pub fn with_integrity(mut self, integrity: impl Into<String>) -> Self {
        self.integrity = Some(integrity.into());
        self
    }

    /// Markup for the element, attributes in a fixed order.
    pub fn to_html(&self) -> String {
        let mut html = format!(r#"<link rel="{}" href="{}""#, self.kind, escape(&self.href));
        let optional = [
            ("as", &self.destination),
            ("type", &self.mime_type),
            ("crossorigin", &self.crossorigin),
            ("fetchpriority", &self.fetch_priority),
            ("media", &self.media),
            ("integrity", &self.integrity),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                html.push_str(&format!(r#" {name}="{}""#, escape(value)));
            }
        }
        html.push('>');
        html
    }
}

impl From<&ConnectTarget> for ResourceHint {
    fn from(target: &ConnectTarget) -> Self {
        let hint = Self::new(HintKind::Preconnect, &target.href);
        if target.crossorigin { hint.anonymous() } else { hint }
    }
}

impl From<&PreloadTarget> for ResourceHint {
    fn from(target: &PreloadTarget) -> Self {
        Self {
            destination: Some(target.destination.clone()),
            mime_type: target.mime_type.clone(),
            crossorigin: target.crossorigin.then(|| "anonymous".to_string()),
            fetch_priority: target.fetch_priority.clone(),
            ..Self::new(HintKind::Preload, &target.href)
        }
    }
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
