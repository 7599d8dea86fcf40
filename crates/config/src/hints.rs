//! Resource hint configuration.

use serde::{Deserialize, Serialize};

/// An origin to open a connection to ahead of need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectTarget {
    pub href: String,
    #[serde(default)]
    pub crossorigin: bool,
}
impl ConnectTarget {
    pub fn new(href: impl Into<String>, crossorigin: bool) -> Self {
        Self { href: href.into(), crossorigin }
    }
}

/// A critical asset preloaded during initial render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadTarget {
    pub href: String,
    /// Destination (`style`, `script`, `font`, `image`, ...)
    #[serde(rename = "as")]
    pub destination: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub crossorigin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_priority: Option<String>,
}

/// What the hint scheduler issues at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintsConfig {
    /// Base URL relative hrefs are resolved against
    pub origin: String,
    pub preconnect: Vec<ConnectTarget>,
    pub dns_prefetch: Vec<String>,
    pub critical: Vec<PreloadTarget>,
    /// Documents the visitor is likely to navigate to next
    pub likely_next: Vec<String>,
    pub prefetch_delay_ms: u64,
}
impl Default for HintsConfig {
    fn default() -> Self {
        Self {
            origin: "https://shop.example".to_string(),
            preconnect: vec![
                ConnectTarget::new("https://fonts.googleapis.com", false),
                ConnectTarget::new("https://fonts.gstatic.com", true),
            ],
            dns_prefetch: vec!["https://www.google-analytics.com".to_string(), "https://cdn.shop.example".to_string()],
            critical: vec![
                PreloadTarget {
                    href: "/fonts/inter-var.woff2".to_string(),
                    destination: "font".to_string(),
                    mime_type: Some("font/woff2".to_string()),
                    crossorigin: true,
                    fetch_priority: Some("high".to_string()),
                },
                PreloadTarget {
                    href: "/css/critical.css".to_string(),
                    destination: "style".to_string(),
                    mime_type: None,
                    crossorigin: false,
                    fetch_priority: Some("high".to_string()),
                },
            ],
            likely_next: vec!["/products".to_string(), "/cart".to_string(), "/checkout".to_string()],
            prefetch_delay_ms: 2000,
        }
    }
}
