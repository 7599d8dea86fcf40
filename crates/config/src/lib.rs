//! Configuration for the swkit offline layer.
//!
//! Loaded in layers with [`figment`]: built-in defaults, then an optional
//! TOML/JSON/YAML file, then `SWKIT_`-prefixed environment variables (with
//! `__` separating nested keys, e.g. `SWKIT_SYNC__MAX_ATTEMPTS=10`).

pub mod error;
mod hints;
mod partition;

pub use crate::hints::{ConnectTarget, HintsConfig, PreloadTarget};
pub use crate::partition::{Partition, PartitionPolicy, Routes, Strategy};
use crate::error::{ErrorKind, Result};
use crate::partition::default_policies;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const ENV_PREFIX: &str = "SWKIT_";

/// Background sync retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Tag registered with the platform's background sync capability
    pub tag: String,
    /// Durable storage key the queue is persisted under
    pub storage_key: String,
    /// Replays allowed per item before it is dropped; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Delay before the first retry, doubled after every failure; `0`
    /// retries on every pass
    pub backoff_base_ms: u64,
}
impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tag: "background-sync".to_string(),
            storage_key: "sync-queue".to_string(),
            max_attempts: Some(5),
            backoff_base_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushConfig {
    /// VAPID public key handed to the push service on subscribe
    pub application_server_key: Option<String>,
}

/// Complete service worker configuration.
///
/// Every field has a default, so an empty file (or no file at all) is a
/// valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwConfig {
    /// Product prefix shared by every store this worker owns
    pub prefix: String,
    /// Deployment version; bump it to roll every partition over to new stores
    pub version: String,
    pub partitions: BTreeMap<Partition, PartitionPolicy>,
    pub routes: Routes,
    /// URLs fetched into the static partition on install
    pub precache: Vec<String>,
    pub sync: SyncConfig,
    pub hints: HintsConfig,
    pub push: PushConfig,
}
impl Default for SwConfig {
    fn default() -> Self {
        Self {
            prefix: "storefront".to_string(),
            version: "v1".to_string(),
            partitions: default_policies(),
            routes: Routes::default(),
            precache: ["/", "/offline.html", "/manifest.webmanifest"].map(String::from).to_vec(),
            sync: SyncConfig::default(),
            hints: HintsConfig::default(),
            push: PushConfig::default(),
        }
    }
}

impl SwConfig {
    /// Layered configuration sources, before extraction.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file {
            // Figment treats a missing file as empty; an explicit path that
            // doesn't exist is a mistake.
            if !path.is_file() {
                exn::bail!(ErrorKind::Load(format!("{} does not exist", path.display())));
            }
            let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
            figment = match extension.as_deref() {
                Some("toml") => figment.merge(Toml::file_exact(path)),
                Some("json") => figment.merge(Json::file_exact(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load and validate configuration.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(file)?.extract().map_err(|e| ErrorKind::Load(e.to_string()))?;
        config.validate().or_raise(|| ErrorKind::Load("validation failed".to_string()))?;
        tracing::debug!(prefix = %config.prefix, version = %config.version, "Loaded configuration");
        Ok(config)
    }

    /// Check the rules that can't be expressed in the type system.
    pub fn validate(&self) -> Result<()> {
        for (label, value) in [("prefix", &self.prefix), ("version", &self.version)] {
            let legal = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.');
            if value.is_empty() || !value.chars().all(legal) {
                exn::bail!(ErrorKind::Invalid(format!("{label} {value:?} must be non-empty [A-Za-z0-9_.]")));
            }
        }
        if let Some((partition, _)) = self.partitions.iter().find(|(_, policy)| policy.max_entries == 0) {
            exn::bail!(ErrorKind::Invalid(format!("partition {partition} must allow at least one entry")));
        }
        if self.sync.max_attempts == Some(0) {
            exn::bail!(ErrorKind::Invalid("sync.max_attempts must be at least 1".to_string()));
        }
        if url::Url::parse(&self.hints.origin).is_err() {
            exn::bail!(ErrorKind::Invalid(format!("hints.origin {:?} is not an absolute URL", self.hints.origin)));
        }
        Ok(())
    }

    /// Policy for a partition, falling back to the built-in default when the
    /// configuration leaves it out.
    pub fn policy(&self, partition: Partition) -> PartitionPolicy {
        self.partitions
            .get(&partition)
            .cloned()
            .or_else(|| default_policies().remove(&partition))
            .unwrap_or_else(|| PartitionPolicy::new(Strategy::NetworkFirst, 0, 1))
    }

    /// Versioned store name for a partition: `<prefix>-<partition>-<version>`.
    pub fn store_name(&self, partition: Partition) -> String {
        format!("{}-{}-{}", self.prefix, partition, self.version)
    }

    /// Store names for every partition at the current version.
    pub fn current_store_names(&self) -> Vec<String> {
        Partition::ALL.iter().map(|p| self.store_name(*p)).collect()
    }

    /// Whether a store name belongs to this product (any version).
    pub fn owns_store(&self, name: &str) -> bool {
        name.strip_prefix(self.prefix.as_str()).is_some_and(|rest| rest.starts_with('-'))
    }

    /// Partition a request URL belongs to.
    pub fn classify(&self, url: &str) -> Partition {
        self.routes.classify(url)
    }
}
