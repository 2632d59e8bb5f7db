//! Settings for the catalog core. Everything here deserializes from the host
//! application's configuration layer and carries working defaults.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use mediadex_model::{CacheNamespace, StorageProtocol};

/// Tunables for the persistent cache service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Per-namespace TTL overrides, in seconds. Namespaces not listed use
    /// their built-in defaults.
    pub ttl_overrides_secs: BTreeMap<String, u64>,
    /// Hard timeout for one background activity write.
    pub activity_write_timeout_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_overrides_secs: BTreeMap::new(),
            activity_write_timeout_secs: 5,
        }
    }
}

impl CacheSettings {
    /// Effective TTL for a namespace, honoring overrides.
    pub fn ttl_for(&self, namespace: CacheNamespace) -> Duration {
        self.ttl_overrides_secs
            .get(namespace.prefix())
            .map(|secs| Duration::from_secs(*secs))
            .unwrap_or_else(|| namespace.default_ttl())
    }

    pub fn activity_write_timeout(&self) -> Duration {
        Duration::from_secs(self.activity_write_timeout_secs)
    }
}

/// Tunables for the universal rename tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenameSettings {
    /// Hard capacity of the in-memory pending-move table.
    pub pending_capacity: usize,
    /// Fraction of the table evicted (oldest first) when capacity is hit.
    pub eviction_fraction: f64,
    /// Reaper cadence for expired pending moves.
    pub cleanup_interval_secs: u64,
    /// Per-protocol move-window overrides, in seconds.
    pub window_overrides_secs: BTreeMap<String, u64>,
}

impl Default for RenameSettings {
    fn default() -> Self {
        Self {
            pending_capacity: 10_000,
            eviction_fraction: 0.10,
            cleanup_interval_secs: 30,
            window_overrides_secs: BTreeMap::new(),
        }
    }
}

impl RenameSettings {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Override for a protocol's move window, if configured.
    pub fn window_override(&self, protocol: StorageProtocol) -> Option<Duration> {
        self.window_overrides_secs
            .get(protocol.as_str())
            .map(|secs| Duration::from_secs(*secs))
    }
}

/// Tunables for the duplicate detection engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupSettings {
    /// Default minimum similarity when a request does not specify one.
    pub min_similarity: f64,
    /// Candidate page size when loading items from the catalog.
    pub batch_size: usize,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            min_similarity: 0.8,
            batch_size: 500,
        }
    }
}

/// Aggregate settings for the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub cache: CacheSettings,
    pub rename: RenameSettings,
    pub dedup: DedupSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CoreConfig::default();
        assert_eq!(config.rename.pending_capacity, 10_000);
        assert_eq!(config.rename.cleanup_interval(), Duration::from_secs(30));
        assert_eq!(config.cache.activity_write_timeout(), Duration::from_secs(5));
        assert_eq!(config.dedup.batch_size, 500);
    }

    #[test]
    fn ttl_override_wins() {
        let mut settings = CacheSettings::default();
        settings
            .ttl_overrides_secs
            .insert("api".to_string(), 120);
        assert_eq!(settings.ttl_for(CacheNamespace::Api), Duration::from_secs(120));
        assert_eq!(
            settings.ttl_for(CacheNamespace::Lyrics),
            CacheNamespace::Lyrics.default_ttl()
        );
    }

    #[test]
    fn deserializes_partial_config() {
        let config: CoreConfig =
            serde_json::from_str(r#"{"rename":{"pending_capacity":50}}"#).unwrap();
        assert_eq!(config.rename.pending_capacity, 50);
        assert_eq!(config.dedup.min_similarity, 0.8);
    }
}
