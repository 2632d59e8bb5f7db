use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Typed cache namespaces. The prefix of a cache key decides its namespace;
/// keys with an unrecognized prefix are counted as `Generic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CacheNamespace {
    Metadata,
    Api,
    Thumbnail,
    Translation,
    Subtitle,
    Lyrics,
    CoverArt,
    Generic,
}

impl CacheNamespace {
    pub const ALL: [CacheNamespace; 8] = [
        CacheNamespace::Metadata,
        CacheNamespace::Api,
        CacheNamespace::Thumbnail,
        CacheNamespace::Translation,
        CacheNamespace::Subtitle,
        CacheNamespace::Lyrics,
        CacheNamespace::CoverArt,
        CacheNamespace::Generic,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            CacheNamespace::Metadata => "metadata",
            CacheNamespace::Api => "api",
            CacheNamespace::Thumbnail => "thumbnail",
            CacheNamespace::Translation => "translation",
            CacheNamespace::Subtitle => "subtitle",
            CacheNamespace::Lyrics => "lyrics",
            CacheNamespace::CoverArt => "coverart",
            CacheNamespace::Generic => "generic",
        }
    }

    /// Default time-to-live applied by the namespaced helpers.
    pub fn default_ttl(&self) -> Duration {
        const HOUR: u64 = 60 * 60;
        const DAY: u64 = 24 * HOUR;
        match self {
            CacheNamespace::Metadata => Duration::from_secs(7 * DAY),
            CacheNamespace::Api => Duration::from_secs(HOUR),
            CacheNamespace::Thumbnail => Duration::from_secs(30 * DAY),
            CacheNamespace::Translation => Duration::from_secs(30 * DAY),
            CacheNamespace::Subtitle => Duration::from_secs(7 * DAY),
            CacheNamespace::Lyrics => Duration::from_secs(14 * DAY),
            CacheNamespace::CoverArt => Duration::from_secs(30 * DAY),
            CacheNamespace::Generic => Duration::from_secs(DAY),
        }
    }

    /// Classify a cache key by its prefix.
    pub fn from_key(key: &str) -> Self {
        let prefix = key.split(':').next().unwrap_or_default();
        match prefix {
            "metadata" => CacheNamespace::Metadata,
            "api" => CacheNamespace::Api,
            "thumbnail" => CacheNamespace::Thumbnail,
            "translation" => CacheNamespace::Translation,
            "subtitle" => CacheNamespace::Subtitle,
            "lyrics" => CacheNamespace::Lyrics,
            "coverart" => CacheNamespace::CoverArt,
            _ => CacheNamespace::Generic,
        }
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// One best-effort telemetry record. Loss is tolerable.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheActivity {
    pub activity_type: String,
    pub cache_key: String,
    pub provider: Option<String>,
    pub hit: bool,
    pub timestamp: DateTime<Utc>,
}

/// Entry count and serialized size for one namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheTypeStats {
    pub entries: i64,
    pub size_bytes: i64,
}

/// Aggregate cache statistics. Non-essential breakdowns may be partial when
/// their subqueries fail.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheStats {
    pub total_entries: i64,
    pub total_size_bytes: i64,
    pub caches_by_type: BTreeMap<String, CacheTypeStats>,
    pub entries_by_provider: BTreeMap<String, i64>,
    pub recent_activity: Vec<CacheActivity>,
    /// Hit ratio over the trailing 24 hours, in [0, 1].
    pub hit_rate_24h: f64,
}
