//! Persistent cache service: typed namespaces over the catalog database
//! with TTL expiry and best-effort activity telemetry.

pub mod activity;
pub mod keys;
pub mod service;
pub mod stats;

pub use activity::ActivityRecorder;
pub use keys::{CacheKeys, md5_hex, request_fingerprint};
pub use service::{CacheService, CachedThumbnail};
