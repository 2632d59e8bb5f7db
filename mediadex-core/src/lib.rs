//! Mediadex core: the engine behind the media catalog.
//!
//! Three subsystems carry the weight: the persistent [`cache`] service, the
//! universal [`rename`] tracker, and the duplicate-detection [`dedup`]
//! engine. They share the [`catalog`] SQL surface and the data model from
//! `mediadex-model`.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fs;
pub mod media;
pub mod rename;

pub use cache::{CacheKeys, CacheService, request_fingerprint};
pub use config::{CacheSettings, CoreConfig, DedupSettings, RenameSettings};
pub use dedup::DuplicateEngine;
pub use error::{CatalogError, Result};
pub use fs::{FileSystemClient, LocalFileSystemClient};
pub use rename::{ProtocolRegistry, UniversalRenameTracker};

/// Schema migrations, applied with `MIGRATOR.run(&pool)` at startup and by
/// `#[sqlx::test]` fixtures.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
