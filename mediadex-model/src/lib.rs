//! Core data model definitions shared across Mediadex crates.
#![allow(missing_docs)]

pub mod cache;
pub mod duplicates;
pub mod error;
pub mod files;
pub mod ids;
pub mod media_type;
pub mod protocol;
pub mod rename;

// Intentionally curated re-exports for downstream consumers.
pub use cache::{
    CacheActivity, CacheNamespace, CacheStats, CacheTypeStats,
};
pub use duplicates::{
    DetectionMethod, DuplicateDetectionRequest, DuplicateGroup,
    DuplicateGroupStatus, DuplicateItem, ItemMetadata, SimilarityAnalysis,
};
pub use error::{ModelError, Result as ModelResult};
pub use files::{CatalogFile, StorageRoot};
pub use ids::{DuplicateGroupId, FileId, RenameEventId, StorageRootId};
pub use media_type::MediaType;
pub use protocol::StorageProtocol;
pub use rename::{
    PendingMove, RenameEvent, RenameEventStatus, RenameTrackerStats,
};
