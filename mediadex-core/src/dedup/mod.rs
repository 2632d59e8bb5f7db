//! Duplicate detection engine: multi-signal similarity over catalog items,
//! union-find grouping, and primary election.

pub mod engine;
pub mod fingerprint;
pub mod groups;
pub mod items;
pub mod metadata;
pub mod text;

pub use engine::{DuplicateEngine, analyze_pair, group_media_items};
pub use fingerprint::{fingerprint_similarity, hash_bytes, hash_file, segment_digest};
pub use groups::{ScoredPair, UnionFind, elect_primary, merge_pairs};
pub use items::build_item;
pub use metadata::{file_similarity, metadata_similarity};
