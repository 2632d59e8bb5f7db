use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ModelError;
use crate::ids::{DuplicateGroupId, FileId};
use crate::media_type::MediaType;

/// Per-type metadata fields consulted during similarity scoring. All fields
/// are optional; absent fields drop out of the comparison entirely.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ItemMetadata {
    pub year: Option<i32>,
    pub director: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub version: Option<String>,
    pub platform: Option<String>,
    pub duration_ms: Option<i64>,
    pub bitrate: Option<i64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub quality: Option<String>,
    pub format: Option<String>,
}

/// Denormalized projection of a catalog file used for pairwise comparison.
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DuplicateItem {
    pub file_id: FileId,
    pub media_type: MediaType,
    pub title: String,
    pub path: String,
    pub file_name: String,
    pub size: i64,
    pub hash: Option<String>,
    pub last_modified: DateTime<Utc>,
    /// Namespace -> id, e.g. `tmdb`, `musicbrainz`, `isbn`.
    pub external_ids: BTreeMap<String, String>,
    /// Fingerprint namespace -> hex digest, e.g. `audio`, `video_phash`.
    pub fingerprints: BTreeMap<String, String>,
    pub metadata: ItemMetadata,
}

impl fmt::Debug for DuplicateItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplicateItem")
            .field("file_id", &self.file_id)
            .field("media_type", &self.media_type)
            .field("title", &self.title)
            .field("path", &self.path)
            .field("size", &self.size)
            .field("has_hash", &self.hash.is_some())
            .field("external_ids", &self.external_ids.len())
            .field("fingerprints", &self.fingerprints.len())
            .finish()
    }
}

/// Outcome of a pairwise comparison. Sub-scores are `None` when neither side
/// carried the signal; such signals are excluded from the weighted average.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimilarityAnalysis {
    pub overall_score: f64,
    pub title_score: Option<f64>,
    pub metadata_score: Option<f64>,
    pub fingerprint_score: Option<f64>,
    pub file_score: Option<f64>,
    pub hash_match: bool,
    pub external_id_match: bool,
    pub matching_fields: Vec<String>,
}

/// Strongest signal that produced a duplicate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DetectionMethod {
    Hash,
    ExternalId,
    Composite,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Hash => "file_hash",
            DetectionMethod::ExternalId => "external_id",
            DetectionMethod::Composite => "similarity",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMethod {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file_hash" | "hash" => Ok(DetectionMethod::Hash),
            "external_id" => Ok(DetectionMethod::ExternalId),
            "similarity" | "composite" => Ok(DetectionMethod::Composite),
            other => Err(ModelError::Invalid(format!("detection method: {other}"))),
        }
    }
}

/// Review status of a persisted duplicate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DuplicateGroupStatus {
    Pending,
    Confirmed,
    Dismissed,
}

impl DuplicateGroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateGroupStatus::Pending => "pending",
            DuplicateGroupStatus::Confirmed => "confirmed",
            DuplicateGroupStatus::Dismissed => "dismissed",
        }
    }
}

impl fmt::Display for DuplicateGroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DuplicateGroupStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DuplicateGroupStatus::Pending),
            "confirmed" => Ok(DuplicateGroupStatus::Confirmed),
            "dismissed" => Ok(DuplicateGroupStatus::Dismissed),
            other => Err(ModelError::Invalid(format!("group status: {other}"))),
        }
    }
}

/// A set of items believed to refer to the same underlying work.
///
/// Invariants: all items share `media_type`; `confidence` is at least the
/// minimum similarity in force when the group was detected; the primary item
/// is a member of the group.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DuplicateGroup {
    pub id: Option<DuplicateGroupId>,
    pub media_type: MediaType,
    pub primary_item: DuplicateItem,
    pub duplicate_items: Vec<DuplicateItem>,
    pub confidence: f64,
    pub detection_method: DetectionMethod,
    pub status: DuplicateGroupStatus,
    pub auto_resolved: bool,
    pub detected_by: Option<Uuid>,
    pub detected_at: DateTime<Utc>,
}

impl DuplicateGroup {
    /// Total member count including the primary.
    pub fn len(&self) -> usize {
        self.duplicate_items.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Parameters of one detection run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DuplicateDetectionRequest {
    /// Empty = all supported media types.
    pub media_types: Vec<MediaType>,
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    /// Pairs scoring below this are not grouped. Range [0, 1].
    pub min_similarity: f64,
    /// Empty = all detection methods.
    pub detection_methods: Vec<DetectionMethod>,
    /// When false, items already sitting in a persisted group are skipped.
    pub include_existing: bool,
    pub batch_size: usize,
    pub user_id: Option<Uuid>,
}

impl Default for DuplicateDetectionRequest {
    fn default() -> Self {
        Self {
            media_types: Vec::new(),
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
            min_similarity: 0.8,
            detection_methods: Vec::new(),
            include_existing: true,
            batch_size: 500,
            user_id: None,
        }
    }
}
