use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::ModelError;
use crate::ids::{FileId, RenameEventId, StorageRootId};
use crate::protocol::StorageProtocol;

/// A delete event retained briefly in the hope it will be paired with a
/// matching create. In-memory only; never persisted.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PendingMove {
    pub file_id: FileId,
    pub old_path: String,
    pub storage_root_id: StorageRootId,
    pub protocol: StorageProtocol,
    pub size: i64,
    pub hash: Option<String>,
    pub is_directory: bool,
    pub deleted_at: DateTime<Utc>,
    /// Protocol-provided identity hints (inode, etag, fileid, ...).
    pub protocol_data: BTreeMap<String, String>,
}

/// Lifecycle of a persisted rename event. Terminal states are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RenameEventStatus {
    Pending,
    Processed,
    Failed,
}

impl RenameEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenameEventStatus::Pending => "pending",
            RenameEventStatus::Processed => "processed",
            RenameEventStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RenameEventStatus::Pending)
    }
}

impl fmt::Display for RenameEventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenameEventStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RenameEventStatus::Pending),
            "processed" => Ok(RenameEventStatus::Processed),
            "failed" => Ok(RenameEventStatus::Failed),
            other => Err(ModelError::Invalid(format!("rename event status: {other}"))),
        }
    }
}

/// Append-only audit record of a detected move.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RenameEvent {
    pub id: RenameEventId,
    pub storage_root_id: StorageRootId,
    pub protocol: StorageProtocol,
    pub old_path: String,
    pub new_path: String,
    pub is_directory: bool,
    pub size: i64,
    pub file_hash: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub status: RenameEventStatus,
}

#[cfg(feature = "sqlx")]
impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for RenameEvent {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        let protocol: String = row.try_get("protocol")?;
        let protocol = StorageProtocol::from_str(&protocol)
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "protocol".into(),
                source: Box::new(e),
            })?;
        let status: String = row.try_get("status")?;
        let status = RenameEventStatus::from_str(&status)
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "status".into(),
                source: Box::new(e),
            })?;

        Ok(Self {
            id: row.try_get("id")?,
            storage_root_id: row.try_get("storage_root_id")?,
            protocol,
            old_path: row.try_get("old_path")?,
            new_path: row.try_get("new_path")?,
            is_directory: row.try_get("is_directory")?,
            size: row.try_get("size")?,
            file_hash: row.try_get("file_hash")?,
            detected_at: row.try_get("detected_at")?,
            processed_at: row.try_get("processed_at")?,
            status,
        })
    }
}

/// Point-in-time snapshot of the rename tracker.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RenameTrackerStats {
    pub pending: usize,
    pub capacity: usize,
    pub pending_by_protocol: BTreeMap<String, usize>,
    pub oldest_pending_secs: Option<i64>,
    pub tracked_deletes: u64,
    pub matched_creates: u64,
    pub processed_moves: u64,
    pub failed_moves: u64,
}
