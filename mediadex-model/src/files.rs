use std::fmt;
#[cfg(feature = "sqlx")]
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::ids::{FileId, StorageRootId};
use crate::protocol::StorageProtocol;

/// A registered storage backend root. `name` is unique across the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StorageRoot {
    pub id: StorageRootId,
    pub name: String,
    pub protocol: StorageProtocol,
}

#[cfg(feature = "sqlx")]
impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StorageRoot {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        let protocol: String = row.try_get("protocol")?;
        let protocol = StorageProtocol::from_str(&protocol)
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "protocol".into(),
                source: Box::new(e),
            })?;

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            protocol,
        })
    }
}

/// One indexed file or directory within a storage root.
///
/// Invariants: `(storage_root_id, path)` is unique; a set `parent_id` points
/// at a directory in the same root; directories carry `size = 0` and no hash.
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CatalogFile {
    pub id: FileId,
    pub storage_root_id: StorageRootId,
    pub path: String,
    pub name: String,
    pub parent_id: Option<FileId>,
    pub is_directory: bool,
    pub size: i64,
    pub last_modified: DateTime<Utc>,
    pub hash: Option<String>,
    pub extension: Option<String>,
    pub mime_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_scan_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for CatalogFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogFile")
            .field("id", &self.id)
            .field("storage_root_id", &self.storage_root_id)
            .field("path", &self.path)
            .field("is_directory", &self.is_directory)
            .field("size", &self.size)
            .field("has_hash", &self.hash.is_some())
            .field("last_modified", &self.last_modified)
            .finish()
    }
}

impl CatalogFile {
    /// Final path segment. Falls back to the whole path for root entries.
    pub fn name_from_path(path: &str) -> &str {
        path.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or(path)
    }

    /// Parent path, or `None` for top-level entries.
    pub fn parent_path(path: &str) -> Option<&str> {
        let idx = path.rfind('/')?;
        if idx == 0 { None } else { Some(&path[..idx]) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_helpers() {
        assert_eq!(CatalogFile::name_from_path("/a/b/c.mkv"), "c.mkv");
        assert_eq!(CatalogFile::name_from_path("/a"), "a");
        assert_eq!(CatalogFile::parent_path("/a/b/c.mkv"), Some("/a/b"));
        assert_eq!(CatalogFile::parent_path("/a"), None);
    }
}
