use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use mediadex_model::{CatalogFile, FileId, StorageRootId};

use crate::error::Result;

/// New file row for fresh ingestion (a create with no matching delete).
#[derive(Debug, Clone)]
pub struct NewFile<'a> {
    pub storage_root_id: StorageRootId,
    pub path: &'a str,
    pub is_directory: bool,
    pub size: i64,
    pub last_modified: DateTime<Utc>,
    pub hash: Option<&'a str>,
    pub extension: Option<&'a str>,
    pub mime_type: Option<&'a str>,
}

#[derive(Clone, Debug)]
pub struct FileRepository {
    pool: PgPool,
}

impl FileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert or refresh a file row. The unique `(storage_root_id, path)`
    /// constraint turns repeated scans of the same path into updates.
    pub async fn upsert(&self, file: NewFile<'_>) -> Result<FileId> {
        let name = CatalogFile::name_from_path(file.path);
        let parent_id = match CatalogFile::parent_path(file.path) {
            Some(parent) => {
                Self::parent_id_by_path(
                    &mut *self.pool.acquire().await?,
                    file.storage_root_id,
                    parent,
                )
                .await?
            }
            None => None,
        };

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO files (
                storage_root_id, path, name, parent_id, is_directory, size,
                last_modified, hash, extension, mime_type, last_scan_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            ON CONFLICT (storage_root_id, path) DO UPDATE
            SET size = EXCLUDED.size,
                last_modified = EXCLUDED.last_modified,
                hash = EXCLUDED.hash,
                extension = EXCLUDED.extension,
                mime_type = EXCLUDED.mime_type,
                updated_at = NOW(),
                last_scan_at = NOW()
            RETURNING id
            "#,
        )
        .bind(file.storage_root_id.as_i64())
        .bind(file.path)
        .bind(name)
        .bind(parent_id.map(|id| id.as_i64()))
        .bind(file.is_directory)
        .bind(file.size)
        .bind(file.last_modified)
        .bind(file.hash)
        .bind(file.extension)
        .bind(file.mime_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(FileId(id))
    }

    pub async fn by_path(
        &self,
        storage_root_id: StorageRootId,
        path: &str,
    ) -> Result<Option<CatalogFile>> {
        let file = sqlx::query_as::<_, CatalogFile>(
            r#"
            SELECT id, storage_root_id, path, name, parent_id, is_directory,
                   size, last_modified, hash, extension, mime_type,
                   created_at, updated_at, last_scan_at
            FROM files
            WHERE storage_root_id = $1 AND path = $2
            "#,
        )
        .bind(storage_root_id.as_i64())
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }

    /// All rows at or under `path`, parents before children so path rewrites
    /// can resolve the new parent of every child.
    pub async fn subtree(
        conn: &mut PgConnection,
        storage_root_id: StorageRootId,
        path: &str,
    ) -> Result<Vec<CatalogFile>> {
        let rows = sqlx::query_as::<_, CatalogFile>(
            r#"
            SELECT id, storage_root_id, path, name, parent_id, is_directory,
                   size, last_modified, hash, extension, mime_type,
                   created_at, updated_at, last_scan_at
            FROM files
            WHERE storage_root_id = $1
              AND (path = $2 OR path LIKE $2 || '/%')
            ORDER BY LENGTH(path) ASC
            "#,
        )
        .bind(storage_root_id.as_i64())
        .bind(path)
        .fetch_all(conn)
        .await?;

        Ok(rows)
    }

    /// Parent row id for a path. A missing parent is represented as NULL
    /// rather than an error; the scanner may not have ingested it yet.
    pub async fn parent_id_by_path(
        conn: &mut PgConnection,
        storage_root_id: StorageRootId,
        path: &str,
    ) -> Result<Option<FileId>> {
        let id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM files
            WHERE storage_root_id = $1 AND path = $2 AND is_directory
            "#,
        )
        .bind(storage_root_id.as_i64())
        .bind(path)
        .fetch_optional(conn)
        .await?;

        Ok(id.map(FileId))
    }

    /// Rewrite one row's location fields inside a move transaction.
    pub async fn rewrite_location(
        conn: &mut PgConnection,
        id: FileId,
        new_path: &str,
        new_name: &str,
        new_parent: Option<FileId>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE files
            SET path = $2,
                name = $3,
                parent_id = $4,
                updated_at = NOW(),
                last_scan_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .bind(new_path)
        .bind(new_name)
        .bind(new_parent.map(|id| id.as_i64()))
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn delete(&self, id: FileId) -> Result<()> {
        sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
