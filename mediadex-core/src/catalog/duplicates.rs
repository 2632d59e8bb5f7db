use std::collections::{BTreeMap, HashMap, HashSet};

use sqlx::{PgPool, Row};

use mediadex_model::{
    CatalogFile, DuplicateGroup, DuplicateGroupId, DuplicateGroupStatus, FileId,
};

use crate::error::Result;

/// Persistence surface for duplicate groups plus the candidate loader the
/// detection engine pages through.
#[derive(Clone, Debug)]
pub struct DuplicateGroupRepository {
    pool: PgPool,
}

impl DuplicateGroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// One page of candidate files with their metadata key/value pairs.
    ///
    /// `include` and `exclude` are path prefixes; an empty include list
    /// matches everything. Ordered by id so paging is stable.
    pub async fn candidates(
        &self,
        include: &[String],
        exclude: &[String],
        limit: i64,
        offset: i64,
    ) -> Result<Vec<(CatalogFile, BTreeMap<String, String>)>> {
        let include_patterns: Vec<String> =
            include.iter().map(|p| format!("{p}%")).collect();
        let exclude_patterns: Vec<String> =
            exclude.iter().map(|p| format!("{p}%")).collect();

        let files = sqlx::query_as::<_, CatalogFile>(
            r#"
            SELECT id, storage_root_id, path, name, parent_id, is_directory,
                   size, last_modified, hash, extension, mime_type,
                   created_at, updated_at, last_scan_at
            FROM files
            WHERE NOT is_directory
              AND (cardinality($1::text[]) = 0 OR path LIKE ANY($1::text[]))
              AND (cardinality($2::text[]) = 0 OR NOT (path LIKE ANY($2::text[])))
            ORDER BY id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(&include_patterns)
        .bind(&exclude_patterns)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        if files.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = files.iter().map(|f| f.id.as_i64()).collect();
        let rows = sqlx::query(
            r#"
            SELECT file_id, key, value
            FROM file_metadata
            WHERE file_id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut metadata: HashMap<i64, BTreeMap<String, String>> = HashMap::new();
        for row in rows {
            let file_id: i64 = row.try_get("file_id")?;
            let key: String = row.try_get("key")?;
            let value: String = row.try_get("value")?;
            metadata.entry(file_id).or_default().insert(key, value);
        }

        Ok(files
            .into_iter()
            .map(|file| {
                let meta = metadata.remove(&file.id.as_i64()).unwrap_or_default();
                (file, meta)
            })
            .collect())
    }

    /// File ids already sitting in a non-dismissed group.
    pub async fn grouped_file_ids(&self) -> Result<HashSet<FileId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT i.file_id
            FROM duplicate_group_items i
            JOIN duplicate_groups g ON g.id = i.group_id
            WHERE g.status <> 'dismissed'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(FileId).collect())
    }

    /// Persist a detected group and its membership atomically.
    pub async fn persist(&self, group: &DuplicateGroup) -> Result<DuplicateGroupId> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO duplicate_groups (
                media_type, primary_file_id, confidence, detection_method,
                status, auto_resolved, detected_by, detected_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(group.media_type.as_str())
        .bind(group.primary_item.file_id.as_i64())
        .bind(group.confidence as f32)
        .bind(group.detection_method.as_str())
        .bind(group.status.as_str())
        .bind(group.auto_resolved)
        .bind(group.detected_by)
        .bind(group.detected_at)
        .fetch_one(&mut *tx)
        .await?;

        for item in std::iter::once(&group.primary_item).chain(&group.duplicate_items) {
            sqlx::query(
                r#"
                INSERT INTO duplicate_group_items (group_id, file_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(id)
            .bind(item.file_id.as_i64())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(DuplicateGroupId(id))
    }

    /// Review transition. Only pending groups move; confirmed and dismissed
    /// are terminal.
    pub async fn set_status(
        &self,
        id: DuplicateGroupId,
        status: DuplicateGroupStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE duplicate_groups
            SET status = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_i64())
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
