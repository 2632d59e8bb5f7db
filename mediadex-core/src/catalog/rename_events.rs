use sqlx::{PgConnection, PgPool};

use mediadex_model::{
    PendingMove, RenameEvent, RenameEventId, RenameEventStatus,
};

use crate::error::Result;

/// Append-only audit surface over `universal_rename_events`. Terminal rows
/// are never rewritten; the status guard lives in the SQL itself.
#[derive(Clone, Debug)]
pub struct RenameEventRepository {
    pool: PgPool,
}

impl RenameEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append a pending event inside the move transaction.
    pub async fn insert_pending(
        conn: &mut PgConnection,
        mv: &PendingMove,
        new_path: &str,
    ) -> Result<RenameEventId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO universal_rename_events (
                storage_root_id, protocol, old_path, new_path,
                is_directory, size, file_hash, detected_at, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending')
            RETURNING id
            "#,
        )
        .bind(mv.storage_root_id.as_i64())
        .bind(mv.protocol.as_str())
        .bind(&mv.old_path)
        .bind(new_path)
        .bind(mv.is_directory)
        .bind(mv.size)
        .bind(&mv.hash)
        .bind(mv.deleted_at)
        .fetch_one(conn)
        .await?;

        Ok(RenameEventId(id))
    }

    /// Transition pending -> processed. A terminal row is left untouched.
    pub async fn mark_processed(conn: &mut PgConnection, id: RenameEventId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE universal_rename_events
            SET status = 'processed', processed_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_i64())
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Record a failed move. Runs outside the rolled-back transaction so the
    /// audit row survives.
    pub async fn insert_failed(&self, mv: &PendingMove, new_path: &str) -> Result<RenameEventId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO universal_rename_events (
                storage_root_id, protocol, old_path, new_path,
                is_directory, size, file_hash, detected_at, processed_at, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), 'failed')
            RETURNING id
            "#,
        )
        .bind(mv.storage_root_id.as_i64())
        .bind(mv.protocol.as_str())
        .bind(&mv.old_path)
        .bind(new_path)
        .bind(mv.is_directory)
        .bind(mv.size)
        .bind(&mv.hash)
        .bind(mv.deleted_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(RenameEventId(id))
    }

    pub async fn by_id(&self, id: RenameEventId) -> Result<Option<RenameEvent>> {
        let event = sqlx::query_as::<_, RenameEvent>(
            r#"
            SELECT id, storage_root_id, protocol, old_path, new_path,
                   is_directory, size, file_hash, detected_at, processed_at, status
            FROM universal_rename_events
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    /// Latest events, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<RenameEvent>> {
        let events = sqlx::query_as::<_, RenameEvent>(
            r#"
            SELECT id, storage_root_id, protocol, old_path, new_path,
                   is_directory, size, file_hash, detected_at, processed_at, status
            FROM universal_rename_events
            ORDER BY detected_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Count of events in a given status, for operator dashboards.
    pub async fn count_by_status(&self, status: RenameEventStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM universal_rename_events WHERE status = $1",
        )
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
