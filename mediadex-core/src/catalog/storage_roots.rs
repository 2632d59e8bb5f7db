use sqlx::PgPool;

use mediadex_model::{StorageProtocol, StorageRoot, StorageRootId};

use crate::error::Result;

#[derive(Clone, Debug)]
pub struct StorageRootRepository {
    pool: PgPool,
}

impl StorageRootRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, name: &str, protocol: StorageProtocol) -> Result<StorageRootId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO storage_roots (name, protocol)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(protocol.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(StorageRootId(id))
    }

    pub async fn by_name(&self, name: &str) -> Result<Option<StorageRoot>> {
        let root = sqlx::query_as::<_, StorageRoot>(
            r#"
            SELECT id, name, protocol
            FROM storage_roots
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(root)
    }

    pub async fn by_id(&self, id: StorageRootId) -> Result<Option<StorageRoot>> {
        let root = sqlx::query_as::<_, StorageRoot>(
            r#"
            SELECT id, name, protocol
            FROM storage_roots
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(root)
    }
}
