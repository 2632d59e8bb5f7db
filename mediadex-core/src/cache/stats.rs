use sqlx::{PgPool, Row};
use tracing::warn;

use mediadex_model::{CacheActivity, CacheStats, CacheTypeStats};

use crate::cache::service::CacheService;
use crate::error::Result;

impl CacheService {
    /// Aggregate statistics across every cache namespace.
    ///
    /// The entry/size totals are authoritative; the breakdowns and activity
    /// windows are best-effort — a failing subquery logs a warning and
    /// leaves its section empty rather than failing the whole call.
    pub async fn stats(&self) -> Result<CacheStats> {
        let Some(pool) = self.pool() else {
            return Ok(CacheStats::default());
        };

        let mut stats = CacheStats::default();

        for (table, payload_column, namespace) in [
            ("cache_entries", "value", None),
            ("media_metadata_cache", "data", Some("metadata")),
            ("api_cache", "response", Some("api")),
            ("thumbnail_cache", "url", Some("thumbnail")),
        ] {
            let row = sqlx::query(&format!(
                "SELECT COUNT(*) AS entries, COALESCE(SUM(LENGTH({payload_column})), 0) AS bytes FROM {table}"
            ))
            .fetch_one(pool)
            .await?;

            let entries: i64 = row.try_get("entries")?;
            let bytes: i64 = row.try_get("bytes")?;
            stats.total_entries += entries;
            stats.total_size_bytes += bytes;

            if let Some(name) = namespace {
                stats
                    .caches_by_type
                    .insert(name.to_string(), CacheTypeStats { entries, size_bytes: bytes });
            }
        }

        // Generic entries classify by key prefix.
        match self.generic_breakdown(pool).await {
            Ok(breakdown) => {
                for (name, typed) in breakdown {
                    let slot = stats.caches_by_type.entry(name).or_default();
                    slot.entries += typed.entries;
                    slot.size_bytes += typed.size_bytes;
                }
            }
            Err(err) => warn!("cache stats: prefix breakdown failed: {}", err),
        }

        match self.provider_breakdown(pool).await {
            Ok(providers) => stats.entries_by_provider = providers,
            Err(err) => warn!("cache stats: provider breakdown failed: {}", err),
        }

        match self.recent_activity(pool).await {
            Ok(recent) => stats.recent_activity = recent,
            Err(err) => warn!("cache stats: activity query failed: {}", err),
        }

        match self.hit_rate_24h(pool).await {
            Ok(rate) => stats.hit_rate_24h = rate,
            Err(err) => warn!("cache stats: hit-rate query failed: {}", err),
        }

        Ok(stats)
    }

    async fn generic_breakdown(
        &self,
        pool: &PgPool,
    ) -> Result<Vec<(String, CacheTypeStats)>> {
        let rows = sqlx::query(
            r#"
            SELECT split_part(cache_key, ':', 1) AS prefix,
                   COUNT(*) AS entries,
                   COALESCE(SUM(LENGTH(value)), 0) AS bytes
            FROM cache_entries
            GROUP BY 1
            "#,
        )
        .fetch_all(pool)
        .await?;

        let mut breakdown = Vec::with_capacity(rows.len());
        for row in rows {
            let prefix: String = row.try_get("prefix")?;
            let namespace =
                mediadex_model::CacheNamespace::from_key(&prefix).prefix().to_string();
            breakdown.push((
                namespace,
                CacheTypeStats {
                    entries: row.try_get("entries")?,
                    size_bytes: row.try_get("bytes")?,
                },
            ));
        }
        Ok(breakdown)
    }

    async fn provider_breakdown(
        &self,
        pool: &PgPool,
    ) -> Result<std::collections::BTreeMap<String, i64>> {
        let rows = sqlx::query(
            r#"
            SELECT provider, COUNT(*) AS entries
            FROM api_cache
            GROUP BY provider
            "#,
        )
        .fetch_all(pool)
        .await?;

        let mut providers = std::collections::BTreeMap::new();
        for row in rows {
            providers.insert(row.try_get("provider")?, row.try_get("entries")?);
        }
        Ok(providers)
    }

    async fn recent_activity(&self, pool: &PgPool) -> Result<Vec<CacheActivity>> {
        let rows = sqlx::query(
            r#"
            SELECT type, cache_key, provider, hit, timestamp
            FROM cache_activity
            WHERE timestamp > NOW() - INTERVAL '1 hour'
            ORDER BY timestamp DESC
            LIMIT 100
            "#,
        )
        .fetch_all(pool)
        .await?;

        let mut recent = Vec::with_capacity(rows.len());
        for row in rows {
            recent.push(CacheActivity {
                activity_type: row.try_get("type")?,
                cache_key: row.try_get("cache_key")?,
                provider: row.try_get("provider")?,
                hit: row.try_get("hit")?,
                timestamp: row.try_get("timestamp")?,
            });
        }
        Ok(recent)
    }

    async fn hit_rate_24h(&self, pool: &PgPool) -> Result<f64> {
        let rate: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT AVG(CASE WHEN hit THEN 1.0 ELSE 0.0 END)::float8
            FROM cache_activity
            WHERE timestamp > NOW() - INTERVAL '24 hours'
            "#,
        )
        .fetch_one(pool)
        .await?;

        Ok(rate.unwrap_or(0.0))
    }
}
