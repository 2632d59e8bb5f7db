use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};

use mediadex_model::CacheNamespace;

use crate::cache::activity::ActivityRecorder;
use crate::cache::keys::{CacheKeys, request_fingerprint};
use crate::config::CacheSettings;
use crate::error::Result;

/// A cached thumbnail reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedThumbnail {
    pub url: String,
    pub width: i32,
    pub height: i32,
    pub file_size: i64,
}

/// Durable, TTL-bounded key/value cache over the catalog database.
///
/// Generic entries live in `cache_entries`; media metadata, API responses
/// and thumbnails get typed tables with natural keys. A service built with
/// [`CacheService::disconnected`] (test mode) turns every operation into a
/// silent no-op.
#[derive(Debug)]
pub struct CacheService {
    pool: Option<PgPool>,
    settings: CacheSettings,
    activity: ActivityRecorder,
}

impl CacheService {
    pub fn new(pool: PgPool, settings: CacheSettings) -> Self {
        let activity =
            ActivityRecorder::new(Some(pool.clone()), settings.activity_write_timeout());
        info!("cache service attached to catalog database");
        Self {
            pool: Some(pool),
            settings,
            activity,
        }
    }

    /// A cache with no backing store. Gets miss, sets succeed, nothing is
    /// retained.
    pub fn disconnected() -> Self {
        let settings = CacheSettings::default();
        let activity = ActivityRecorder::new(None, settings.activity_write_timeout());
        Self {
            pool: None,
            settings,
            activity,
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Serialize `value` to JSON and upsert it under `key` with the given
    /// TTL. Linearizable per key; the upsert is atomic at the database.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };

        let json = serde_json::to_string(value)?;
        debug!("cache SET {} (ttl {:?})", key, ttl);

        sqlx::query(
            r#"
            INSERT INTO cache_entries (cache_key, value, expires_at)
            VALUES ($1, $2, NOW() + $3 * INTERVAL '1 second')
            ON CONFLICT (cache_key) DO UPDATE
            SET value = EXCLUDED.value,
                expires_at = EXCLUDED.expires_at,
                updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(&json)
        .bind(ttl.as_secs_f64())
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Fetch a live entry. Expired or missing keys are `Ok(None)`; a row
    /// that fails to deserialize is an error and is left intact for
    /// inspection.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(pool) = &self.pool else {
            return Ok(None);
        };

        let row: Option<String> = sqlx::query_scalar(
            r#"
            SELECT value
            FROM cache_entries
            WHERE cache_key = $1 AND expires_at > NOW()
            "#,
        )
        .bind(key)
        .fetch_optional(pool)
        .await?;

        let namespace = CacheNamespace::from_key(key);
        self.activity
            .record(namespace.prefix(), key, None, row.is_some());

        match row {
            Some(json) => {
                debug!("cache HIT {}", key);
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => {
                debug!("cache MISS {}", key);
                Ok(None)
            }
        }
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };

        sqlx::query("DELETE FROM cache_entries WHERE cache_key = $1")
            .bind(key)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Remove entries whose key matches a LIKE-style pattern (`*` is
    /// accepted as a wildcard alias). An empty pattern wipes the generic
    /// namespace.
    pub async fn clear(&self, pattern: &str) -> Result<u64> {
        let Some(pool) = &self.pool else {
            return Ok(0);
        };

        let purged = if pattern.is_empty() {
            warn!("clearing entire generic cache namespace");
            sqlx::query("DELETE FROM cache_entries")
                .execute(pool)
                .await?
                .rows_affected()
        } else {
            self.invalidate_by_pattern(pattern).await?
        };

        Ok(purged)
    }

    /// Delete entries matching the pattern; returns how many went away.
    /// Calling it twice in a row removes nothing on the second pass.
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> Result<u64> {
        let Some(pool) = &self.pool else {
            return Ok(0);
        };

        let like = pattern.replace('*', "%");
        debug!("cache invalidate pattern {}", like);

        let result = sqlx::query("DELETE FROM cache_entries WHERE cache_key LIKE $1")
            .bind(&like)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Bulk-delete expired rows from every namespace table. Idempotent.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let Some(pool) = &self.pool else {
            return Ok(0);
        };

        let mut purged = 0u64;
        for table in [
            "cache_entries",
            "media_metadata_cache",
            "api_cache",
            "thumbnail_cache",
        ] {
            let result = sqlx::query(&format!(
                "DELETE FROM {table} WHERE expires_at <= NOW()"
            ))
            .execute(pool)
            .await?;
            purged += result.rows_affected();
        }

        if purged > 0 {
            info!("purged {} expired cache rows", purged);
        }

        Ok(purged)
    }

    // ----- media metadata namespace ------------------------------------

    pub async fn set_media_metadata<T: Serialize>(
        &self,
        media_item_id: i64,
        metadata_type: &str,
        provider: &str,
        data: &T,
        quality: f32,
    ) -> Result<()> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };

        let json = serde_json::to_string(data)?;
        let ttl = self.settings.ttl_for(CacheNamespace::Metadata);

        sqlx::query(
            r#"
            INSERT INTO media_metadata_cache (
                media_item_id, metadata_type, provider, data, quality, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, NOW() + $6 * INTERVAL '1 second')
            ON CONFLICT (media_item_id, metadata_type, provider) DO UPDATE
            SET data = EXCLUDED.data,
                quality = EXCLUDED.quality,
                expires_at = EXCLUDED.expires_at,
                updated_at = NOW()
            "#,
        )
        .bind(media_item_id)
        .bind(metadata_type)
        .bind(provider)
        .bind(&json)
        .bind(quality)
        .bind(ttl.as_secs_f64())
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn get_media_metadata<T: DeserializeOwned>(
        &self,
        media_item_id: i64,
        metadata_type: &str,
        provider: &str,
    ) -> Result<Option<T>> {
        let Some(pool) = &self.pool else {
            return Ok(None);
        };

        let row: Option<String> = sqlx::query_scalar(
            r#"
            SELECT data
            FROM media_metadata_cache
            WHERE media_item_id = $1 AND metadata_type = $2 AND provider = $3
              AND expires_at > NOW()
            "#,
        )
        .bind(media_item_id)
        .bind(metadata_type)
        .bind(provider)
        .fetch_optional(pool)
        .await?;

        let key = CacheKeys::media_metadata(media_item_id, metadata_type, provider);
        self.activity
            .record("metadata", &key, Some(provider), row.is_some());

        match row {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    // ----- API response namespace --------------------------------------

    pub async fn cache_api_response<R: Serialize, T: Serialize>(
        &self,
        provider: &str,
        endpoint: &str,
        request: &R,
        response: &T,
        status_code: i32,
    ) -> Result<()> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };

        let request_hash = request_fingerprint(request)?;
        let json = serde_json::to_string(response)?;
        let ttl = self.settings.ttl_for(CacheNamespace::Api);

        sqlx::query(
            r#"
            INSERT INTO api_cache (
                provider, endpoint, request_hash, response, status_code, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, NOW() + $6 * INTERVAL '1 second')
            ON CONFLICT (provider, endpoint, request_hash) DO UPDATE
            SET response = EXCLUDED.response,
                status_code = EXCLUDED.status_code,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(provider)
        .bind(endpoint)
        .bind(&request_hash)
        .bind(&json)
        .bind(status_code)
        .bind(ttl.as_secs_f64())
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn get_api_response<R: Serialize, T: DeserializeOwned>(
        &self,
        provider: &str,
        endpoint: &str,
        request: &R,
    ) -> Result<Option<(T, i32)>> {
        let Some(pool) = &self.pool else {
            return Ok(None);
        };

        let request_hash = request_fingerprint(request)?;
        let row = sqlx::query(
            r#"
            SELECT response, status_code
            FROM api_cache
            WHERE provider = $1 AND endpoint = $2 AND request_hash = $3
              AND expires_at > NOW()
            "#,
        )
        .bind(provider)
        .bind(endpoint)
        .bind(&request_hash)
        .fetch_optional(pool)
        .await?;

        let key = CacheKeys::api_response(provider, endpoint, &request_hash);
        self.activity
            .record("api", &key, Some(provider), row.is_some());

        match row {
            Some(row) => {
                let json: String = row.try_get("response")?;
                let status_code: i32 = row.try_get("status_code")?;
                Ok(Some((serde_json::from_str(&json)?, status_code)))
            }
            None => Ok(None),
        }
    }

    // ----- thumbnail namespace -----------------------------------------

    pub async fn store_thumbnail(
        &self,
        video_id: i64,
        position: i64,
        url: &str,
        width: i32,
        height: i32,
        file_size: i64,
    ) -> Result<()> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };

        let ttl = self.settings.ttl_for(CacheNamespace::Thumbnail);

        sqlx::query(
            r#"
            INSERT INTO thumbnail_cache (
                video_id, position, url, width, height, file_size, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, NOW() + $7 * INTERVAL '1 second')
            ON CONFLICT (video_id, position, width, height) DO UPDATE
            SET url = EXCLUDED.url,
                file_size = EXCLUDED.file_size,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(video_id)
        .bind(position)
        .bind(url)
        .bind(width)
        .bind(height)
        .bind(file_size)
        .bind(ttl.as_secs_f64())
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn get_thumbnail(
        &self,
        video_id: i64,
        position: i64,
        width: i32,
        height: i32,
    ) -> Result<Option<CachedThumbnail>> {
        let Some(pool) = &self.pool else {
            return Ok(None);
        };

        let row = sqlx::query(
            r#"
            SELECT url, width, height, file_size
            FROM thumbnail_cache
            WHERE video_id = $1 AND position = $2 AND width = $3 AND height = $4
              AND expires_at > NOW()
            "#,
        )
        .bind(video_id)
        .bind(position)
        .bind(width)
        .bind(height)
        .fetch_optional(pool)
        .await?;

        let key = CacheKeys::thumbnail(video_id, position, width as u32, height as u32);
        self.activity.record("thumbnail", &key, None, row.is_some());

        match row {
            Some(row) => Ok(Some(CachedThumbnail {
                url: row.try_get("url")?,
                width: row.try_get("width")?,
                height: row.try_get("height")?,
                file_size: row.try_get("file_size")?,
            })),
            None => Ok(None),
        }
    }

    // ----- generic namespaces keyed by grammar -------------------------

    pub async fn set_translation<T: Serialize>(
        &self,
        provider: &str,
        source: &str,
        target: &str,
        text: &str,
        value: &T,
    ) -> Result<()> {
        let key = CacheKeys::translation(provider, source, target, text);
        self.set(&key, value, self.settings.ttl_for(CacheNamespace::Translation))
            .await
    }

    pub async fn get_translation<T: DeserializeOwned>(
        &self,
        provider: &str,
        source: &str,
        target: &str,
        text: &str,
    ) -> Result<Option<T>> {
        let key = CacheKeys::translation(provider, source, target, text);
        self.get(&key).await
    }

    pub async fn set_subtitle<T: Serialize>(
        &self,
        video_id: i64,
        language: &str,
        provider: &str,
        value: &T,
    ) -> Result<()> {
        let key = CacheKeys::subtitle(video_id, language, provider);
        self.set(&key, value, self.settings.ttl_for(CacheNamespace::Subtitle))
            .await
    }

    pub async fn get_subtitle<T: DeserializeOwned>(
        &self,
        video_id: i64,
        language: &str,
        provider: &str,
    ) -> Result<Option<T>> {
        let key = CacheKeys::subtitle(video_id, language, provider);
        self.get(&key).await
    }

    pub async fn set_lyrics<T: Serialize>(
        &self,
        provider: &str,
        artist: &str,
        title: &str,
        value: &T,
    ) -> Result<()> {
        let key = CacheKeys::lyrics(provider, artist, title);
        self.set(&key, value, self.settings.ttl_for(CacheNamespace::Lyrics))
            .await
    }

    pub async fn get_lyrics<T: DeserializeOwned>(
        &self,
        provider: &str,
        artist: &str,
        title: &str,
    ) -> Result<Option<T>> {
        let key = CacheKeys::lyrics(provider, artist, title);
        self.get(&key).await
    }

    pub async fn set_cover_art<T: Serialize>(
        &self,
        provider: &str,
        artist: &str,
        album: &str,
        value: &T,
    ) -> Result<()> {
        let key = CacheKeys::cover_art(provider, artist, album);
        self.set(&key, value, self.settings.ttl_for(CacheNamespace::CoverArt))
            .await
    }

    pub async fn get_cover_art<T: DeserializeOwned>(
        &self,
        provider: &str,
        artist: &str,
        album: &str,
    ) -> Result<Option<T>> {
        let key = CacheKeys::cover_art(provider, artist, album);
        self.get(&key).await
    }

    // ----- lifecycle ----------------------------------------------------

    pub(crate) fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }

    /// Stop accepting activity writes and wait for in-flight ones, then
    /// release the service. Safe to call once at shutdown.
    pub async fn close(&self) {
        self.activity.close().await;
        info!("cache service closed");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};
    use sqlx::PgPool;

    use super::CacheService;
    use crate::config::CacheSettings;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        v: i64,
    }

    fn service(pool: PgPool) -> CacheService {
        CacheService::new(pool, CacheSettings::default())
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn set_then_get_honors_ttl(pool: PgPool) {
        let cache = service(pool);

        cache
            .set("k", &Payload { v: 1 }, Duration::from_secs(1))
            .await
            .unwrap();

        let hit: Option<Payload> = cache.get("k").await.unwrap();
        assert_eq!(hit, Some(Payload { v: 1 }));

        tokio::time::sleep(Duration::from_millis(1300)).await;

        let miss: Option<Payload> = cache.get("k").await.unwrap();
        assert_eq!(miss, None);

        cache.close().await;
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn set_overwrites_previous_value(pool: PgPool) {
        let cache = service(pool);

        cache
            .set("k", &Payload { v: 1 }, Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set("k", &Payload { v: 2 }, Duration::from_secs(60))
            .await
            .unwrap();

        let hit: Option<Payload> = cache.get("k").await.unwrap();
        assert_eq!(hit, Some(Payload { v: 2 }));

        cache.close().await;
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn invalidate_by_pattern_is_idempotent(pool: PgPool) {
        let cache = service(pool);

        for key in ["translation:deepl:en:de:aa", "translation:deepl:en:fr:bb", "lyrics:x:y:z"] {
            cache
                .set(key, &Payload { v: 0 }, Duration::from_secs(60))
                .await
                .unwrap();
        }

        let first = cache.invalidate_by_pattern("translation:deepl:%").await.unwrap();
        assert_eq!(first, 2);
        let second = cache.invalidate_by_pattern("translation:deepl:%").await.unwrap();
        assert_eq!(second, 0);

        let untouched: Option<Payload> = cache.get("lyrics:x:y:z").await.unwrap();
        assert!(untouched.is_some());

        cache.close().await;
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn cleanup_expired_purges_once(pool: PgPool) {
        let cache = service(pool);

        cache
            .set("gone", &Payload { v: 1 }, Duration::from_millis(50))
            .await
            .unwrap();
        cache
            .set("kept", &Payload { v: 2 }, Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;

        let purged = cache.cleanup_expired().await.unwrap();
        assert_eq!(purged, 1);
        let again = cache.cleanup_expired().await.unwrap();
        assert_eq!(again, 0);

        cache.close().await;
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn typed_tables_round_trip(pool: PgPool) {
        let cache = service(pool);

        cache
            .set_media_metadata(42, "movie", "tmdb", &Payload { v: 9 }, 0.9)
            .await
            .unwrap();
        let hit: Option<Payload> = cache.get_media_metadata(42, "movie", "tmdb").await.unwrap();
        assert_eq!(hit, Some(Payload { v: 9 }));

        cache
            .cache_api_response("tmdb", "search/movie", &Payload { v: 1 }, &Payload { v: 2 }, 200)
            .await
            .unwrap();
        let hit: Option<(Payload, i32)> = cache
            .get_api_response("tmdb", "search/movie", &Payload { v: 1 })
            .await
            .unwrap();
        assert_eq!(hit, Some((Payload { v: 2 }, 200)));

        cache
            .store_thumbnail(7, 120_000, "/thumbs/7.jpg", 320, 180, 1024)
            .await
            .unwrap();
        let thumb = cache.get_thumbnail(7, 120_000, 320, 180).await.unwrap().unwrap();
        assert_eq!(thumb.url, "/thumbs/7.jpg");

        cache.close().await;
    }

    #[tokio::test]
    async fn disconnected_cache_is_a_no_op() {
        let cache = CacheService::disconnected();

        cache
            .set("k", &Payload { v: 1 }, Duration::from_secs(60))
            .await
            .unwrap();
        let miss: Option<Payload> = cache.get("k").await.unwrap();
        assert_eq!(miss, None);
        assert_eq!(cache.cleanup_expired().await.unwrap(), 0);
        assert_eq!(cache.stats().await.unwrap().total_entries, 0);

        cache.close().await;
    }
}
