use std::fmt;
use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Best-effort telemetry writer for `cache_activity`.
///
/// Every record is a fire-and-forget insert with a hard per-write timeout.
/// A failed or timed-out write is logged and dropped; it never surfaces to
/// the caller. `close` stops accepting new writes and waits for in-flight
/// ones to finish.
pub struct ActivityRecorder {
    pool: Option<PgPool>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    write_timeout: Duration,
}

impl fmt::Debug for ActivityRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityRecorder")
            .field("connected", &self.pool.is_some())
            .field("in_flight", &self.tracker.len())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl ActivityRecorder {
    pub fn new(pool: Option<PgPool>, write_timeout: Duration) -> Self {
        Self {
            pool,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            write_timeout,
        }
    }

    /// Record one activity. Returns immediately; the insert happens on a
    /// tracked background task.
    pub fn record(&self, activity_type: &str, cache_key: &str, provider: Option<&str>, hit: bool) {
        let Some(pool) = self.pool.clone() else {
            return;
        };
        if self.shutdown.is_cancelled() {
            debug!("cache activity dropped after shutdown: {}", cache_key);
            return;
        }

        let activity_type = activity_type.to_string();
        let cache_key = cache_key.to_string();
        let provider = provider.map(str::to_string);
        let write_timeout = self.write_timeout;

        self.tracker.spawn(async move {
            let write = sqlx::query(
                r#"
                INSERT INTO cache_activity (type, cache_key, provider, hit, timestamp)
                VALUES ($1, $2, $3, $4, NOW())
                "#,
            )
            .bind(&activity_type)
            .bind(&cache_key)
            .bind(&provider)
            .bind(hit)
            .execute(&pool);

            match tokio::time::timeout(write_timeout, write).await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    warn!("cache activity write failed for {}: {}", cache_key, err);
                }
                Err(_) => {
                    warn!(
                        "cache activity write timed out after {:?} for {}",
                        write_timeout, cache_key
                    );
                }
            }
        });
    }

    /// Stop launching new writes, then wait for outstanding ones.
    pub async fn close(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sqlx::PgPool;

    use super::ActivityRecorder;

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn close_waits_for_in_flight_writes(pool: PgPool) {
        let recorder = ActivityRecorder::new(Some(pool.clone()), Duration::from_secs(5));

        recorder.record("api", "api:tmdb:search:aa", Some("tmdb"), true);
        recorder.record("metadata", "metadata:1:movie:tmdb", Some("tmdb"), false);
        recorder.close().await;

        let written: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cache_activity")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(written, 2);

        // Writes after shutdown are silently skipped.
        recorder.record("api", "api:tmdb:search:bb", Some("tmdb"), true);
        let after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cache_activity")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(after, 2);
    }

    #[tokio::test]
    async fn disconnected_recorder_is_inert() {
        let recorder = ActivityRecorder::new(None, Duration::from_secs(5));
        recorder.record("api", "api:x:y:z", None, true);
        recorder.close().await;
    }
}
