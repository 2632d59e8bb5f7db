use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::CacheService;
use crate::error::Result;

/// A completed translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub translated_text: String,
    /// Provider-reported confidence in [0, 1].
    pub confidence: f64,
}

/// Translation capability. Provider clients live outside the core.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Translator: Send + Sync {
    fn provider(&self) -> &str;

    async fn translate_text<'a>(
        &self,
        text: &str,
        source: &str,
        target: &str,
        context: Option<&'a str>,
    ) -> Result<Translation>;
}

/// Wraps any translator with the persistent cache. Repeated requests for
/// the same text pair are served from storage for the translation TTL.
#[derive(Debug)]
pub struct CachedTranslator<T: Translator> {
    inner: T,
    cache: Arc<CacheService>,
}

impl<T: Translator> CachedTranslator<T> {
    pub fn new(inner: T, cache: Arc<CacheService>) -> Self {
        Self { inner, cache }
    }

    pub fn provider(&self) -> &str {
        self.inner.provider()
    }

    /// Translate through the cache. Cache trouble degrades to a direct
    /// provider call; it never fails the translation itself.
    pub async fn translate_text(
        &self,
        text: &str,
        source: &str,
        target: &str,
        context: Option<&str>,
    ) -> Result<Translation> {
        let provider = self.inner.provider().to_string();

        match self
            .cache
            .get_translation::<Translation>(&provider, source, target, text)
            .await
        {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(err) => warn!("translation cache read failed: {}", err),
        }

        let translation = self
            .inner
            .translate_text(text, source, target, context)
            .await?;

        if let Err(err) = self
            .cache
            .set_translation(&provider, source, target, text, &translation)
            .await
        {
            warn!("translation cache write failed: {}", err);
        }

        Ok(translation)
    }
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use super::*;
    use crate::config::CacheSettings;

    fn mock_translator(expected_calls: usize) -> MockTranslator {
        let mut mock = MockTranslator::new();
        mock.expect_provider().return_const("deepl".to_string());
        mock.expect_translate_text()
            .times(expected_calls)
            .returning(|text, _, _, _| {
                Ok(Translation {
                    translated_text: format!("<{text}>"),
                    confidence: 0.9,
                })
            });
        mock
    }

    #[tokio::test]
    async fn disconnected_cache_always_calls_through() {
        let translator =
            CachedTranslator::new(mock_translator(2), Arc::new(CacheService::disconnected()));

        for _ in 0..2 {
            let result = translator
                .translate_text("hello", "en", "de", None)
                .await
                .unwrap();
            assert_eq!(result.translated_text, "<hello>");
        }
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn second_request_is_served_from_cache(pool: PgPool) {
        let cache = Arc::new(CacheService::new(pool, CacheSettings::default()));
        let translator = CachedTranslator::new(mock_translator(1), Arc::clone(&cache));

        let first = translator
            .translate_text("hello", "en", "de", None)
            .await
            .unwrap();
        let second = translator
            .translate_text("hello", "en", "de", None)
            .await
            .unwrap();
        assert_eq!(first, second);

        // A different target language misses and would call the provider
        // again, which the mock's call budget forbids; check the raw key.
        let cached: Option<Translation> = cache
            .get_translation("deepl", "en", "de", "hello")
            .await
            .unwrap();
        assert!(cached.is_some());

        cache.close().await;
    }
}
