use std::fmt;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use image::ImageFormat;
use image::imageops::FilterType;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::CacheService;
use crate::error::{CatalogError, Result};
use crate::media::providers::{ImageCandidate, SearchProvider};

/// Encodings the processing pipeline can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverArtFormat {
    Jpeg,
    Png,
    WebP,
}

impl CoverArtFormat {
    fn image_format(&self) -> ImageFormat {
        match self {
            CoverArtFormat::Jpeg => ImageFormat::Jpeg,
            CoverArtFormat::Png => ImageFormat::Png,
            CoverArtFormat::WebP => ImageFormat::WebP,
        }
    }
}

/// One cover-art fetch: what to find and how to deliver it.
#[derive(Debug, Clone)]
pub struct CoverArtRequest {
    pub artist: String,
    pub album: String,
    /// Snapped to the nearest power of two before resizing. `None` keeps
    /// the source dimensions.
    pub target_width: Option<u32>,
    pub format: CoverArtFormat,
    /// When set, height follows the source aspect; otherwise the output is
    /// square.
    pub preserve_aspect: bool,
}

/// Finished cover art, ready to store or serve.
#[derive(Clone)]
pub struct ProcessedCoverArt {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: CoverArtFormat,
    pub source: ImageCandidate,
}

impl fmt::Debug for ProcessedCoverArt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessedCoverArt")
            .field("bytes", &self.bytes.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("source_url", &self.source.url)
            .finish()
    }
}

/// Fan-out cover art search, ranking, download, and resize.
pub struct CoverArtService {
    providers: Vec<Arc<dyn SearchProvider>>,
    http: reqwest::Client,
    cache: Arc<CacheService>,
}

impl fmt::Debug for CoverArtService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("CoverArtService")
            .field("providers", &names)
            .finish()
    }
}

impl CoverArtService {
    pub fn new(providers: Vec<Arc<dyn SearchProvider>>, cache: Arc<CacheService>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            providers,
            http,
            cache,
        }
    }

    /// Query every provider in parallel and rank the survivors. A failing
    /// provider is logged and skipped; the fan-out only fails on
    /// cancellation.
    pub async fn search_best(
        &self,
        artist: &str,
        album: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ImageCandidate>> {
        let searches = self.providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            async move {
                let name = provider.name().to_string();
                (name, provider.search_cover_art(artist, album).await)
            }
        });

        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(CatalogError::Cancelled("cover art search cancelled".to_string()));
            }
            results = join_all(searches) => results,
        };

        let mut candidates = Vec::new();
        for (provider, result) in results {
            match result {
                Ok(found) => {
                    debug!("{} returned {} cover art candidates", provider, found.len());
                    candidates.extend(found);
                }
                Err(err) => warn!("cover art search failed on {}: {}", provider, err),
            }
        }

        Ok(rank_candidates(candidates))
    }

    /// Search, download the best reachable candidate, and post-process it.
    /// The winning candidate is remembered in the cache under its provider.
    pub async fn fetch(
        &self,
        request: &CoverArtRequest,
        cancel: &CancellationToken,
    ) -> Result<ProcessedCoverArt> {
        let mut candidates = Vec::new();

        // A previously chosen candidate gets the first shot.
        for provider in &self.providers {
            match self
                .cache
                .get_cover_art::<ImageCandidate>(provider.name(), &request.artist, &request.album)
                .await
            {
                Ok(Some(cached)) => candidates.push(cached),
                Ok(None) => {}
                Err(err) => warn!("cover art cache read failed: {}", err),
            }
        }

        candidates.extend(
            self.search_best(&request.artist, &request.album, cancel)
                .await?,
        );

        for candidate in candidates {
            if cancel.is_cancelled() {
                return Err(CatalogError::Cancelled(
                    "cover art fetch cancelled".to_string(),
                ));
            }

            let bytes = match self.download(&candidate.url).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!("cover art download failed for {}: {}", candidate.url, err);
                    continue;
                }
            };

            let (bytes, width, height) = process_image(&bytes, request)?;
            if let Err(err) = self
                .cache
                .set_cover_art(&candidate.provider, &request.artist, &request.album, &candidate)
                .await
            {
                warn!("cover art cache write failed: {}", err);
            }

            return Ok(ProcessedCoverArt {
                bytes,
                width,
                height,
                format: request.format,
                source: candidate,
            });
        }

        Err(CatalogError::Provider(format!(
            "no cover art available for {} / {}",
            request.artist, request.album
        )))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| CatalogError::Provider(format!("cover art request failed: {e}")))?
            .error_for_status()
            .map_err(|e| CatalogError::Provider(format!("cover art request failed: {e}")))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CatalogError::Provider(format!("cover art body failed: {e}")))?;
        Ok(bytes.to_vec())
    }
}

/// Best match first: provider score, then width, then URL for determinism.
pub fn rank_candidates(mut candidates: Vec<ImageCandidate>) -> Vec<ImageCandidate> {
    candidates.sort_by(|a, b| {
        b.match_score
            .partial_cmp(&a.match_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.width.cmp(&a.width))
            .then_with(|| a.url.cmp(&b.url))
    });
    candidates
}

/// Nearest power of two, ties rounding up. Sizes used by texture-friendly
/// consumers stay on the power-of-two ladder.
pub fn nearest_power_of_two(n: u32) -> u32 {
    if n <= 1 {
        return 1;
    }
    let upper = n.next_power_of_two();
    let lower = upper / 2;
    if n - lower < upper - n { lower } else { upper }
}

/// Decode, optionally resize onto the power-of-two ladder, and re-encode.
fn process_image(bytes: &[u8], request: &CoverArtRequest) -> Result<(Vec<u8>, u32, u32)> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| CatalogError::Internal(format!("cover art decode failed: {e}")))?;

    let processed = match request.target_width {
        Some(width) => {
            let target_width = nearest_power_of_two(width);
            if request.preserve_aspect {
                let height = ((target_width as u64 * decoded.height() as u64)
                    / decoded.width().max(1) as u64)
                    .max(1) as u32;
                decoded.resize_exact(target_width, height, FilterType::Lanczos3)
            } else {
                decoded.resize_exact(target_width, target_width, FilterType::Lanczos3)
            }
        }
        None => decoded,
    };

    let mut out = Cursor::new(Vec::new());
    let rgb = image::DynamicImage::ImageRgb8(processed.to_rgb8());
    rgb.write_to(&mut out, request.format.image_format())
        .map_err(|e| CatalogError::Internal(format!("cover art encode failed: {e}")))?;

    Ok((out.into_inner(), processed.width(), processed.height()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::providers::MockSearchProvider;

    fn candidate(url: &str, width: u32, score: f64) -> ImageCandidate {
        ImageCandidate {
            url: url.to_string(),
            width,
            height: width,
            match_score: score,
            provider: "test".to_string(),
        }
    }

    #[test]
    fn ranks_by_score_then_width() {
        let ranked = rank_candidates(vec![
            candidate("c", 500, 0.8),
            candidate("a", 1000, 0.9),
            candidate("b", 1400, 0.8),
        ]);

        let urls: Vec<&str> = ranked.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["a", "b", "c"]);
    }

    #[test]
    fn power_of_two_snapping() {
        assert_eq!(nearest_power_of_two(1), 1);
        assert_eq!(nearest_power_of_two(48), 64);
        assert_eq!(nearest_power_of_two(65), 64);
        assert_eq!(nearest_power_of_two(96), 128);
        assert_eq!(nearest_power_of_two(100), 128);
        assert_eq!(nearest_power_of_two(300), 256);
        assert_eq!(nearest_power_of_two(512), 512);
    }

    fn png_fixture(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn resize_preserves_aspect_when_asked() {
        let request = CoverArtRequest {
            artist: "x".into(),
            album: "y".into(),
            target_width: Some(60),
            format: CoverArtFormat::Png,
            preserve_aspect: true,
        };

        let (bytes, width, height) = process_image(&png_fixture(100, 50), &request).unwrap();
        assert_eq!((width, height), (64, 32));

        let reread = image::load_from_memory(&bytes).unwrap();
        assert_eq!((reread.width(), reread.height()), (64, 32));
    }

    #[test]
    fn resize_squares_otherwise() {
        let request = CoverArtRequest {
            artist: "x".into(),
            album: "y".into(),
            target_width: Some(60),
            format: CoverArtFormat::Jpeg,
            preserve_aspect: false,
        };

        let (bytes, width, height) = process_image(&png_fixture(100, 50), &request).unwrap();
        assert_eq!((width, height), (64, 64));
        assert!(image::load_from_memory(&bytes).is_ok());
    }

    fn provider(name: &'static str, result: Result<Vec<ImageCandidate>>) -> Arc<dyn SearchProvider> {
        let mut mock = MockSearchProvider::new();
        mock.expect_name().return_const(name.to_string());
        let mut result = Some(result);
        mock.expect_search_cover_art()
            .returning(move |_, _| result.take().expect("single search expected"));
        Arc::new(mock)
    }

    #[tokio::test]
    async fn fan_out_tolerates_a_failing_provider() {
        let service = CoverArtService::new(
            vec![
                provider("broken", Err(CatalogError::Provider("down".to_string()))),
                provider("healthy", Ok(vec![candidate("art.png", 512, 0.9)])),
            ],
            Arc::new(CacheService::disconnected()),
        );

        let found = service
            .search_best("Beatles", "Abbey Road", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "art.png");
    }

    #[tokio::test]
    async fn cancelled_search_aborts() {
        let service = CoverArtService::new(
            vec![provider("slow", Ok(vec![]))],
            Arc::new(CacheService::disconnected()),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = service.search_best("a", "b", &cancel).await;
        assert!(matches!(result, Err(CatalogError::Cancelled(_))));
    }
}
