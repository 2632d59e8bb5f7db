use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One candidate image returned by a provider search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCandidate {
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Provider-reported match quality in [0, 1].
    pub match_score: f64,
    pub provider: String,
}

/// External search capability. Concrete provider clients live outside the
/// core; the engine only fans out over this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Search the provider's catalog for cover art candidates.
    async fn search_cover_art(&self, artist: &str, album: &str) -> Result<Vec<ImageCandidate>>;
}
