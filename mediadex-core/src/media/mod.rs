//! Support services around the catalog core: subtitles, translation, and
//! cover art. Provider API clients stay outside; only their capability
//! traits live here.

pub mod coverart;
pub mod providers;
pub mod subtitle;
pub mod translate;

pub use coverart::{
    CoverArtFormat, CoverArtRequest, CoverArtService, ProcessedCoverArt,
    nearest_power_of_two, rank_candidates,
};
pub use providers::{ImageCandidate, SearchProvider};
pub use subtitle::{
    SubtitleCue, SubtitleFormat, format_ass, format_srt, format_vtt,
    measure_sync_offset, parse_ass, parse_srt, parse_vtt,
};
pub use translate::{CachedTranslator, Translation, Translator};
