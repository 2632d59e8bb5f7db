use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::error::ModelError;

/// Media classification used for duplicate detection dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MediaType {
    Movie,
    TvShow,
    Music,
    Audiobook,
    Book,
    Comic,
    Magazine,
    Game,
    Software,
    Other,
}

impl MediaType {
    /// Types the duplicate engine compares by default.
    pub const ALL: [MediaType; 10] = [
        MediaType::Movie,
        MediaType::TvShow,
        MediaType::Music,
        MediaType::Audiobook,
        MediaType::Book,
        MediaType::Comic,
        MediaType::Magazine,
        MediaType::Game,
        MediaType::Software,
        MediaType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::TvShow => "tv_show",
            MediaType::Music => "music",
            MediaType::Audiobook => "audiobook",
            MediaType::Book => "book",
            MediaType::Comic => "comic",
            MediaType::Magazine => "magazine",
            MediaType::Game => "game",
            MediaType::Software => "software",
            MediaType::Other => "other",
        }
    }

    /// Movie or TV content, compared with the video metadata rules.
    pub fn is_video(&self) -> bool {
        matches!(self, MediaType::Movie | MediaType::TvShow)
    }

    /// Music or audiobook content, compared with the audio metadata rules.
    pub fn is_audio(&self) -> bool {
        matches!(self, MediaType::Music | MediaType::Audiobook)
    }

    /// Book-like content, compared with the written-work metadata rules.
    pub fn is_written(&self) -> bool {
        matches!(self, MediaType::Book | MediaType::Comic | MediaType::Magazine)
    }

    /// Games and software share the version/platform metadata rules.
    pub fn is_software(&self) -> bool {
        matches!(self, MediaType::Game | MediaType::Software)
    }

    /// Best-effort classification from a mime type and file extension.
    pub fn classify(mime_type: Option<&str>, extension: Option<&str>) -> Self {
        if let Some(mime) = mime_type {
            if mime.starts_with("video/") {
                return MediaType::Movie;
            }
            if mime.starts_with("audio/") {
                return MediaType::Music;
            }
            if mime == "application/epub+zip" || mime == "application/pdf" {
                return MediaType::Book;
            }
        }

        match extension.map(|e| e.to_ascii_lowercase()).as_deref() {
            Some("mkv" | "mp4" | "avi" | "mov" | "webm" | "wmv" | "m2ts") => MediaType::Movie,
            Some("mp3" | "flac" | "ogg" | "opus" | "m4a" | "wav" | "aiff") => MediaType::Music,
            Some("m4b" | "aax") => MediaType::Audiobook,
            Some("epub" | "mobi" | "azw3" | "pdf" | "djvu") => MediaType::Book,
            Some("cbz" | "cbr" | "cb7") => MediaType::Comic,
            Some("iso" | "rom" | "nsp" | "xci") => MediaType::Game,
            Some("exe" | "msi" | "dmg" | "appimage" | "deb" | "rpm") => MediaType::Software,
            _ => MediaType::Other,
        }
    }
}

impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "movie" => Ok(MediaType::Movie),
            "tv_show" | "tv" | "series" | "episode" => Ok(MediaType::TvShow),
            "music" | "track" | "album" => Ok(MediaType::Music),
            "audiobook" => Ok(MediaType::Audiobook),
            "book" | "ebook" => Ok(MediaType::Book),
            "comic" => Ok(MediaType::Comic),
            "magazine" => Ok(MediaType::Magazine),
            "game" => Ok(MediaType::Game),
            "software" => Ok(MediaType::Software),
            "other" => Ok(MediaType::Other),
            other => Err(ModelError::Invalid(format!("media type: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_mime_before_extension() {
        assert_eq!(
            MediaType::classify(Some("video/x-matroska"), Some("bin")),
            MediaType::Movie
        );
        assert_eq!(MediaType::classify(None, Some("FLAC")), MediaType::Music);
        assert_eq!(MediaType::classify(None, Some("cbz")), MediaType::Comic);
        assert_eq!(MediaType::classify(None, None), MediaType::Other);
    }
}
