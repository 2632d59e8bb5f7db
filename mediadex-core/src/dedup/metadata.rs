//! Per-media-type metadata similarity. Every comparison is optional: a
//! field absent on either side drops out instead of dragging the score down.

use mediadex_model::DuplicateItem;

use crate::dedup::text;

/// Metadata similarity dispatched by media type. `None` when no comparable
/// field is present on both sides.
pub fn metadata_similarity(a: &DuplicateItem, b: &DuplicateItem) -> Option<f64> {
    let media_type = a.media_type;
    let scores = if media_type.is_video() {
        video_scores(a, b)
    } else if media_type.is_audio() {
        audio_scores(a, b)
    } else if media_type.is_written() {
        written_scores(a, b)
    } else if media_type.is_software() {
        software_scores(a, b)
    } else {
        generic_scores(a, b)
    };

    mean(scores)
}

/// Filename, format, and size agreement; always computable because every
/// item carries a file name.
pub fn file_similarity(a: &DuplicateItem, b: &DuplicateItem) -> Option<f64> {
    let mut scores = vec![Some(text::similarity(stem(&a.file_name), stem(&b.file_name)))];
    scores.push(format_score(
        extension(&a.file_name).or(a.metadata.format.as_deref()),
        extension(&b.file_name).or(b.metadata.format.as_deref()),
    ));
    scores.push(relative_size(a.size, b.size));

    mean(scores)
}

fn video_scores(a: &DuplicateItem, b: &DuplicateItem) -> Vec<Option<f64>> {
    vec![
        text_pair(a.metadata.director.as_deref(), b.metadata.director.as_deref()),
        year_score(a.metadata.year, b.metadata.year, 5),
        duration_score(a.metadata.duration_ms, b.metadata.duration_ms, 600_000),
        quality_score(a.metadata.quality.as_deref(), b.metadata.quality.as_deref()),
    ]
}

fn audio_scores(a: &DuplicateItem, b: &DuplicateItem) -> Vec<Option<f64>> {
    vec![
        text_pair(a.metadata.artist.as_deref(), b.metadata.artist.as_deref()),
        text_pair(a.metadata.album.as_deref(), b.metadata.album.as_deref()),
        year_score(a.metadata.year, b.metadata.year, 2),
        duration_score(a.metadata.duration_ms, b.metadata.duration_ms, 30_000),
        bitrate_score(a.metadata.bitrate, b.metadata.bitrate),
    ]
}

fn written_scores(a: &DuplicateItem, b: &DuplicateItem) -> Vec<Option<f64>> {
    vec![
        text_pair(a.metadata.author.as_deref(), b.metadata.author.as_deref()),
        year_score(a.metadata.year, b.metadata.year, 2),
        isbn_score(a.metadata.isbn.as_deref(), b.metadata.isbn.as_deref()),
    ]
}

fn software_scores(a: &DuplicateItem, b: &DuplicateItem) -> Vec<Option<f64>> {
    vec![
        version_score(a.metadata.version.as_deref(), b.metadata.version.as_deref()),
        platform_score(a.metadata.platform.as_deref(), b.metadata.platform.as_deref()),
        relative_size(a.size, b.size),
    ]
}

fn generic_scores(a: &DuplicateItem, b: &DuplicateItem) -> Vec<Option<f64>> {
    vec![
        Some(text::similarity(stem(&a.file_name), stem(&b.file_name))),
        format_score(
            extension(&a.file_name).or(a.metadata.format.as_deref()),
            extension(&b.file_name).or(b.metadata.format.as_deref()),
        ),
        relative_size(a.size, b.size),
    ]
}

fn mean(scores: Vec<Option<f64>>) -> Option<f64> {
    let present: Vec<f64> = scores.into_iter().flatten().collect();
    if present.is_empty() {
        return None;
    }
    Some(present.iter().sum::<f64>() / present.len() as f64)
}

fn text_pair(a: Option<&str>, b: Option<&str>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => {
            Some(text::similarity(a, b))
        }
        _ => None,
    }
}

/// Linear penalty per year of difference over `tolerance` years.
fn year_score(a: Option<i32>, b: Option<i32>, tolerance: i32) -> Option<f64> {
    let (a, b) = (a?, b?);
    let diff = (a - b).abs() as f64;
    Some((1.0 - diff / tolerance as f64).max(0.0))
}

/// Linear penalty per millisecond of difference over `tolerance_ms`.
fn duration_score(a: Option<i64>, b: Option<i64>, tolerance_ms: i64) -> Option<f64> {
    let (a, b) = (a?, b?);
    let diff = (a - b).abs() as f64;
    Some((1.0 - diff / tolerance_ms as f64).max(0.0))
}

/// Bitrate agreement normalized against 320 kbps.
fn bitrate_score(a: Option<i64>, b: Option<i64>) -> Option<f64> {
    let (a, b) = (a?, b?);
    let diff = (a - b).abs() as f64;
    Some((1.0 - diff / 320.0).clamp(0.0, 1.0))
}

/// Smaller size over larger; zero-byte entries carry no signal.
fn relative_size(a: i64, b: i64) -> Option<f64> {
    if a <= 0 || b <= 0 {
        return None;
    }
    Some(a.min(b) as f64 / a.max(b) as f64)
}

/// Quality classes compare as equal (1.0), adjacent ("similar quality",
/// 0.7), or unrelated (0.0).
fn quality_score(a: Option<&str>, b: Option<&str>) -> Option<f64> {
    let (a, b) = (quality_rank(a?)?, quality_rank(b?)?);
    Some(match a.abs_diff(b) {
        0 => 1.0,
        1 => 0.7,
        _ => 0.0,
    })
}

/// Rank on the resolution ladder. `None` for labels we cannot place.
pub(crate) fn quality_rank(label: &str) -> Option<u8> {
    match label.trim().to_ascii_lowercase().as_str() {
        "240p" => Some(0),
        "360p" => Some(1),
        "480p" | "sd" => Some(2),
        "576p" => Some(3),
        "720p" | "hd" => Some(4),
        "1080p" | "fullhd" | "fhd" => Some(5),
        "1440p" | "2k" => Some(6),
        "2160p" | "4k" | "uhd" => Some(7),
        "4320p" | "8k" => Some(8),
        _ => None,
    }
}

fn version_score(a: Option<&str>, b: Option<&str>) -> Option<f64> {
    let (a, b) = (a?, b?);
    if a.is_empty() || b.is_empty() {
        return None;
    }
    Some(text::levenshtein_ratio(a, b))
}

fn platform_score(a: Option<&str>, b: Option<&str>) -> Option<f64> {
    let (a, b) = (a?.trim().to_ascii_lowercase(), b?.trim().to_ascii_lowercase());
    if a.is_empty() || b.is_empty() {
        return None;
    }
    if a == b {
        return Some(1.0);
    }
    Some(if platform_family(&a) == platform_family(&b) && platform_family(&a).is_some() {
        0.7
    } else {
        0.0
    })
}

fn platform_family(platform: &str) -> Option<&'static str> {
    match platform {
        "windows" | "win" | "win32" | "win64" => Some("windows"),
        "macos" | "osx" | "mac" | "darwin" => Some("macos"),
        "linux" | "debian" | "ubuntu" | "fedora" => Some("linux"),
        "ps4" | "ps5" | "playstation" => Some("playstation"),
        "xbox" | "xbox360" | "xboxone" => Some("xbox"),
        _ => None,
    }
}

/// ISBN equality scores 1.0; the ISBN-10 of the same work relates to its
/// 978-prefixed ISBN-13 and scores 0.8.
fn isbn_score(a: Option<&str>, b: Option<&str>) -> Option<f64> {
    let a = normalize_isbn(a?);
    let b = normalize_isbn(b?);
    if a.is_empty() || b.is_empty() {
        return None;
    }
    if a == b {
        return Some(1.0);
    }
    Some(if isbn_related(&a, &b) || isbn_related(&b, &a) {
        0.8
    } else {
        0.0
    })
}

fn normalize_isbn(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// True when `ten` is the ISBN-10 body of the 978-prefixed `thirteen`.
/// Check digits differ between the forms, so only the shared body counts.
fn isbn_related(ten: &str, thirteen: &str) -> bool {
    ten.len() == 10
        && thirteen.len() == 13
        && thirteen.starts_with("978")
        && thirteen[3..12] == ten[..9]
}

fn stem(file_name: &str) -> &str {
    file_name.rsplit_once('.').map_or(file_name, |(stem, _)| stem)
}

fn extension(file_name: &str) -> Option<&str> {
    file_name.rsplit_once('.').map(|(_, ext)| ext)
}

/// Formats compare as equal (1.0), same container family (0.7), or
/// unrelated (0.0).
fn format_score(a: Option<&str>, b: Option<&str>) -> Option<f64> {
    let (a, b) = (a?.to_ascii_lowercase(), b?.to_ascii_lowercase());
    if a.is_empty() || b.is_empty() {
        return None;
    }
    if a == b {
        return Some(1.0);
    }
    Some(match (format_family(&a), format_family(&b)) {
        (Some(fa), Some(fb)) if fa == fb => 0.7,
        _ => 0.0,
    })
}

fn format_family(format: &str) -> Option<&'static str> {
    match format {
        "mkv" | "mp4" | "avi" | "mov" | "webm" | "wmv" | "m2ts" => Some("video"),
        "mp3" | "flac" | "ogg" | "opus" | "m4a" | "wav" | "aiff" | "m4b" => Some("audio"),
        "epub" | "mobi" | "azw3" | "pdf" | "djvu" | "cbz" | "cbr" => Some("book"),
        "jpg" | "jpeg" | "png" | "webp" | "avif" => Some("image"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use mediadex_model::{FileId, ItemMetadata, MediaType};

    use super::*;

    fn item(media_type: MediaType, file_name: &str, size: i64, metadata: ItemMetadata) -> DuplicateItem {
        DuplicateItem {
            file_id: FileId(1),
            media_type,
            title: String::new(),
            path: format!("/library/{file_name}"),
            file_name: file_name.to_string(),
            size,
            hash: None,
            last_modified: Utc::now(),
            external_ids: BTreeMap::new(),
            fingerprints: BTreeMap::new(),
            metadata,
        }
    }

    #[test]
    fn audio_metadata_close_pair_scores_high() {
        let a = item(
            MediaType::Music,
            "Abbey Road.flac",
            36_000_000,
            ItemMetadata {
                artist: Some("The Beatles".into()),
                album: Some("Abbey Road".into()),
                year: Some(1969),
                duration_ms: Some(2_700_000),
                bitrate: Some(320),
                ..Default::default()
            },
        );
        let b = item(
            MediaType::Music,
            "Abbey Road.mp3",
            9_800_000,
            ItemMetadata {
                artist: Some("Beatles".into()),
                album: Some("Abbey Road".into()),
                year: Some(1969),
                duration_ms: Some(2_700_000),
                bitrate: Some(256),
                ..Default::default()
            },
        );

        // artist 1.0 ("the" is a stop word), album 1.0, year 1.0,
        // duration 1.0, bitrate 0.8 -> mean 0.96
        let score = metadata_similarity(&a, &b).unwrap();
        assert!((score - 0.96).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn video_year_and_duration_tolerances() {
        let a = item(
            MediaType::Movie,
            "dune.mkv",
            1,
            ItemMetadata {
                year: Some(2021),
                duration_ms: Some(9_000_000),
                ..Default::default()
            },
        );
        let b = item(
            MediaType::Movie,
            "dune.mkv",
            1,
            ItemMetadata {
                year: Some(2023),
                duration_ms: Some(9_300_000),
                ..Default::default()
            },
        );

        // year: 1 - 2/5 = 0.6; duration: 1 - 300000/600000 = 0.5
        let score = metadata_similarity(&a, &b).unwrap();
        assert!((score - 0.55).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn missing_fields_drop_out_instead_of_zeroing() {
        let a = item(MediaType::Movie, "x.mkv", 1, ItemMetadata {
            year: Some(1999),
            ..Default::default()
        });
        let b = item(MediaType::Movie, "y.mkv", 1, ItemMetadata {
            year: Some(1999),
            ..Default::default()
        });

        assert_eq!(metadata_similarity(&a, &b), Some(1.0));

        let empty_a = item(MediaType::Movie, "x.mkv", 1, ItemMetadata::default());
        let empty_b = item(MediaType::Movie, "y.mkv", 1, ItemMetadata::default());
        assert_eq!(metadata_similarity(&empty_a, &empty_b), None);
    }

    #[test]
    fn isbn_forms_relate() {
        let ten = item(MediaType::Book, "dune.epub", 1, ItemMetadata {
            isbn: Some("0-441-17271-7".into()),
            ..Default::default()
        });
        let thirteen = item(MediaType::Book, "dune.pdf", 1, ItemMetadata {
            isbn: Some("978-0-441-17271-9".into()),
            ..Default::default()
        });
        let unrelated = item(MediaType::Book, "other.epub", 1, ItemMetadata {
            isbn: Some("978-0-553-29335-0".into()),
            ..Default::default()
        });

        assert_eq!(metadata_similarity(&ten, &thirteen), Some(0.8));
        assert_eq!(metadata_similarity(&ten, &unrelated), Some(0.0));
    }

    #[test]
    fn quality_classes_compare_by_adjacency() {
        let hd = item(MediaType::Movie, "a.mkv", 1, ItemMetadata {
            quality: Some("1080p".into()),
            ..Default::default()
        });
        let uhd = item(MediaType::Movie, "b.mkv", 1, ItemMetadata {
            quality: Some("1440p".into()),
            ..Default::default()
        });
        let same = item(MediaType::Movie, "c.mkv", 1, ItemMetadata {
            quality: Some("FullHD".into()),
            ..Default::default()
        });

        assert_eq!(metadata_similarity(&hd, &uhd), Some(0.7));
        assert_eq!(metadata_similarity(&hd, &same), Some(1.0));
    }

    #[test]
    fn file_similarity_blends_name_format_size() {
        let a = item(MediaType::Other, "report-final.pdf", 1000, ItemMetadata::default());
        let b = item(MediaType::Other, "report-final.pdf", 500, ItemMetadata::default());

        // name 1.0, format 1.0, size 0.5 -> 0.8333...
        let score = file_similarity(&a, &b).unwrap();
        assert!((score - 2.5 / 3.0).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn software_compares_versions_and_platforms() {
        let a = item(MediaType::Software, "tool.dmg", 100, ItemMetadata {
            version: Some("2.4.1".into()),
            platform: Some("macOS".into()),
            ..Default::default()
        });
        let b = item(MediaType::Software, "tool.dmg", 100, ItemMetadata {
            version: Some("2.4.1".into()),
            platform: Some("darwin".into()),
            ..Default::default()
        });

        // version 1.0, platform family 0.7, size 1.0
        let score = metadata_similarity(&a, &b).unwrap();
        assert!((score - (1.0 + 0.7 + 1.0) / 3.0).abs() < 1e-9, "got {score}");
    }
}
