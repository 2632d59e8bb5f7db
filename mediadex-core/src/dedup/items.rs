//! Assembly of comparison items from catalog rows and their metadata
//! key/value pairs.

use std::collections::BTreeMap;

use mediadex_model::{CatalogFile, DuplicateItem, ItemMetadata, MediaType};

/// Metadata keys with reserved prefixes.
const EXTERNAL_PREFIX: &str = "external:";
const FINGERPRINT_PREFIX: &str = "fingerprint:";

/// Build a comparison item from a file row and its `file_metadata` pairs.
///
/// Unknown keys are ignored; malformed numerics are treated as absent. The
/// title falls back to the file name stem so untagged files still compare.
pub fn build_item(file: CatalogFile, meta: BTreeMap<String, String>) -> DuplicateItem {
    let mut external_ids = BTreeMap::new();
    let mut fingerprints = BTreeMap::new();
    let mut metadata = ItemMetadata::default();
    let mut title = None;
    let mut media_type = None;

    for (key, value) in meta {
        if value.is_empty() {
            continue;
        }
        if let Some(namespace) = key.strip_prefix(EXTERNAL_PREFIX) {
            external_ids.insert(namespace.to_string(), value);
            continue;
        }
        if let Some(namespace) = key.strip_prefix(FINGERPRINT_PREFIX) {
            fingerprints.insert(namespace.to_string(), value);
            continue;
        }

        match key.as_str() {
            "title" => title = Some(value),
            "media_type" => media_type = value.parse::<MediaType>().ok(),
            "year" => metadata.year = value.parse().ok(),
            "director" => metadata.director = Some(value),
            "artist" => metadata.artist = Some(value),
            "album" => metadata.album = Some(value),
            "author" => metadata.author = Some(value),
            "isbn" => metadata.isbn = Some(value),
            "version" => metadata.version = Some(value),
            "platform" => metadata.platform = Some(value),
            "duration_ms" => metadata.duration_ms = value.parse().ok(),
            "bitrate" => metadata.bitrate = value.parse().ok(),
            "width" => metadata.width = value.parse().ok(),
            "height" => metadata.height = value.parse().ok(),
            "quality" => metadata.quality = Some(value),
            "format" => metadata.format = Some(value),
            _ => {}
        }
    }

    if metadata.format.is_none() {
        metadata.format = file.extension.clone();
    }

    let media_type = media_type.unwrap_or_else(|| {
        MediaType::classify(file.mime_type.as_deref(), file.extension.as_deref())
    });
    let title = title.unwrap_or_else(|| {
        file.name
            .rsplit_once('.')
            .map_or(file.name.as_str(), |(stem, _)| stem)
            .to_string()
    });

    DuplicateItem {
        file_id: file.id,
        media_type,
        title,
        path: file.path,
        file_name: file.name,
        size: file.size,
        hash: file.hash,
        last_modified: file.last_modified,
        external_ids,
        fingerprints,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mediadex_model::{FileId, StorageRootId};

    use super::*;

    fn file(name: &str, extension: Option<&str>, mime: Option<&str>) -> CatalogFile {
        CatalogFile {
            id: FileId(1),
            storage_root_id: StorageRootId(1),
            path: format!("/library/{name}"),
            name: name.to_string(),
            parent_id: None,
            is_directory: false,
            size: 100,
            last_modified: Utc::now(),
            hash: None,
            extension: extension.map(str::to_string),
            mime_type: mime.map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_scan_at: None,
        }
    }

    #[test]
    fn maps_prefixed_keys_into_namespaces() {
        let mut meta = BTreeMap::new();
        meta.insert("external:tmdb".to_string(), "603".to_string());
        meta.insert("fingerprint:video_phash".to_string(), "abcd".to_string());
        meta.insert("title".to_string(), "The Matrix".to_string());
        meta.insert("media_type".to_string(), "movie".to_string());
        meta.insert("year".to_string(), "1999".to_string());

        let item = build_item(file("matrix.mkv", Some("mkv"), None), meta);
        assert_eq!(item.external_ids.get("tmdb").map(String::as_str), Some("603"));
        assert_eq!(
            item.fingerprints.get("video_phash").map(String::as_str),
            Some("abcd")
        );
        assert_eq!(item.title, "The Matrix");
        assert_eq!(item.media_type, MediaType::Movie);
        assert_eq!(item.metadata.year, Some(1999));
    }

    #[test]
    fn falls_back_to_classification_and_stem() {
        let item = build_item(file("some song.flac", Some("flac"), None), BTreeMap::new());
        assert_eq!(item.media_type, MediaType::Music);
        assert_eq!(item.title, "some song");
        assert_eq!(item.metadata.format.as_deref(), Some("flac"));
    }

    #[test]
    fn malformed_numerics_are_absent() {
        let mut meta = BTreeMap::new();
        meta.insert("year".to_string(), "nineteen99".to_string());
        meta.insert("bitrate".to_string(), "".to_string());

        let item = build_item(file("a.mp3", Some("mp3"), None), meta);
        assert_eq!(item.metadata.year, None);
        assert_eq!(item.metadata.bitrate, None);
    }
}
