use serde::Serialize;

use crate::error::Result;

/// Hex-encoded MD5 digest of a string. Cache keys embed digests of free-form
/// operands (titles, request payloads) so the keys stay bounded and safe.
pub fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input))
}

/// Deterministic fingerprint of a request payload: canonical JSON (object
/// keys sorted) hashed to MD5 hex. Equal payloads fingerprint identically
/// across processes.
pub fn request_fingerprint<T: Serialize>(payload: &T) -> Result<String> {
    // serde_json::Value keeps object keys in a BTreeMap, which gives the
    // canonical ordering regardless of how the payload struct is declared.
    let canonical = serde_json::to_string(&serde_json::to_value(payload)?)?;
    Ok(md5_hex(&canonical))
}

#[derive(Debug, Clone, Copy)]
pub struct CacheKeys;

impl CacheKeys {
    pub fn media_metadata(media_item_id: i64, metadata_type: &str, provider: &str) -> String {
        format!("metadata:{media_item_id}:{metadata_type}:{provider}")
    }

    pub fn api_response(provider: &str, endpoint: &str, request_hash: &str) -> String {
        format!("api:{provider}:{endpoint}:{request_hash}")
    }

    pub fn thumbnail(video_id: i64, position: i64, width: u32, height: u32) -> String {
        format!("thumbnail:{video_id}:{position}:{width}x{height}")
    }

    pub fn translation(provider: &str, source: &str, target: &str, text: &str) -> String {
        format!("translation:{provider}:{source}:{target}:{}", md5_hex(text))
    }

    pub fn subtitle(video_id: i64, language: &str, provider: &str) -> String {
        format!("subtitle:{video_id}:{language}:{provider}")
    }

    pub fn lyrics(provider: &str, artist: &str, title: &str) -> String {
        format!("lyrics:{provider}:{}:{}", md5_hex(artist), md5_hex(title))
    }

    pub fn cover_art(provider: &str, artist: &str, album: &str) -> String {
        format!("coverart:{provider}:{}:{}", md5_hex(artist), md5_hex(album))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        #[derive(Serialize)]
        struct Req<'a> {
            title: &'a str,
            year: u16,
        }

        let a = request_fingerprint(&Req { title: "Dune", year: 2021 }).unwrap();
        let b = request_fingerprint(&Req { title: "Dune", year: 2021 }).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn fingerprint_ignores_map_insertion_order() {
        let mut first = HashMap::new();
        first.insert("b", 2);
        first.insert("a", 1);
        let mut second = HashMap::new();
        second.insert("a", 1);
        second.insert("b", 2);

        assert_eq!(
            request_fingerprint(&first).unwrap(),
            request_fingerprint(&second).unwrap()
        );
    }

    #[test]
    fn key_grammar() {
        assert_eq!(
            CacheKeys::media_metadata(42, "movie", "tmdb"),
            "metadata:42:movie:tmdb"
        );
        assert_eq!(
            CacheKeys::thumbnail(7, 120_000, 320, 180),
            "thumbnail:7:120000:320x180"
        );
        assert!(CacheKeys::lyrics("genius", "Abba", "SOS").starts_with("lyrics:genius:"));
    }
}
