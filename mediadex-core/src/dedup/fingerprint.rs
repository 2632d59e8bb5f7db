//! Content hashing and perceptual-fingerprint comparison. MD5 is the
//! catalog's content digest; fingerprints only ever compare within the same
//! namespace so an audio chromaprint never meets a video phash.

use std::collections::BTreeMap;
use std::path::Path;

use tokio::io::AsyncReadExt;

use crate::error::Result;

/// Hex MD5 digest of a byte slice.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// Hex MD5 digest of a file, streamed in 64 KiB chunks.
pub async fn hash_file(path: impl AsRef<Path>) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }

    Ok(format!("{:x}", context.compute()))
}

/// Coarse content fingerprint: concatenated per-segment digests. Unlike
/// the whole-file hash, two files that differ only inside one segment still
/// agree on most nibbles, which the Hamming comparison can exploit.
pub fn segment_digest(bytes: &[u8], segments: usize) -> String {
    let segments = segments.max(1);
    if bytes.is_empty() {
        return hash_bytes(b"");
    }

    let chunk = bytes.len().div_ceil(segments);
    let mut combined = String::with_capacity(segments * 32);
    for part in bytes.chunks(chunk) {
        combined.push_str(&hash_bytes(part));
    }
    combined
}

/// Best per-namespace agreement between two fingerprint sets. `None` when
/// the items share no namespace.
pub fn fingerprint_similarity(
    a: &BTreeMap<String, String>,
    b: &BTreeMap<String, String>,
) -> Option<f64> {
    let mut best: Option<f64> = None;
    for (namespace, left) in a {
        let Some(right) = b.get(namespace) else {
            continue;
        };
        let score = hex_similarity(left, right);
        best = Some(best.map_or(score, |b| b.max(score)));
    }
    best
}

/// Bitwise Hamming similarity over equal-length hex digests. Length
/// mismatch means the fingerprints were computed differently and cannot be
/// compared bit-for-bit; only exact equality counts then.
fn hex_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut differing_bits = 0u32;
    let mut total_bits = 0u32;
    for (ca, cb) in a.chars().zip(b.chars()) {
        let (Some(na), Some(nb)) = (ca.to_digit(16), cb.to_digit(16)) else {
            return 0.0;
        };
        differing_bits += (na ^ nb).count_ones();
        total_bits += 4;
    }

    1.0 - differing_bits as f64 / total_bits as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_reference_digest() {
        assert_eq!(hash_bytes(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(hash_bytes(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[tokio::test]
    async fn file_digest_matches_byte_digest() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sample.bin");
        tokio::fs::write(&path, b"fingerprint me").await.unwrap();

        assert_eq!(hash_file(&path).await.unwrap(), hash_bytes(b"fingerprint me"));
    }

    #[test]
    fn namespaces_never_cross() {
        let mut a = BTreeMap::new();
        a.insert("audio".to_string(), "ff00".to_string());
        let mut b = BTreeMap::new();
        b.insert("video_phash".to_string(), "ff00".to_string());

        assert_eq!(fingerprint_similarity(&a, &b), None);
    }

    #[test]
    fn takes_the_best_namespace() {
        let mut a = BTreeMap::new();
        a.insert("audio".to_string(), "ffff".to_string());
        a.insert("video_phash".to_string(), "0000".to_string());
        let mut b = BTreeMap::new();
        b.insert("audio".to_string(), "ffff".to_string());
        b.insert("video_phash".to_string(), "ffff".to_string());

        assert_eq!(fingerprint_similarity(&a, &b), Some(1.0));
    }

    #[test]
    fn hamming_similarity_counts_bits() {
        // f ^ e = 0001: one bit of sixteen differs.
        let mut a = BTreeMap::new();
        a.insert("audio".to_string(), "ffff".to_string());
        let mut b = BTreeMap::new();
        b.insert("audio".to_string(), "fffe".to_string());

        let score = fingerprint_similarity(&a, &b).unwrap();
        assert!((score - 15.0 / 16.0).abs() < 1e-9);
    }

    #[test]
    fn segment_digest_localizes_differences() {
        let data = vec![7u8; 10_000];
        let a = segment_digest(&data, 16);
        assert_eq!(a, segment_digest(&data, 16));
        assert_eq!(a.len(), 16 * 32);

        // A change in the first segment leaves the other fifteen intact.
        let mut tweaked = data.clone();
        tweaked[0] = 8;
        let b = segment_digest(&tweaked, 16);
        assert_ne!(a, b);
        assert_eq!(a[32..], b[32..]);

        assert_eq!(segment_digest(&[], 16), hash_bytes(b""));
    }

    #[test]
    fn length_mismatch_scores_zero() {
        let mut a = BTreeMap::new();
        a.insert("audio".to_string(), "ffff".to_string());
        let mut b = BTreeMap::new();
        b.insert("audio".to_string(), "ff".to_string());

        assert_eq!(fingerprint_similarity(&a, &b), Some(0.0));
    }
}
