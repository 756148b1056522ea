//! Stable content hashing of query values.
//!
//! The byte encoding below is the cache's wire format: it must not change
//! across releases, or every existing cache entry silently misses. A
//! regression test pins the exact layout.
//!
//! Leaf encodings:
//! - integers: little-endian, fixed width
//! - booleans: one byte, `0x00` or `0x01`
//! - strings: `u64` length prefix, then UTF-8 bytes
//! - optionals: `0x00`, or `0x01` followed by the payload
//! - collections: `u64` length prefix, then each element

use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;

/// A finalized cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Streaming hasher over a query's type identity and fields.
#[derive(Debug, Default)]
pub struct HashEncoder {
    hasher: blake3::Hasher,
}

impl HashEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Visit the query's type identity (`module.Type`) before its fields.
    pub fn encode_type_name(&mut self, name: &str) {
        self.encode_str(name);
    }

    pub fn encode_bytes(&mut self, bytes: &[u8]) {
        self.encode_len(bytes.len());
        self.hasher.update(bytes);
    }

    pub fn encode_str(&mut self, s: &str) {
        self.encode_bytes(s.as_bytes());
    }

    pub fn encode_len(&mut self, len: usize) {
        self.hasher.update(&(len as u64).to_le_bytes());
    }

    pub fn encode_u8(&mut self, v: u8) {
        self.hasher.update(&[v]);
    }

    pub fn encode_u32(&mut self, v: u32) {
        self.hasher.update(&v.to_le_bytes());
    }

    pub fn encode_u64(&mut self, v: u64) {
        self.hasher.update(&v.to_le_bytes());
    }

    pub fn encode_i64(&mut self, v: i64) {
        self.hasher.update(&v.to_le_bytes());
    }

    pub fn encode_bool(&mut self, v: bool) {
        self.encode_u8(u8::from(v));
    }

    #[must_use]
    pub fn finalize(self) -> CacheKey {
        CacheKey(*self.hasher.finalize().as_bytes())
    }
}

/// A value that can contribute to a query hash.
///
/// Implementations must visit every field in declaration order; adding a
/// field to a query type intentionally changes its hash.
pub trait HashEncodable {
    fn encode(&self, encoder: &mut HashEncoder);
}

impl HashEncodable for u8 {
    fn encode(&self, encoder: &mut HashEncoder) {
        encoder.encode_u8(*self);
    }
}

impl HashEncodable for u32 {
    fn encode(&self, encoder: &mut HashEncoder) {
        encoder.encode_u32(*self);
    }
}

impl HashEncodable for u64 {
    fn encode(&self, encoder: &mut HashEncoder) {
        encoder.encode_u64(*self);
    }
}

impl HashEncodable for i64 {
    fn encode(&self, encoder: &mut HashEncoder) {
        encoder.encode_i64(*self);
    }
}

impl HashEncodable for bool {
    fn encode(&self, encoder: &mut HashEncoder) {
        encoder.encode_bool(*self);
    }
}

impl HashEncodable for str {
    fn encode(&self, encoder: &mut HashEncoder) {
        encoder.encode_str(self);
    }
}

impl HashEncodable for String {
    fn encode(&self, encoder: &mut HashEncoder) {
        encoder.encode_str(self);
    }
}

impl HashEncodable for Utf8Path {
    fn encode(&self, encoder: &mut HashEncoder) {
        encoder.encode_str(self.as_str());
    }
}

impl HashEncodable for Utf8PathBuf {
    fn encode(&self, encoder: &mut HashEncoder) {
        encoder.encode_str(self.as_str());
    }
}

impl<T: HashEncodable> HashEncodable for Option<T> {
    fn encode(&self, encoder: &mut HashEncoder) {
        match self {
            None => encoder.encode_u8(0x00),
            Some(value) => {
                encoder.encode_u8(0x01);
                value.encode(encoder);
            }
        }
    }
}

impl<T: HashEncodable> HashEncodable for Vec<T> {
    fn encode(&self, encoder: &mut HashEncoder) {
        encoder.encode_len(self.len());
        for item in self {
            item.encode(encoder);
        }
    }
}

impl<T: HashEncodable + ?Sized> HashEncodable for &T {
    fn encode(&self, encoder: &mut HashEncoder) {
        (*self).encode(encoder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual(bytes: &[u8]) -> CacheKey {
        CacheKey(*blake3::hash(bytes).as_bytes())
    }

    /// Pins the exact byte layout of the encoding. If this test breaks, the
    /// cache wire format changed and every deployed cache is invalidated.
    #[test]
    fn encoding_layout_is_pinned() {
        let mut encoder = HashEncoder::new();
        encoder.encode_type_name("queries.DownloadFileQuery");
        "https://download.example/foo-1.0.tar.gz".encode(&mut encoder);
        Utf8Path::new("/cache").encode(&mut encoder);
        let key = encoder.finalize();

        let mut expected = Vec::new();
        for s in [
            "queries.DownloadFileQuery",
            "https://download.example/foo-1.0.tar.gz",
            "/cache",
        ] {
            expected.extend((s.len() as u64).to_le_bytes());
            expected.extend(s.as_bytes());
        }
        assert_eq!(key, manual(&expected));
    }

    #[test]
    fn optional_encoding() {
        let mut encoder = HashEncoder::new();
        Option::<u64>::None.encode(&mut encoder);
        Some(7u64).encode(&mut encoder);
        let key = encoder.finalize();

        let mut expected = vec![0x00u8, 0x01];
        expected.extend(7u64.to_le_bytes());
        assert_eq!(key, manual(&expected));
    }

    #[test]
    fn collection_encoding_is_length_prefixed() {
        let mut encoder = HashEncoder::new();
        vec!["a".to_string(), "bc".to_string()].encode(&mut encoder);
        let key = encoder.finalize();

        let mut expected = Vec::new();
        expected.extend(2u64.to_le_bytes());
        expected.extend(1u64.to_le_bytes());
        expected.extend(b"a");
        expected.extend(2u64.to_le_bytes());
        expected.extend(b"bc");
        assert_eq!(key, manual(&expected));
    }

    #[test]
    fn distinct_values_produce_distinct_keys() {
        let mut a = HashEncoder::new();
        a.encode_type_name("queries.TarExtractQuery");
        "x".encode(&mut a);
        let mut b = HashEncoder::new();
        b.encode_type_name("queries.TarExtractQuery");
        "y".encode(&mut b);
        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn type_name_participates_in_the_key() {
        let mut a = HashEncoder::new();
        a.encode_type_name("queries.DownloadFileQuery");
        "same".encode(&mut a);
        let mut b = HashEncoder::new();
        b.encode_type_name("queries.TarExtractQuery");
        "same".encode(&mut b);
        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn hex_rendering() {
        let key = CacheKey::from_bytes([0xab; 32]);
        assert_eq!(key.to_hex(), "ab".repeat(32));
    }
}
