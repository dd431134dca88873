//! Content hashes used by the index and by remote etags.

use std::io::Read;
use std::path::Path;

use md5::Md5;
use serde::{Deserialize, Deserializer, Serialize};
use sha1::{Digest, Sha1};

/// A validated SHA1 digest (40 lowercase hex characters).
///
/// This is the integrity field recorded for every entry in a release index.
/// Validation happens at construction and deserialization time so an invalid
/// hex string never reaches the comparison paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Sha1Hash(String);

impl Sha1Hash {
    /// Create a validated `Sha1Hash`, normalizing to lowercase.
    ///
    /// # Errors
    ///
    /// Returns an error string if `s` is not exactly 40 ASCII hex characters.
    pub fn new(s: &str) -> Result<Self, String> {
        if s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(format!("Invalid SHA1 hash: expected 40 hex chars, got '{s}'"))
        }
    }

    /// Compute the SHA1 of an in-memory buffer.
    pub fn compute(data: &[u8]) -> Self {
        Self(hex::encode(Sha1::digest(data)))
    }

    /// Compute the SHA1 of everything readable from `reader`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if reading fails.
    pub fn compute_reader(mut reader: impl Read) -> std::io::Result<Self> {
        let mut hasher = Sha1::new();
        std::io::copy(&mut reader, &mut hasher)?;
        Ok(Self(hex::encode(hasher.finalize())))
    }

    /// Compute the SHA1 of a file, streaming it from disk.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened or read.
    pub fn compute_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::compute_reader(std::io::BufReader::new(file))
    }

    /// Return the inner hex string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Sha1Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(&s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for Sha1Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Sha1Hash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for Sha1Hash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// MD5 digest used to compare local files against object-store ETags.
///
/// S3-compatible stores report the MD5 of single-part uploads as the ETag,
/// which makes it the cheapest "is the remote copy identical" check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Md5Hash(String);

impl Md5Hash {
    /// Compute the MD5 of an in-memory buffer.
    pub fn compute(data: &[u8]) -> Self {
        Self(hex::encode(Md5::digest(data)))
    }

    /// Compute the MD5 of a file, streaming it from disk.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened or read.
    pub fn compute_file(path: &Path) -> std::io::Result<Self> {
        let mut reader = std::io::BufReader::new(std::fs::File::open(path)?);
        let mut hasher = Md5::new();
        std::io::copy(&mut reader, &mut hasher)?;
        Ok(Self(hex::encode(hasher.finalize())))
    }

    /// Whether an ETag reported by a store refers to identical content.
    ///
    /// Quotes are stripped and the comparison is case-insensitive. Multipart
    /// ETags (`<hash>-<parts>`) never match.
    pub fn matches_etag(&self, etag: &str) -> bool {
        let etag = etag.trim().trim_matches('"');
        etag.eq_ignore_ascii_case(&self.0)
    }

    /// Return the inner hex string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Md5Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_known_vector() {
        let hash = Sha1Hash::compute(b"hello world");
        assert_eq!(hash.as_str(), "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
    }

    #[test]
    fn sha1_validation() {
        assert!(Sha1Hash::new("2AAE6C35C94FCFB415DBE95F408B9CE91EE846ED").is_ok());
        assert!(Sha1Hash::new("2aae6c35").is_err());
        assert!(Sha1Hash::new(&"z".repeat(40)).is_err());
    }

    #[test]
    fn sha1_normalizes_case() {
        let upper = Sha1Hash::new("2AAE6C35C94FCFB415DBE95F408B9CE91EE846ED").unwrap();
        assert_eq!(upper, Sha1Hash::compute(b"hello world"));
    }

    #[test]
    fn sha1_file_matches_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg.nupkg");
        std::fs::write(&path, b"package bytes").unwrap();
        assert_eq!(
            Sha1Hash::compute_file(&path).unwrap(),
            Sha1Hash::compute(b"package bytes")
        );
    }

    #[test]
    fn sha1_rejects_invalid_json() {
        let err = serde_json::from_str::<Sha1Hash>("\"nothex\"");
        assert!(err.is_err());
    }

    #[test]
    fn md5_etag_comparison() {
        let hash = Md5Hash::compute(b"hello world");
        assert_eq!(hash.as_str(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert!(hash.matches_etag("\"5EB63BBBE01EEED093CB22BB8F5ACDC3\""));
        assert!(!hash.matches_etag("\"5eb63bbbe01eeed093cb22bb8f5acdc3-2\""));
    }
}
