//! The release entry record.

use std::path::Path;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::FormatError;
use crate::filename::ReleaseFilename;
use crate::hash::Sha1Hash;
use crate::rid::Rid;
use crate::types::{PackageId, ReleaseKind};

/// One distributable release artifact, as listed in a release index.
///
/// Entries are immutable values: identity fields (`package_id`, `version`,
/// `rid`, `kind`) are always derived from `filename`, so two entries with the
/// same filename describe the same artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEntry", into = "RawEntry")]
pub struct ReleaseEntry {
    package_id: PackageId,
    version: Version,
    rid: Option<Rid>,
    kind: ReleaseKind,
    filename: String,
    content_hash: Sha1Hash,
    size_bytes: u64,
    base_url: Option<String>,
    query: Option<String>,
    staging_percentage: Option<u8>,
}

impl ReleaseEntry {
    /// Build an entry for `filename`, deriving its identity from the name.
    ///
    /// # Errors
    ///
    /// Returns a [`FormatError`] if the filename does not follow the naming
    /// convention.
    pub fn new(
        filename: impl Into<String>,
        content_hash: Sha1Hash,
        size_bytes: u64,
    ) -> Result<Self, FormatError> {
        let filename = filename.into();
        let name = ReleaseFilename::parse(&filename)?;
        Ok(Self {
            package_id: name.package_id,
            version: name.version,
            rid: name.rid,
            kind: name.kind,
            filename,
            content_hash,
            size_bytes,
            base_url: None,
            query: None,
            staging_percentage: None,
        })
    }

    /// Hash and measure a package on disk and build its entry.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or an
    /// [`std::io::ErrorKind::InvalidData`] error wrapping a [`FormatError`]
    /// if its name does not follow the convention.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| std::io::Error::other(format!("Invalid path: {}", path.display())))?;
        let size = std::fs::metadata(path)?.len();
        let hash = Sha1Hash::compute_file(path)?;
        Self::new(filename, hash, size)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Serve this entry from a different origin than its index.
    ///
    /// `base_url` should end with `/`; `query` includes its leading `?`.
    pub fn with_origin(mut self, base_url: Option<String>, query: Option<String>) -> Self {
        self.base_url = base_url;
        self.query = query;
        self
    }

    /// Gate this entry behind a staged rollout percentage (clamped to 100).
    pub fn with_staging_percentage(mut self, percentage: Option<u8>) -> Self {
        self.staging_percentage = percentage.map(|p| p.min(100));
        self
    }

    /// Package identifier.
    pub fn package_id(&self) -> &PackageId {
        &self.package_id
    }

    /// Release version.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Target runtime, if any.
    pub fn rid(&self) -> Option<&Rid> {
        self.rid.as_ref()
    }

    /// Full package or delta patch.
    pub fn kind(&self) -> ReleaseKind {
        self.kind
    }

    /// Whether this entry is a full package.
    pub fn is_full(&self) -> bool {
        self.kind == ReleaseKind::Full
    }

    /// Whether this entry is a delta patch.
    pub fn is_delta(&self) -> bool {
        self.kind == ReleaseKind::Delta
    }

    /// Bare artifact filename (never a URL).
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// SHA1 of the artifact.
    pub fn content_hash(&self) -> &Sha1Hash {
        &self.content_hash
    }

    /// Artifact size in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Base URL when served from a non-origin location.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Query string (with leading `?`) appended to the download URL.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Staged rollout percentage, `None` meaning released to everyone.
    pub fn staging_percentage(&self) -> Option<u8> {
        self.staging_percentage
    }

    /// The location written into the index: `{base_url}{filename}{query}`.
    pub fn location(&self) -> String {
        format!(
            "{}{}{}",
            self.base_url.as_deref().unwrap_or_default(),
            self.filename,
            self.query.as_deref().unwrap_or_default()
        )
    }
}

/// Flat serde shape for JSON feeds.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    package_id: String,
    version: String,
    kind: ReleaseKind,
    filename: String,
    sha1: Sha1Hash,
    size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    staging_percentage: Option<u8>,
}

impl TryFrom<RawEntry> for ReleaseEntry {
    type Error = FormatError;

    fn try_from(raw: RawEntry) -> Result<Self, Self::Error> {
        let entry = Self::new(raw.filename, raw.sha1, raw.size)?
            .with_origin(raw.base_url, raw.query)
            .with_staging_percentage(raw.staging_percentage);

        // The filename is authoritative, the redundant fields must agree with it
        if entry.package_id.as_str() != raw.package_id
            || entry.version.to_string() != raw.version
            || entry.kind != raw.kind
        {
            return Err(FormatError::filename(
                &entry.filename,
                "feed fields disagree with the filename",
            ));
        }
        Ok(entry)
    }
}

impl From<ReleaseEntry> for RawEntry {
    fn from(entry: ReleaseEntry) -> Self {
        Self {
            package_id: entry.package_id.to_string(),
            version: entry.version.to_string(),
            kind: entry.kind,
            filename: entry.filename,
            sha1: entry.content_hash,
            size: entry.size_bytes,
            base_url: entry.base_url,
            query: entry.query,
            staging_percentage: entry.staging_percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash() -> Sha1Hash {
        Sha1Hash::compute(b"payload")
    }

    #[test]
    fn identity_comes_from_filename() {
        let entry = ReleaseEntry::new("MyApp-1.4.0-win-x64-delta.nupkg", hash(), 42).unwrap();
        assert_eq!(entry.package_id().as_str(), "MyApp");
        assert_eq!(entry.version().to_string(), "1.4.0");
        assert!(entry.is_delta());
        assert_eq!(entry.rid().map(ToString::to_string).as_deref(), Some("win-x64"));
    }

    #[test]
    fn location_includes_origin() {
        let entry = ReleaseEntry::new("MyApp-1.4.0-full.nupkg", hash(), 42)
            .unwrap()
            .with_origin(
                Some("https://cdn.example.com/releases/".to_string()),
                Some("?sig=abc".to_string()),
            );
        assert_eq!(
            entry.location(),
            "https://cdn.example.com/releases/MyApp-1.4.0-full.nupkg?sig=abc"
        );
    }

    #[test]
    fn from_file_hashes_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("MyApp-2.0.0-osx-full.nupkg");
        std::fs::write(&path, b"payload").unwrap();

        let entry = ReleaseEntry::from_file(&path).unwrap();
        assert_eq!(entry.content_hash(), &hash());
        assert_eq!(entry.size_bytes(), 7);
    }

    #[test]
    fn json_shape_validates_against_filename() {
        let entry = ReleaseEntry::new("MyApp-1.0.0-full.nupkg", hash(), 7).unwrap();
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"packageId\":\"MyApp\""));
        assert_eq!(serde_json::from_str::<ReleaseEntry>(&json).unwrap(), entry);

        let tampered = json.replace("\"version\":\"1.0.0\"", "\"version\":\"9.0.0\"");
        assert!(serde_json::from_str::<ReleaseEntry>(&tampered).is_err());
    }
}
