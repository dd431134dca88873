//! Asset manifest: a channel's release entries plus its installer artifacts.
//!
//! Installers (setup executables, portable bundles) are uploaded and retained
//! alongside the index but are never diffed or chained.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::entry::ReleaseEntry;
use crate::error::FormatError;
use crate::hash::Sha1Hash;
use crate::rid::{Os, Rid};
use crate::types::{Channel, PackageId};

/// Category of a non-index installer artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallerKind {
    /// Bootstrapper or platform installer (`-Setup.exe`, `-Setup.pkg`).
    Setup,
    /// Windows Installer package (`.msi`).
    Msi,
    /// Self-contained portable bundle (`-Portable.zip`, `.AppImage`).
    Portable,
}

impl InstallerKind {
    /// Recognize an installer from its filename, case-insensitively.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with("-setup.exe") || lower.ends_with("-setup.pkg") {
            Some(Self::Setup)
        } else if lower.ends_with(".msi") {
            Some(Self::Msi)
        } else if lower.ends_with("-portable.zip") || lower.ends_with(".appimage") {
            Some(Self::Portable)
        } else {
            None
        }
    }

    /// Suggested filename for this installer kind on `rid`.
    ///
    /// Follows `{id}-{rid}{channel_suffix}{tail}`, where the tail depends on the
    /// kind and operating system.
    pub fn suggested_filename(self, package_id: &PackageId, rid: &Rid, channel: &Channel) -> String {
        let suffix = channel.package_suffix(rid.os);
        let tail = match (self, rid.os) {
            (Self::Setup, Os::Osx) => "-Setup.pkg",
            (Self::Setup, _) => "-Setup.exe",
            (Self::Msi, _) => "-DeploymentTool.msi",
            (Self::Portable, Os::Linux) => ".AppImage",
            (Self::Portable, _) => "-Portable.zip",
        };
        format!("{package_id}-{}{suffix}{tail}", rid.without_version())
    }
}

/// An installer artifact shipped next to the release index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallerAsset {
    /// Bare filename.
    pub filename: String,
    /// Installer category.
    pub kind: InstallerKind,
    /// SHA1 of the artifact.
    pub sha1: Sha1Hash,
    /// Size in bytes.
    pub size: u64,
}

impl InstallerAsset {
    /// Hash and measure an installer on disk.
    ///
    /// Returns `Ok(None)` if the file is not a recognized installer.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub fn from_file(path: &Path) -> std::io::Result<Option<Self>> {
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        let Some(kind) = InstallerKind::from_filename(filename) else {
            return Ok(None);
        };
        Ok(Some(Self {
            filename: filename.to_string(),
            kind,
            sha1: Sha1Hash::compute_file(path)?,
            size: std::fs::metadata(path)?.len(),
        }))
    }
}

/// The full set of assets published to one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetManifest {
    /// Channel the assets belong to.
    pub channel: Channel,
    /// Release entries, in index order.
    pub releases: Vec<ReleaseEntry>,
    /// Installer artifacts.
    #[serde(default)]
    pub installers: Vec<InstallerAsset>,
}

impl AssetManifest {
    /// Create an empty manifest for `channel`.
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            releases: Vec::new(),
            installers: Vec::new(),
        }
    }

    /// Encode as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::Manifest`] if encoding fails.
    pub fn to_json(&self) -> Result<String, FormatError> {
        serde_json::to_string_pretty(self).map_err(|e| FormatError::Manifest(e.to_string()))
    }

    /// Decode from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::Manifest`] if the JSON is malformed or any
    /// release entry is inconsistent with its filename.
    pub fn from_json(json: &str) -> Result<Self, FormatError> {
        serde_json::from_str(json).map_err(|e| FormatError::Manifest(e.to_string()))
    }

    /// Filenames of every asset, releases first.
    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.releases
            .iter()
            .map(ReleaseEntry::filename)
            .chain(self.installers.iter().map(|i| i.filename.as_str()))
    }
}
