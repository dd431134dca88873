//! Reading a local build output directory.

use std::path::{Path, PathBuf};

use relsync_schema::{
    Channel, InstallerAsset, InstallerKind, Os, ReleaseEntry, ReleaseFilename, index,
};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::PipelineError;

/// Release artifacts found in a local directory for one channel.
#[derive(Debug, Clone)]
pub struct LocalRelease {
    /// Directory the artifacts live in.
    pub dir: PathBuf,
    /// Channel the artifacts belong to.
    pub channel: Channel,
    /// Full and delta packages, sorted by version with Full first.
    pub entries: Vec<ReleaseEntry>,
    /// Installers for the newest release.
    pub installers: Vec<InstallerAsset>,
}

impl LocalRelease {
    /// The newest full package.
    pub fn latest_full(&self) -> Option<&ReleaseEntry> {
        self.entries.iter().rev().find(|e| e.is_full())
    }

    /// Path of an artifact in this directory.
    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }
}

/// Collect the channel's release set from `dir`.
///
/// The channel's legacy index is authoritative when present. Otherwise
/// packages are discovered by name and hashed.
///
/// # Errors
///
/// Returns [`PipelineError::NoLocalReleases`] if no full package is found,
/// or the underlying I/O or format error.
pub async fn read_release_dir(dir: &Path, channel: &Channel) -> Result<LocalRelease, PipelineError> {
    let dir = dir.to_path_buf();
    let channel = channel.clone();
    tokio::task::spawn_blocking(move || scan(dir, channel)).await?
}

fn scan(dir: PathBuf, channel: Channel) -> Result<LocalRelease, PipelineError> {
    let index_path = dir.join(channel.legacy_index_name());
    let mut entries = if index_path.is_file() {
        debug!(path = %index_path.display(), "Reading local index");
        index::parse_bytes(&std::fs::read(&index_path)?)?
    } else {
        discover_packages(&dir, &channel)?
    };
    entries.sort_by(|a, b| (a.version(), a.kind()).cmp(&(b.version(), b.kind())));

    let Some(latest) = entries.iter().rev().find(|e| e.is_full()) else {
        return Err(PipelineError::NoLocalReleases(dir));
    };
    let installers = discover_installers(&dir, &channel, latest)?;

    Ok(LocalRelease {
        dir,
        channel,
        entries,
        installers,
    })
}

fn files(dir: &Path) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
}

/// Whether a parsed package name belongs to `channel`.
pub(crate) fn in_channel(name: &ReleaseFilename, channel: &Channel) -> bool {
    match &name.rid {
        Some(rid) => {
            let expected = channel.package_suffix(rid.os);
            name.channel_suffix.as_deref() == expected.strip_prefix('-')
        }
        None => true,
    }
}

fn discover_packages(dir: &Path, channel: &Channel) -> Result<Vec<ReleaseEntry>, PipelineError> {
    let mut entries = Vec::new();
    for file in files(dir) {
        let Some(name) = file.file_name().to_str() else {
            continue;
        };
        if !ReleaseFilename::is_package_name(name) {
            continue;
        }
        match ReleaseFilename::parse(name) {
            Ok(parsed) if in_channel(&parsed, channel) => {
                entries.push(ReleaseEntry::from_file(file.path())?);
            }
            Ok(_) => debug!(name, "Skipping package from another channel"),
            Err(e) => warn!(name, "Skipping unrecognized package: {e}"),
        }
    }
    Ok(entries)
}

fn discover_installers(
    dir: &Path,
    channel: &Channel,
    latest: &ReleaseEntry,
) -> Result<Vec<InstallerAsset>, PipelineError> {
    let rid = latest.rid();
    let os = rid.map_or_else(Os::current, |r| r.os);
    let expected: Vec<String> = match rid {
        Some(rid) => [InstallerKind::Setup, InstallerKind::Msi, InstallerKind::Portable]
            .into_iter()
            .map(|k| k.suggested_filename(latest.package_id(), rid, channel).to_ascii_lowercase())
            .collect(),
        None => Vec::new(),
    };
    let suffix = channel.package_suffix(os).to_ascii_lowercase();

    let mut installers = Vec::new();
    for file in files(dir) {
        let Some(name) = file.file_name().to_str() else {
            continue;
        };
        let lower = name.to_ascii_lowercase();
        let matches = if expected.is_empty() {
            matches_suffix(&lower, &suffix, latest.package_id().as_str())
        } else {
            expected.contains(&lower)
        };
        if !matches {
            continue;
        }
        if let Some(asset) = InstallerAsset::from_file(file.path())? {
            installers.push(asset);
        }
    }
    installers.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(installers)
}

/// Fallback for platform-neutral packages: `{id}...{suffix}{tail}`.
fn matches_suffix(lower: &str, suffix: &str, package_id: &str) -> bool {
    if !lower.starts_with(&package_id.to_ascii_lowercase()) {
        return false;
    }
    ["-setup.exe", "-setup.pkg", "-deploymenttool.msi", "-portable.zip", ".appimage"]
        .iter()
        .any(|tail| lower.ends_with(&format!("{suffix}{tail}")))
}
