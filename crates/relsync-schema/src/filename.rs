//! Release artifact naming convention.
//!
//! Release packages are named `{id}-{version}[-{rid}][-{channel}]-{full|delta}.nupkg`.
//! When no index exists yet, this name is the only source of a package's
//! version, RID and kind, so building and parsing must agree exactly.

use std::sync::LazyLock;

use regex::Regex;
use semver::Version;

use crate::error::FormatError;
use crate::rid::{Arch, Rid};
use crate::types::{Channel, PackageId, ReleaseKind};

/// Extension shared by full and delta packages.
pub const PACKAGE_EXTENSION: &str = ".nupkg";

static SUFFIX_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?i)(-full|-delta)?\.nupkg$"));

static VERSION_START_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"[.-](0|[1-9]\d*)\.(0|[1-9]\d*)($|[^\d])"));

fn compiled(re: &'static LazyLock<Result<Regex, regex::Error>>) -> Result<&'static Regex, FormatError> {
    re.as_ref()
        .map_err(|e| FormatError::filename("", format!("internal pattern error: {e}")))
}

/// The identity encoded in a release package filename.
///
/// # Example
///
/// ```
/// use relsync_schema::{ReleaseFilename, ReleaseKind};
///
/// let name = ReleaseFilename::parse("MyApp-1.2.0-win-x64-full.nupkg").unwrap();
/// assert_eq!(name.package_id.as_str(), "MyApp");
/// assert_eq!(name.version.to_string(), "1.2.0");
/// assert_eq!(name.kind, ReleaseKind::Full);
/// assert_eq!(name.to_string(), "MyApp-1.2.0-win-x64-full.nupkg");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseFilename {
    /// Package identifier (everything before the version).
    pub package_id: PackageId,
    /// Semantic version of the release.
    pub version: Version,
    /// Target runtime, if the package is platform-specific.
    pub rid: Option<Rid>,
    /// Channel segment for non-default channels (only ever set alongside a RID).
    pub channel_suffix: Option<String>,
    /// Full package or delta patch.
    pub kind: ReleaseKind,
}

impl ReleaseFilename {
    /// Describe a package on the platform-default channel.
    pub fn new(
        package_id: impl Into<PackageId>,
        version: Version,
        rid: Option<Rid>,
        kind: ReleaseKind,
    ) -> Self {
        Self {
            package_id: package_id.into(),
            version,
            rid,
            channel_suffix: None,
            kind,
        }
    }

    /// Attach a channel, which only shows up in the name when it is not the
    /// default channel of the RID's operating system.
    pub fn with_channel(mut self, channel: &Channel) -> Self {
        self.channel_suffix = self.rid.as_ref().and_then(|rid| {
            let suffix = channel.package_suffix(rid.os);
            suffix.strip_prefix('-').map(str::to_string)
        });
        self
    }

    /// Parse a package filename.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::InvalidFilename`] if the name lacks the
    /// `.nupkg` extension, a package id or a parseable semantic version.
    pub fn parse(filename: &str) -> Result<Self, FormatError> {
        let lower = filename.to_ascii_lowercase();
        if !lower.ends_with(PACKAGE_EXTENSION) {
            return Err(FormatError::filename(filename, "missing .nupkg extension"));
        }
        let kind = if lower.ends_with("-delta.nupkg") {
            ReleaseKind::Delta
        } else {
            ReleaseKind::Full
        };

        let name_and_ver = compiled(&SUFFIX_RE)?.replace(filename, "");
        let start = compiled(&VERSION_START_RE)?
            .find(&name_and_ver)
            .ok_or_else(|| FormatError::filename(filename, "no version found"))?
            .start();

        let package_id = &name_and_ver[..start];
        if package_id.is_empty() {
            return Err(FormatError::filename(filename, "empty package id"));
        }

        let tokens: Vec<&str> = name_and_ver[start + 1..].split('-').collect();
        let rid_at = tokens
            .iter()
            .enumerate()
            .skip(1)
            .find_map(|(i, tok)| Rid::parse_os_token(tok).map(|os| (i, os)));

        let (version_str, rid, channel_suffix) = match rid_at {
            Some((i, (os, os_version))) => {
                let mut rest = i + 1;
                let arch = tokens.get(rest).and_then(|t| t.parse::<Arch>().ok());
                if arch.is_some() {
                    rest += 1;
                }
                let channel = tokens[rest..].join("-");
                (
                    tokens[..i].join("-"),
                    Some(Rid {
                        os,
                        os_version,
                        arch,
                    }),
                    (!channel.is_empty()).then(|| channel.to_ascii_lowercase()),
                )
            }
            None => (tokens.join("-"), None, None),
        };

        let version = Version::parse(&version_str)
            .map_err(|e| FormatError::filename(filename, format!("invalid version: {e}")))?;

        Ok(Self {
            package_id: PackageId::new(package_id),
            version,
            rid,
            channel_suffix,
            kind,
        })
    }

    /// Whether a name looks like a release package at all.
    pub fn is_package_name(filename: &str) -> bool {
        filename.to_ascii_lowercase().ends_with(PACKAGE_EXTENSION)
    }
}

impl std::fmt::Display for ReleaseFilename {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.package_id, self.version)?;
        if let Some(rid) = &self.rid {
            write!(f, "-{rid}")?;
            if let Some(channel) = &self.channel_suffix {
                write!(f, "-{channel}")?;
            }
        }
        write!(f, "-{}{PACKAGE_EXTENSION}", self.kind)
    }
}
