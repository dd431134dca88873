//! Identifier newtypes.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::ops::Deref;

use crate::rid::Os;

/// Application/package identifier (e.g., `"MyApp"`).
///
/// All entries in one release index share the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PackageId(String);

impl PackageId {
    /// Create a new `PackageId` from any string-like value.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Return the inner id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for PackageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for PackageId {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Borrow<str> for PackageId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PackageId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PackageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Whether a release artifact is self-contained or a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseKind {
    /// Self-contained installable package. Sorts before `Delta` for equal versions.
    Full,
    /// Binary patch from the preceding version's full package.
    Delta,
}

impl ReleaseKind {
    /// Filename suffix token (`full` / `delta`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Delta => "delta",
        }
    }
}

impl std::fmt::Display for ReleaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named partition of the release stream (e.g. `"stable"`, `"beta"`).
///
/// Channel names are case-insensitive and stored lowercase. Each channel has
/// its own index artifacts on the remote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(String);

impl Channel {
    /// Create a channel, normalizing the name to lowercase.
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_ascii_lowercase())
    }

    /// The default channel for an operating system (its short name).
    pub fn default_for(os: Os) -> Self {
        Self(os.as_str().to_string())
    }

    /// The default channel for the platform this binary runs on.
    pub fn current_default() -> Self {
        Self::default_for(Os::current())
    }

    /// Return the channel name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the plain-text release index for this channel.
    ///
    /// The Windows default channel keeps the historic bare `RELEASES` name.
    ///
    /// ```
    /// use relsync_schema::Channel;
    ///
    /// assert_eq!(Channel::new("win").legacy_index_name(), "RELEASES");
    /// assert_eq!(Channel::new("Beta").legacy_index_name(), "RELEASES-beta");
    /// ```
    pub fn legacy_index_name(&self) -> String {
        if self.0.is_empty() || self.0 == "win" {
            "RELEASES".to_string()
        } else {
            format!("RELEASES-{}", self.0)
        }
    }

    /// Name of the JSON asset feed for this channel.
    pub fn feed_name(&self) -> String {
        format!("releases.{}.json", self.0)
    }

    /// Suffix inserted into artifact filenames for this channel.
    ///
    /// Empty for the default channel of `os`, otherwise `-{channel}`.
    pub fn package_suffix(&self, os: Os) -> String {
        if self.0.is_empty() || self.0 == "default" || self.0 == os.as_str() {
            String::new()
        } else {
            format!("-{}", self.0)
        }
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::current_default()
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Channel {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_ordering_puts_full_first() {
        assert!(ReleaseKind::Full < ReleaseKind::Delta);
    }

    #[test]
    fn channel_index_names() {
        assert_eq!(Channel::new("").legacy_index_name(), "RELEASES");
        assert_eq!(Channel::new("osx").legacy_index_name(), "RELEASES-osx");
        assert_eq!(Channel::new("osx").feed_name(), "releases.osx.json");
    }

    #[test]
    fn channel_suffix_only_for_non_default() {
        assert_eq!(Channel::new("linux").package_suffix(Os::Linux), "");
        assert_eq!(Channel::new("default").package_suffix(Os::Win), "");
        assert_eq!(Channel::new("beta").package_suffix(Os::Win), "-beta");
        assert_eq!(Channel::new("linux").package_suffix(Os::Win), "-linux");
    }
}
