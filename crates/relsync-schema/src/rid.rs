//! Runtime identifiers (RIDs).
//!
//! A RID names the platform a package targets: an operating system, an
//! optional OS version and an optional CPU architecture, e.g. `win-x64`,
//! `osx11.0-arm64` or plain `linux`.

use serde::{Deserialize, Serialize};

/// Operating system family of a [`Rid`].
///
/// # Example
///
/// ```
/// use relsync_schema::Os;
///
/// let current = Os::current();
/// println!("Running on: {}", current);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    /// Microsoft Windows.
    Win,
    /// Apple macOS.
    Osx,
    /// Linux-based operating systems.
    Linux,
}

impl Os {
    /// Get the operating system this binary was compiled for.
    pub fn current() -> Self {
        #[cfg(target_os = "windows")]
        {
            Self::Win
        }
        #[cfg(target_os = "macos")]
        {
            Self::Osx
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            Self::Linux
        }
    }

    /// Short name used in RIDs and channel names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Osx => "osx",
            Self::Linux => "linux",
        }
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Os {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "win" | "windows" => Ok(Self::Win),
            "osx" | "macos" | "darwin" => Ok(Self::Osx),
            "linux" => Ok(Self::Linux),
            _ => Err(format!("Unknown operating system: {s}")),
        }
    }
}

/// CPU architecture of a [`Rid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// 32-bit Intel/AMD.
    X86,
    /// 64-bit Intel/AMD.
    X64,
    /// 64-bit ARM.
    Arm64,
}

impl Arch {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X64 => "x64",
            Self::Arm64 => "arm64",
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x86" => Ok(Self::X86),
            "x64" | "amd64" | "x86_64" => Ok(Self::X64),
            "arm64" | "aarch64" => Ok(Self::Arm64),
            _ => Err(format!("Unknown architecture: {s}")),
        }
    }
}

/// A parsed runtime identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rid {
    /// Operating system family.
    pub os: Os,
    /// OS version component (e.g. `10` in `win10`), digits and dots only.
    pub os_version: Option<String>,
    /// CPU architecture, if the package is architecture-specific.
    pub arch: Option<Arch>,
}

impl Rid {
    /// Create a RID without an OS version.
    pub fn new(os: Os, arch: Option<Arch>) -> Self {
        Self {
            os,
            os_version: None,
            arch,
        }
    }

    /// Whether this RID carries an OS-version component.
    pub fn has_os_version(&self) -> bool {
        self.os_version.is_some()
    }

    /// The display form used in filenames, which omits the OS version.
    pub fn without_version(&self) -> String {
        match self.arch {
            Some(arch) => format!("{}-{arch}", self.os),
            None => self.os.to_string(),
        }
    }

    /// Parse the OS token of a RID (`win`, `win10`, `osx11.0`).
    pub(crate) fn parse_os_token(token: &str) -> Option<(Os, Option<String>)> {
        let lower = token.to_ascii_lowercase();
        for os in [Os::Win, Os::Osx, Os::Linux] {
            if let Some(rest) = lower.strip_prefix(os.as_str()) {
                if rest.is_empty() {
                    return Some((os, None));
                }
                if rest.starts_with(|c: char| c.is_ascii_digit())
                    && rest.chars().all(|c| c.is_ascii_digit() || c == '.')
                {
                    return Some((os, Some(rest.to_string())));
                }
            }
        }
        None
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.os)?;
        if let Some(ver) = &self.os_version {
            write!(f, "{ver}")?;
        }
        if let Some(arch) = self.arch {
            write!(f, "-{arch}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Rid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (os_part, arch_part) = match s.split_once('-') {
            Some((os, arch)) => (os, Some(arch)),
            None => (s, None),
        };
        let (os, os_version) =
            Self::parse_os_token(os_part).ok_or_else(|| format!("Invalid RID: {s}"))?;
        let arch = arch_part.map(str::parse::<Arch>).transpose()?;
        Ok(Self {
            os,
            os_version,
            arch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let rid: Rid = "win-x64".parse().unwrap();
        assert_eq!(rid, Rid::new(Os::Win, Some(Arch::X64)));
        assert_eq!(rid.to_string(), "win-x64");

        let rid: Rid = "osx11.0-arm64".parse().unwrap();
        assert_eq!(rid.os_version.as_deref(), Some("11.0"));
        assert_eq!(rid.to_string(), "osx11.0-arm64");
        assert_eq!(rid.without_version(), "osx-arm64");

        let rid: Rid = "linux".parse().unwrap();
        assert_eq!(rid.arch, None);
    }

    #[test]
    fn rejects_unknown_parts() {
        assert!("beos-x64".parse::<Rid>().is_err());
        assert!("win-sparc".parse::<Rid>().is_err());
        assert!("winxp".parse::<Rid>().is_err());
    }
}
