//! Shared types and wire formats for relsync.
//!
//! This crate holds the release entry model, runtime identifiers, the
//! package naming convention and the two index encodings (plain-text
//! release index and JSON asset manifest). It performs no network I/O.

pub mod entry;
pub mod error;
pub mod filename;
pub mod hash;
pub mod index;
pub mod manifest;
pub mod rid;
pub mod types;

// Re-exports
pub use entry::ReleaseEntry;
pub use error::FormatError;
pub use filename::{PACKAGE_EXTENSION, ReleaseFilename};
pub use hash::{Md5Hash, Sha1Hash};
pub use manifest::{AssetManifest, InstallerAsset, InstallerKind};
pub use rid::{Arch, Os, Rid};
pub use types::{Channel, PackageId, ReleaseKind};

pub use semver::Version;
