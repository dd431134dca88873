//! Format errors.

/// Errors raised while reading release filenames or index text.
///
/// Any of these aborts the whole parse: a truncated or half-understood index
/// is never returned to callers.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// An index line does not match `sha1 filename size`.
    #[error("Invalid release entry on line {line}: '{text}'")]
    MalformedLine {
        /// 1-based line number in the index text.
        line: usize,
        /// The offending line, trimmed.
        text: String,
    },

    /// The filename field is a path rather than a bare name or HTTP(S) URL.
    #[error("Filename can either be an absolute HTTP(S) URL or a file name, got '{0}'")]
    PathLikeFilename(String),

    /// An HTTP(S) URL in the filename field has no usable path.
    #[error("Invalid URL in release entry: '{0}'")]
    InvalidUrl(String),

    /// The filename does not follow the `{id}-{version}[-{rid}]-{kind}.nupkg` convention.
    #[error("Release filename '{filename}' does not follow the naming convention: {reason}")]
    InvalidFilename {
        /// The rejected filename.
        filename: String,
        /// Which part of the convention was violated.
        reason: String,
    },

    /// The size field does not fit in 64 bits.
    #[error("Invalid size '{0}'")]
    InvalidSize(String),

    /// The index bytes are not valid UTF-8.
    #[error("Release index is not valid UTF-8")]
    NotUtf8,

    /// The asset manifest JSON could not be decoded.
    #[error("Invalid asset manifest: {0}")]
    Manifest(String),
}

impl FormatError {
    pub(crate) fn filename(filename: &str, reason: impl Into<String>) -> Self {
        Self::InvalidFilename {
            filename: filename.to_string(),
            reason: reason.into(),
        }
    }
}
