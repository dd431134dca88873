//! Binary delta codec seam.
//!
//! Producing and applying patches is delegated to an external collaborator;
//! this crate only decides when to call it and what to do with the result.

use std::path::Path;

use thiserror::Error;

/// Trade-off requested from the codec when producing a patch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeltaMode {
    /// Fast to compute, larger output.
    #[default]
    BestSpeed,
    /// Slow to compute, smallest output.
    BestSize,
}

/// Failure reported by a [`DeltaCodec`].
#[derive(Error, Debug)]
pub enum DeltaError {
    /// Reading or writing one of the files failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The codec rejected its input (e.g. the patch does not match the base).
    #[error("Delta codec failed: {0}")]
    Codec(String),
}

/// Computes and applies binary patches between full packages.
///
/// Implementations are synchronous and may be slow; callers run them on the
/// blocking thread pool.
pub trait DeltaCodec: Send + Sync {
    /// Write a patch turning `base` into `new` to `output`.
    ///
    /// # Errors
    ///
    /// Returns [`DeltaError`] if the patch cannot be produced.
    fn diff(&self, base: &Path, new: &Path, output: &Path, mode: DeltaMode) -> Result<(), DeltaError>;

    /// Apply `patch` to `base` and write the result to `output`.
    ///
    /// # Errors
    ///
    /// Returns [`DeltaError`] if the patch does not apply.
    fn apply(&self, base: &Path, patch: &Path, output: &Path) -> Result<(), DeltaError>;
}
