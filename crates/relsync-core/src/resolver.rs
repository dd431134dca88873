//! Chooses how an installed client reaches the newest release.
//!
//! A chain of deltas is preferred when it exists, is short enough and is
//! smaller than the full package; otherwise the full package is used.

use std::collections::BTreeSet;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use relsync_schema::{ReleaseEntry, Version};
use thiserror::Error;
use tracing::debug;

use crate::delta::{DeltaCodec, DeltaError};
use crate::rollout::{RolloutGate, UserId};

/// Errors from resolving or applying an update.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The index offers deltas but no full package at all.
    #[error("Version {0} has no full package in the index")]
    UnreachableVersion(Version),

    /// The index offers nothing to this user.
    #[error("No releases available")]
    NoReleases,

    /// A patch in the chain did not apply. Callers should fall back to the full package.
    #[error("Failed to apply patch '{filename}': {source}")]
    PatchFailed {
        /// Patch file that failed.
        filename: String,
        /// Codec error.
        #[source]
        source: DeltaError,
    },
}

/// Knobs for [`resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvePolicy {
    /// Offer an older full package when the installed version is ahead of the index.
    pub allow_downgrade: bool,
    /// Longest delta chain worth applying.
    pub max_deltas_before_fallback: usize,
    /// Prefer the full package when the deltas add up to more bytes.
    pub fallback_when_larger: bool,
}

impl Default for ResolvePolicy {
    fn default() -> Self {
        Self {
            allow_downgrade: false,
            max_deltas_before_fallback: 10,
            fallback_when_larger: true,
        }
    }
}

/// What the client should download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing newer is offered.
    UpToDate,
    /// Download and install this full package.
    Full(ReleaseEntry),
    /// Apply these deltas, in order, to the installed package.
    DeltaChain {
        /// Delta entries, oldest first.
        entries: Vec<ReleaseEntry>,
        /// Version reached after the last delta.
        final_version: Version,
    },
}

/// Resolve the update path from `installed` (None for a fresh install).
///
/// Entries the `gate` rejects for `user` are ignored entirely.
/// The target is the newest eligible full package.
///
/// # Errors
///
/// Returns [`ResolveError::NoReleases`] if nothing is eligible and
/// [`ResolveError::UnreachableVersion`] if only deltas are eligible.
pub fn resolve(
    installed: Option<&Version>,
    entries: &[ReleaseEntry],
    policy: &ResolvePolicy,
    gate: &dyn RolloutGate,
    user: Option<&UserId>,
) -> Result<Resolution, ResolveError> {
    let eligible: Vec<&ReleaseEntry> = entries
        .iter()
        .filter(|e| gate.is_eligible(user, e))
        .collect();

    // Deltas published ahead of their full package are not a target.
    let Some(full) = eligible
        .iter()
        .filter(|e| e.is_full())
        .max_by(|a, b| a.version().cmp(b.version()))
    else {
        return Err(eligible
            .iter()
            .map(|e| e.version())
            .max()
            .map_or(ResolveError::NoReleases, |v| {
                ResolveError::UnreachableVersion(v.clone())
            }));
    };
    let target = full.version();

    let Some(installed) = installed else {
        debug!(%target, "Fresh install, using full package");
        return Ok(Resolution::Full((*full).clone()));
    };

    if target <= installed {
        if policy.allow_downgrade && target < installed {
            debug!(%installed, %target, "Downgrading to full package");
            return Ok(Resolution::Full((*full).clone()));
        }
        return Ok(Resolution::UpToDate);
    }

    match delta_chain(installed, target, &eligible) {
        Some(chain) if chain.len() > policy.max_deltas_before_fallback => {
            debug!(
                len = chain.len(),
                max = policy.max_deltas_before_fallback,
                "Delta chain too long, using full package"
            );
            Ok(Resolution::Full((*full).clone()))
        }
        Some(chain)
            if policy.fallback_when_larger
                && chain.iter().map(|e| e.size_bytes()).sum::<u64>() > full.size_bytes() =>
        {
            debug!("Delta chain larger than full package, using full package");
            Ok(Resolution::Full((*full).clone()))
        }
        Some(chain) => Ok(Resolution::DeltaChain {
            entries: chain,
            final_version: target.clone(),
        }),
        None => {
            debug!(%installed, %target, "No complete delta chain, using full package");
            Ok(Resolution::Full((*full).clone()))
        }
    }
}

/// Walk deltas from `installed` to `target`. Each delta applies to the
/// version immediately before it in the index; a gap ends the walk.
fn delta_chain(
    installed: &Version,
    target: &Version,
    entries: &[&ReleaseEntry],
) -> Option<Vec<ReleaseEntry>> {
    let versions: BTreeSet<&Version> = entries.iter().map(|e| e.version()).collect();
    let mut chain = Vec::new();
    let mut current = installed;

    while current < target {
        let next = versions
            .range::<&Version, _>((Bound::Excluded(current), Bound::Included(target)))
            .next()
            .copied()?;
        let predecessor = versions.range::<&Version, _>(..next).next_back().copied();
        if predecessor != Some(current) {
            return None;
        }
        let delta = entries.iter().find(|e| e.is_delta() && e.version() == next)?;
        chain.push((*delta).clone());
        current = next;
    }
    Some(chain)
}

/// Apply downloaded patches to `base` in order, writing intermediates into
/// `work_dir`. Returns the path of the final package.
///
/// # Errors
///
/// Returns [`ResolveError::PatchFailed`] for the first patch that fails.
pub fn apply_chain(
    codec: &dyn DeltaCodec,
    base: &Path,
    patches: &[PathBuf],
    work_dir: &Path,
) -> Result<PathBuf, ResolveError> {
    let mut current = base.to_path_buf();
    for (step, patch) in patches.iter().enumerate() {
        let output = work_dir.join(format!("chain-{step}.nupkg"));
        debug!(patch = %patch.display(), "Applying delta");
        codec
            .apply(&current, patch, &output)
            .map_err(|source| ResolveError::PatchFailed {
                filename: patch
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                source,
            })?;
        current = output;
    }
    Ok(current)
}
