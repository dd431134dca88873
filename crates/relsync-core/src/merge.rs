//! Reconciles local build output with the published remote index.
//!
//! The merge is a pure function of an immutable [`RemoteSnapshot`] and the
//! local entries; writing the result back is the pipeline's job.

use std::collections::{BTreeSet, HashSet};

use relsync_schema::{FormatError, PackageId, ReleaseEntry, ReleaseKind, Version, index};
use thiserror::Error;

/// Reasons a merge is refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// Entries for more than one package were mixed in the same channel.
    #[error("Inconsistent package id: expected '{expected}', found '{found}'")]
    InconsistentPackageId {
        /// Package id of the first entry.
        expected: String,
        /// The conflicting package id.
        found: String,
    },

    /// Some RIDs carry an OS version and others do not.
    #[error("Mixed RIDs: '{with_version}' has an OS version but '{without_version}' does not")]
    MixedRid {
        /// Filename of an entry whose RID has an OS version.
        with_version: String,
        /// Filename of an entry whose RID lacks one.
        without_version: String,
    },
}

/// The remote index as it was when fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteSnapshot {
    entries: Vec<ReleaseEntry>,
}

impl RemoteSnapshot {
    /// A remote with no index yet.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot of already parsed entries.
    pub fn from_entries(entries: Vec<ReleaseEntry>) -> Self {
        Self { entries }
    }

    /// Parse a fetched legacy index.
    ///
    /// # Errors
    ///
    /// Returns the index codec's [`FormatError`].
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        index::parse_bytes(bytes).map(Self::from_entries)
    }

    /// Entries in index order.
    pub fn entries(&self) -> &[ReleaseEntry] {
        &self.entries
    }

    /// Whether the remote has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The new index, sorted by version with Full before Delta.
    pub entries: Vec<ReleaseEntry>,
    /// Filenames that were known but are no longer referenced.
    pub removed: Vec<String>,
}

impl MergeOutcome {
    /// Package id shared by every entry, if any.
    pub fn package_id(&self) -> Option<&PackageId> {
        self.entries.first().map(ReleaseEntry::package_id)
    }

    /// The newest Full entry.
    pub fn latest_full(&self) -> Option<&ReleaseEntry> {
        self.entries.iter().rev().find(|e| e.is_full())
    }
}

/// Merge local entries over a remote snapshot and apply retention.
///
/// Local entries win when both sides list the same filename. A
/// `keep_max_full` of zero disables retention.
///
/// # Errors
///
/// Returns [`MergeError`] if the combined entries mix package ids or RID forms.
pub fn merge(
    local: &[ReleaseEntry],
    remote: &RemoteSnapshot,
    keep_max_full: usize,
) -> Result<MergeOutcome, MergeError> {
    let mut seen = HashSet::new();
    let mut merged: Vec<ReleaseEntry> = local
        .iter()
        .chain(remote.entries())
        .filter(|e| seen.insert(e.filename().to_string()))
        .cloned()
        .collect();

    check_consistent(&merged)?;

    // Stable: equal keys keep local-then-remote order
    merged.sort_by(|a, b| (a.version(), a.kind()).cmp(&(b.version(), b.kind())));

    let entries = retain(merged.clone(), keep_max_full);
    let kept: HashSet<&str> = entries.iter().map(ReleaseEntry::filename).collect();
    let removed = merged
        .iter()
        .map(ReleaseEntry::filename)
        .filter(|f| !kept.contains(f))
        .map(str::to_string)
        .collect();

    Ok(MergeOutcome { entries, removed })
}

fn check_consistent(entries: &[ReleaseEntry]) -> Result<(), MergeError> {
    let Some(first) = entries.first() else {
        return Ok(());
    };
    if let Some(other) = entries.iter().find(|e| e.package_id() != first.package_id()) {
        return Err(MergeError::InconsistentPackageId {
            expected: first.package_id().to_string(),
            found: other.package_id().to_string(),
        });
    }

    let with = entries
        .iter()
        .find(|e| e.rid().is_some_and(relsync_schema::Rid::has_os_version));
    let without = entries
        .iter()
        .find(|e| e.rid().is_some_and(|r| !r.has_os_version()));
    if let (Some(with), Some(without)) = (with, without) {
        return Err(MergeError::MixedRid {
            with_version: with.filename().to_string(),
            without_version: without.filename().to_string(),
        });
    }
    Ok(())
}

fn retain(sorted: Vec<ReleaseEntry>, keep_max_full: usize) -> Vec<ReleaseEntry> {
    let full_versions: BTreeSet<&Version> = sorted
        .iter()
        .filter(|e| e.kind() == ReleaseKind::Full)
        .map(ReleaseEntry::version)
        .collect();

    if keep_max_full == 0 || full_versions.len() <= keep_max_full {
        return sorted;
    }

    let retained: BTreeSet<Version> = full_versions
        .iter()
        .rev()
        .take(keep_max_full)
        .map(|v| (*v).clone())
        .collect();
    let Some(oldest) = retained.first().cloned() else {
        return sorted;
    };

    sorted
        .into_iter()
        .filter(|e| match e.kind() {
            ReleaseKind::Full => retained.contains(e.version()),
            // The delta into the oldest kept release has no kept base to apply to
            ReleaseKind::Delta => retained.contains(e.version()) && *e.version() != oldest,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relsync_schema::Sha1Hash;

    fn entry(name: &str) -> ReleaseEntry {
        ReleaseEntry::new(name, Sha1Hash::compute(name.as_bytes()), 100).unwrap()
    }

    fn names(entries: &[ReleaseEntry]) -> Vec<&str> {
        entries.iter().map(ReleaseEntry::filename).collect()
    }

    fn remote_three() -> RemoteSnapshot {
        RemoteSnapshot::from_entries(vec![
            entry("MyApp-1.0.0-full.nupkg"),
            entry("MyApp-2.0.0-full.nupkg"),
            entry("MyApp-2.0.0-delta.nupkg"),
            entry("MyApp-3.0.0-full.nupkg"),
            entry("MyApp-3.0.0-delta.nupkg"),
        ])
    }

    #[test]
    fn retention_drops_oldest_full_and_its_orphaned_delta() {
        let local = vec![entry("MyApp-3.0.0-full.nupkg")];
        let out = merge(&local, &remote_three(), 2).unwrap();

        assert_eq!(
            names(&out.entries),
            vec![
                "MyApp-2.0.0-full.nupkg",
                "MyApp-3.0.0-full.nupkg",
                "MyApp-3.0.0-delta.nupkg",
            ]
        );
        assert!(out.removed.contains(&"MyApp-1.0.0-full.nupkg".to_string()));
        assert!(out.removed.contains(&"MyApp-2.0.0-delta.nupkg".to_string()));
        assert_eq!(out.removed.len(), 2);
    }

    #[test]
    fn no_policy_keeps_everything_sorted() {
        let local = vec![entry("MyApp-4.0.0-full.nupkg"), entry("MyApp-4.0.0-delta.nupkg")];
        let out = merge(&local, &remote_three(), 0).unwrap();
        assert_eq!(out.entries.len(), 7);
        assert!(out.removed.is_empty());
        assert_eq!(out.entries[0].filename(), "MyApp-1.0.0-full.nupkg");
        assert_eq!(out.latest_full().unwrap().filename(), "MyApp-4.0.0-full.nupkg");
        assert_eq!(out.entries[6].filename(), "MyApp-4.0.0-delta.nupkg");
    }

    #[test]
    fn merging_with_itself_equals_merging_with_empty() {
        let x: Vec<ReleaseEntry> = remote_three().entries().to_vec();
        for keep in [0, 1, 2, 5] {
            let with_self = merge(&x, &RemoteSnapshot::from_entries(x.clone()), keep).unwrap();
            let with_empty = merge(&x, &RemoteSnapshot::empty(), keep).unwrap();
            assert_eq!(with_self, with_empty, "keep_max_full = {keep}");
        }
    }

    #[test]
    fn retention_invariant_holds() {
        let x: Vec<ReleaseEntry> = remote_three().entries().to_vec();
        for keep in 1..=4 {
            let out = merge(&x, &RemoteSnapshot::empty(), keep).unwrap();
            let fulls: Vec<&Version> = out
                .entries
                .iter()
                .filter(|e| e.is_full())
                .map(ReleaseEntry::version)
                .collect();
            assert_eq!(fulls.len(), keep.min(3));
            for delta in out.entries.iter().filter(|e| e.is_delta()) {
                assert!(fulls.contains(&delta.version()));
            }
        }
    }

    #[test]
    fn local_wins_on_duplicate_filename() {
        let local = vec![
            ReleaseEntry::new("MyApp-3.0.0-full.nupkg", Sha1Hash::compute(b"rebuilt"), 5).unwrap(),
        ];
        let out = merge(&local, &remote_three(), 0).unwrap();
        let full3 = out
            .entries
            .iter()
            .find(|e| e.filename() == "MyApp-3.0.0-full.nupkg")
            .unwrap();
        assert_eq!(full3.size_bytes(), 5);
    }

    #[test]
    fn rejects_mixed_package_ids() {
        let local = vec![entry("OtherApp-4.0.0-full.nupkg")];
        let err = merge(&local, &remote_three(), 0).unwrap_err();
        assert!(matches!(err, MergeError::InconsistentPackageId { .. }));
    }

    #[test]
    fn rejects_mixed_rid_versions() {
        let local = vec![entry("MyApp-2.0.0-win10-x64-full.nupkg")];
        let remote = RemoteSnapshot::from_entries(vec![entry("MyApp-1.0.0-win-x64-full.nupkg")]);
        let err = merge(&local, &remote, 0).unwrap_err();
        assert!(matches!(err, MergeError::MixedRid { .. }));
    }

    #[test]
    fn empty_inputs_merge_to_empty() {
        let out = merge(&[], &RemoteSnapshot::empty(), 3).unwrap();
        assert!(out.entries.is_empty());
        assert!(out.package_id().is_none());
    }
}
